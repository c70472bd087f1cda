//! Reference data overview for `sunupeche sources`.
//!
//! Shows which data directory was resolved, every document the loader kept
//! (in loader order), and the files it had to skip.

use anyhow::Result;

use crate::config::DataConfig;
use crate::loader::{load_reference_data, ReferenceLibrary};
use crate::models::{DocumentContent, ReferenceDocument};

pub fn list_sources(config: &DataConfig) -> Result<()> {
    let library = load_reference_data(config);
    print!("{}", render_sources(&library));
    Ok(())
}

pub fn render_sources(library: &ReferenceLibrary) -> String {
    let mut out = String::new();
    match &library.root {
        Some(root) => out.push_str(&format!("Data directory: {}\n\n", root.display())),
        None => {
            out.push_str("Data directory: none found (continuing without reference documents)\n");
            return out;
        }
    }

    out.push_str(&format!("{:<40} {:<6} {}\n", "FILE", "TYPE", "SIZE"));
    for doc in library.iter() {
        out.push_str(&format!(
            "{:<40} {:<6} {}\n",
            doc.filename,
            doc.kind().label(),
            describe(doc)
        ));
    }

    if !library.failures.is_empty() {
        out.push_str("\nSkipped:\n");
        for failure in &library.failures {
            out.push_str(&format!("  {}: {}\n", failure.filename, failure.reason));
        }
    }
    out
}

/// Short size summary: rows x columns for tables, characters otherwise.
pub fn describe(doc: &ReferenceDocument) -> String {
    match &doc.content {
        DocumentContent::Tabular(t) => format!("{} rows x {} cols", t.rows.len(), t.columns.len()),
        DocumentContent::Text(text) => format!("{} chars", text.chars().count()),
        DocumentContent::Structured(value) => format!("{} chars", value.to_string().chars().count()),
    }
}
