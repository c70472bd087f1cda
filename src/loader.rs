//! Reference data loader.
//!
//! Scans one data directory for `.csv`, `.pdf`, and `.json` files and parses
//! each into a [`ReferenceDocument`]. Failures are isolated per file: a file
//! that cannot be decoded or parsed is recorded in the library's failure list
//! and the rest of the batch still loads.
//!
//! Enumeration order is tabular files, then PDFs, then JSON, each group sorted
//! by filename. The context assembler emits blocks in this order.

use anyhow::Result;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::config::DataConfig;
use crate::extract::{self, decode_with_fallback};
use crate::models::{DocumentContent, DocumentKind, ReferenceDocument, Table};

/// A file that could not be loaded, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadFailure {
    pub filename: String,
    pub reason: String,
}

/// All reference documents loaded from one directory.
#[derive(Debug, Clone, Default)]
pub struct ReferenceLibrary {
    pub root: Option<PathBuf>,
    pub documents: Vec<ReferenceDocument>,
    pub failures: Vec<LoadFailure>,
}

impl ReferenceLibrary {
    pub fn empty() -> Self {
        Self::default()
    }

    /// A resolved directory whose scan failed; the error is kept as a failure.
    pub fn scan_failed(dir: &Path, reason: String) -> Self {
        Self {
            root: Some(dir.to_path_buf()),
            documents: Vec::new(),
            failures: vec![LoadFailure {
                filename: dir.display().to_string(),
                reason,
            }],
        }
    }

    pub fn get(&self, filename: &str) -> Option<&ReferenceDocument> {
        self.documents.iter().find(|d| d.filename == filename)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReferenceDocument> {
        self.documents.iter()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Lazily loaded, explicitly refreshable handle on the reference library.
#[derive(Debug)]
pub struct ReferenceCache {
    config: DataConfig,
    library: Option<Arc<ReferenceLibrary>>,
}

impl ReferenceCache {
    pub fn new(config: DataConfig) -> Self {
        Self {
            config,
            library: None,
        }
    }

    /// Returns the cached library, scanning the data directory on first use.
    pub fn library(&mut self) -> Arc<ReferenceLibrary> {
        if let Some(lib) = &self.library {
            return Arc::clone(lib);
        }
        let lib = Arc::new(load_reference_data(&self.config));
        self.library = Some(Arc::clone(&lib));
        lib
    }

    /// Drops the cached library and rescans.
    pub fn refresh(&mut self) -> Arc<ReferenceLibrary> {
        self.library = None;
        self.library()
    }
}

/// Returns the first candidate directory that exists.
pub fn resolve_data_dir(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|p| p.is_dir()).cloned()
}

/// Loads every reference document from the first existing candidate directory.
///
/// Returns an empty library when no candidate exists.
pub fn load_reference_data(config: &DataConfig) -> ReferenceLibrary {
    match resolve_data_dir(&config.candidates) {
        Some(dir) => match load_directory(&dir, &config.encodings) {
            Ok(lib) => lib,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), "failed to scan data directory: {:#}", e);
                ReferenceLibrary::scan_failed(&dir, format!("{:#}", e))
            }
        },
        None => {
            tracing::info!("no reference data directory found; continuing without documents");
            ReferenceLibrary::empty()
        }
    }
}

/// Loads all supported files directly inside `dir` (no recursion).
pub fn load_directory(dir: &Path, encodings: &[String]) -> Result<ReferenceLibrary> {
    let kinds = build_kind_globset()?;

    let mut files: Vec<(DocumentKind, PathBuf, String)> = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let filename = entry.file_name().to_string_lossy().to_string();
        let Some(kind) = kind_for(&kinds, &filename) else {
            continue;
        };
        files.push((kind, entry.path().to_path_buf(), filename));
    }

    files.sort_by(|a, b| kind_rank(a.0).cmp(&kind_rank(b.0)).then_with(|| a.2.cmp(&b.2)));

    let mut library = ReferenceLibrary {
        root: Some(dir.to_path_buf()),
        ..Default::default()
    };

    for (kind, path, filename) in files {
        match load_file(kind, &path, encodings) {
            Ok(content) => {
                tracing::debug!(file = %filename, kind = kind.label(), "loaded reference document");
                library.documents.push(ReferenceDocument { filename, content });
            }
            Err(e) => {
                tracing::warn!(file = %filename, "skipping reference document: {:#}", e);
                library.failures.push(LoadFailure {
                    filename,
                    reason: format!("{:#}", e),
                });
            }
        }
    }

    tracing::info!(
        dir = %dir.display(),
        loaded = library.documents.len(),
        failed = library.failures.len(),
        "reference data loaded"
    );

    Ok(library)
}

fn load_file(kind: DocumentKind, path: &Path, encodings: &[String]) -> Result<DocumentContent> {
    let bytes = std::fs::read(path)?;
    match kind {
        DocumentKind::Tabular => {
            let (text, _) = decode_with_fallback(&bytes, encodings)?;
            Ok(DocumentContent::Tabular(parse_csv(&text)?))
        }
        DocumentKind::Text => {
            let text = extract::extract_text(&bytes, extract::MIME_PDF)?;
            Ok(DocumentContent::Text(text))
        }
        DocumentKind::Structured => {
            let text = std::str::from_utf8(&bytes)?;
            let value: serde_json::Value = serde_json::from_str(strip_bom(text))?;
            Ok(DocumentContent::Structured(value))
        }
    }
}

/// Parses comma-separated text with a header row. Ragged rows are kept as-is.
pub fn parse_csv(text: &str) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(strip_bom(text).as_bytes());

    let columns = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(|f| f.to_string()).collect());
    }

    Ok(Table { columns, rows })
}

fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

const KIND_PATTERNS: [(&str, DocumentKind); 3] = [
    ("*.csv", DocumentKind::Tabular),
    ("*.pdf", DocumentKind::Text),
    ("*.json", DocumentKind::Structured),
];

fn build_kind_globset() -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for (pattern, _) in KIND_PATTERNS {
        builder.add(GlobBuilder::new(pattern).case_insensitive(true).build()?);
    }
    Ok(builder.build()?)
}

fn kind_for(set: &GlobSet, filename: &str) -> Option<DocumentKind> {
    set.matches(filename)
        .first()
        .map(|&idx| KIND_PATTERNS[idx].1)
}

fn kind_rank(kind: DocumentKind) -> u8 {
    match kind {
        DocumentKind::Tabular => 0,
        DocumentKind::Text => 1,
        DocumentKind::Structured => 2,
    }
}
