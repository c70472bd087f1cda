//! Context assembly.
//!
//! Builds the bounded text payload handed to the completion provider:
//!
//! ```text
//! ┌──────────────────────────┐  only when the intent asks for weather or tide
//! │ weather + forecast       │  and the fetch succeeded
//! │ tides (if needs_tide)    │
//! ├──────────────────────────┤
//! │ header + current date    │
//! │ one block per reference  │  filtered by filename, loader order,
//! │ document                 │  each block capped by characters or rows
//! └──────────────────────────┘
//! ```
//!
//! Truncation is purely length-based. With a fixed clock and identical inputs
//! the payload is byte-identical between runs.

use chrono::{DateTime, FixedOffset};

use crate::config::{ContextConfig, FilterConfig};
use crate::loader::ReferenceLibrary;
use crate::models::{
    CurrentConditions, DocumentContent, EnvironmentalSnapshot, ForecastPoint, QuestionIntent,
    ReferenceDocument, Table, TideEvent, TideSchedule,
};
use crate::tides::{tide_status, TideDay};
use crate::weather::{fetch_snapshot, EnvironmentSource, FetchOutcome};

/// Appended after any truncated text.
pub const ELLIPSIS: &str = "...";

const SEPARATOR_WIDTH: usize = 60;

/// Size caps applied to every source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextLimits {
    pub document_chars: usize,
    pub structured_chars: usize,
    pub table_rows: usize,
    pub forecast_points: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            document_chars: 2000,
            structured_chars: 1000,
            table_rows: 20,
            forecast_points: 8,
        }
    }
}

/// Where a block of the payload came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockSource {
    Environment,
    Header,
    Reference(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextBlock {
    pub source: BlockSource,
    pub text: String,
}

/// The assembled, size-bounded context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextPayload {
    pub blocks: Vec<ContextBlock>,
}

impl ContextPayload {
    pub fn render(&self) -> String {
        self.blocks.iter().map(|b| b.text.as_str()).collect()
    }

    pub fn has_environment(&self) -> bool {
        self.blocks
            .iter()
            .any(|b| b.source == BlockSource::Environment)
    }

    /// Filenames of the reference documents that made it into the payload.
    pub fn reference_names(&self) -> Vec<&str> {
        self.blocks
            .iter()
            .filter_map(|b| match &b.source {
                BlockSource::Reference(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl std::fmt::Display for ContextPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for block in &self.blocks {
            f.write_str(&block.text)?;
        }
        Ok(())
    }
}

pub struct ContextAssembler {
    limits: ContextLimits,
    filters: FilterConfig,
}

impl ContextAssembler {
    pub fn new(limits: ContextLimits, filters: FilterConfig) -> Self {
        Self { limits, filters }
    }

    pub fn from_config(context: &ContextConfig, forecast_points: usize) -> Self {
        Self::new(
            ContextLimits {
                document_chars: context.document_chars,
                structured_chars: context.structured_chars,
                table_rows: context.table_rows,
                forecast_points,
            },
            context.filters.clone(),
        )
    }

    /// Builds the payload for one question.
    ///
    /// `now` is the local wall-clock time; it stamps the header and the tide
    /// block and sets the timezone used for forecast timestamps.
    pub async fn assemble(
        &self,
        intent: &QuestionIntent,
        library: &ReferenceLibrary,
        env: &dyn EnvironmentSource,
        now: DateTime<FixedOffset>,
    ) -> ContextPayload {
        let mut payload = ContextPayload::default();

        if intent.needs_environment() {
            match fetch_snapshot(env, &intent.location).await {
                FetchOutcome::Ready(snapshot) => {
                    let tides = intent.needs_tide.then(|| {
                        env.tides(&intent.location, now.time()).schedule
                    });
                    payload.blocks.push(ContextBlock {
                        source: BlockSource::Environment,
                        text: self.format_environment(&snapshot, tides.as_ref(), now),
                    });
                }
                FetchOutcome::Unavailable(reason) => {
                    tracing::info!(location = %intent.location, "weather omitted: {}", reason);
                }
                FetchOutcome::Failed(reason) => {
                    tracing::warn!(location = %intent.location, "weather omitted: {}", reason);
                }
            }
        }

        payload.blocks.push(ContextBlock {
            source: BlockSource::Header,
            text: format!(
                "DONNEES DISPONIBLES:\n\nDate actuelle: {}\n\n",
                now.format("%d/%m/%Y %H:%M")
            ),
        });

        for doc in library.iter().filter(|d| self.is_included(intent, &d.filename)) {
            payload.blocks.push(ContextBlock {
                source: BlockSource::Reference(doc.filename.clone()),
                text: self.format_document(doc),
            });
        }

        payload
    }

    /// Filename gate: statistics, species, and regulation files only pass
    /// when the matching flag is set.
    pub fn is_included(&self, intent: &QuestionIntent, filename: &str) -> bool {
        let name = filename.to_lowercase();
        let hit = |needles: &[String]| needles.iter().any(|n| name.contains(&n.to_lowercase()));

        if !intent.needs_statistics && hit(&self.filters.statistics) {
            return false;
        }
        if !intent.needs_species && hit(&self.filters.species) {
            return false;
        }
        if !intent.needs_regulations && hit(&self.filters.regulations) {
            return false;
        }
        true
    }

    pub fn format_document(&self, doc: &ReferenceDocument) -> String {
        let mut out = format!("=== {} ===\n", doc.filename);
        out.push_str(&format!("Type: {}\n", doc.kind().label()));

        match &doc.content {
            DocumentContent::Tabular(table) => {
                out.push_str(&format!("Colonnes: {}\n", table.columns.join(", ")));
                out.push_str(&format!("Lignes: {}\n", table.rows.len()));
                if !table.rows.is_empty() {
                    out.push_str(&format!(
                        "\nECHANTILLON ({} premières lignes):\n",
                        self.limits.table_rows
                    ));
                    out.push_str(&render_table(table, self.limits.table_rows));
                }
                out.push('\n');
            }
            DocumentContent::Text(text) => {
                push_capped(&mut out, text, self.limits.document_chars);
            }
            DocumentContent::Structured(value) => {
                let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
                push_capped(&mut out, &pretty, self.limits.structured_chars);
            }
        }

        out.push('\n');
        out
    }

    pub fn format_environment(
        &self,
        snapshot: &EnvironmentalSnapshot,
        tides: Option<&TideSchedule>,
        now: DateTime<FixedOffset>,
    ) -> String {
        let mut out = format_current(&snapshot.current);

        if let Some(points) = &snapshot.forecast {
            if !points.is_empty() {
                out.push_str("\nPREVISIONS SUR 5 JOURS:\n");
                for point in points.iter().take(self.limits.forecast_points) {
                    out.push_str(&format_forecast_point(point, now.offset()));
                }
            }
        }

        if let Some(schedule) = tides {
            out.push_str("\n\n");
            out.push_str(&format_tide_block(schedule, now));
        }

        out.push('\n');
        out.push_str(&"=".repeat(SEPARATOR_WIDTH));
        out.push('\n');
        out
    }
}

fn format_current(c: &CurrentConditions) -> String {
    let mut out = String::from("\n=== DONNEES METEO EN TEMPS REEL (OpenWeatherMap) ===\n\n");
    out.push_str(&format!("Lieu: {}\n", c.location));
    out.push_str(&format!(
        "Temperature: {}°C (Ressenti: {}°C)\n",
        c.temperature, c.feels_like
    ));
    out.push_str(&format!("Conditions: {}\n", c.description));
    let direction = c
        .wind_direction
        .map(|d| d.to_string())
        .unwrap_or_else(|| "N/A".to_string());
    out.push_str(&format!(
        "Vent: {} m/s, Direction: {}°\n",
        c.wind_speed, direction
    ));
    out.push_str(&format!("Humidite: {}%\n", c.humidity));
    out.push_str(&format!("Pression: {} hPa\n", c.pressure));
    if let Some(v) = c.visibility {
        out.push_str(&format!("Visibilite: {} km\n", v / 1000.0));
    }
    if let Some(cc) = c.cloud_cover {
        out.push_str(&format!("Couverture nuageuse: {}%\n", cc));
    }
    out
}

fn format_forecast_point(p: &ForecastPoint, offset: &FixedOffset) -> String {
    let local = p.timestamp.with_timezone(offset);
    format!(
        "\n{}:\n   - Temperature: {}°C\n   - Conditions: {}\n   - Vent: {} m/s\n   - Humidite: {}%\n",
        local.format("%d/%m a %Hh"),
        p.temperature,
        p.description,
        p.wind_speed,
        p.humidity
    )
}

/// Renders the tide schedule with explicit today/tomorrow sections.
pub fn format_tide_block(schedule: &TideSchedule, now: DateTime<FixedOffset>) -> String {
    let mut out = format!(
        "=== HORAIRES DES MAREES A {} ===\n",
        schedule.location.to_uppercase()
    );
    out.push_str(&format!(
        "HEURE ACTUELLE: {}\n",
        schedule.generated_at.format("%H:%M")
    ));

    let status = tide_status(schedule, now.time());
    if let Some(phase) = status.phase {
        out.push_str(&format!("PHASE ACTUELLE: {}", phase.label()));
        if let Some((day, event)) = &status.next {
            let when = match day {
                TideDay::Today => "aujourd'hui",
                TideDay::Tomorrow => "demain",
            };
            out.push_str(&format!(
                " (prochaine: maree {} a {} {})",
                event.kind.label(),
                event.time.format("%H:%M"),
                when
            ));
        }
        out.push('\n');
    }

    out.push_str("\nAUJOURD'HUI:\n");
    for event in &schedule.today {
        out.push_str(&format_tide_event(event));
    }
    out.push_str("\nDEMAIN:\n");
    for event in &schedule.tomorrow {
        out.push_str(&format_tide_event(event));
    }
    out
}

fn format_tide_event(e: &TideEvent) -> String {
    format!(
        "Maree {}: {} ({:.1}m)\n",
        e.kind.label(),
        e.time.format("%H:%M"),
        e.height
    )
}

/// Appends `CONTENU:` with the full text, or `EXTRAIT:` with the first `max`
/// characters followed by [`ELLIPSIS`].
fn push_capped(out: &mut String, text: &str, max: usize) {
    match truncate_chars(text, max) {
        Some(prefix) => {
            out.push_str("EXTRAIT:\n");
            out.push_str(prefix);
            out.push_str(ELLIPSIS);
            out.push('\n');
        }
        None => {
            out.push_str("CONTENU:\n");
            out.push_str(text);
            out.push('\n');
        }
    }
}

/// Returns the first `max` characters when `text` is longer than that.
pub fn truncate_chars(text: &str, max: usize) -> Option<&str> {
    text.char_indices().nth(max).map(|(idx, _)| &text[..idx])
}

/// Right-aligned plain-text table of the first `max_rows` rows.
pub fn render_table(table: &Table, max_rows: usize) -> String {
    let ncols = table.columns.len();
    let rows: Vec<&Vec<String>> = table.rows.iter().take(max_rows).collect();

    let cell = |row: &Vec<String>, i: usize| -> String { row.get(i).cloned().unwrap_or_default() };

    let widths: Vec<usize> = (0..ncols)
        .map(|i| {
            rows.iter()
                .map(|r| cell(r, i).chars().count())
                .chain(std::iter::once(table.columns[i].chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |cells: Vec<String>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, &w)| format!("{:>w$}", c, w = w))
            .collect::<Vec<_>>()
            .join(" ")
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(line(table.columns.clone()));
    for row in rows {
        lines.push(line((0..ncols).map(|i| cell(row, i)).collect()));
    }
    lines.join("\n")
}
