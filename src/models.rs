//! Core data models used throughout SunuPeche.
//!
//! These types represent the reference documents, environmental readings,
//! tide schedules, question intents, and conversation records that flow
//! through the question → context → completion pipeline.

use chrono::{DateTime, NaiveTime, Utc};
use serde::Serialize;

// ============ Reference data ============

/// A parsed CSV file: header names plus string cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Parsed content of a reference document, one variant per file kind.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentContent {
    Tabular(Table),
    Text(String),
    Structured(serde_json::Value),
}

impl DocumentContent {
    pub fn kind(&self) -> DocumentKind {
        match self {
            DocumentContent::Tabular(_) => DocumentKind::Tabular,
            DocumentContent::Text(_) => DocumentKind::Text,
            DocumentContent::Structured(_) => DocumentKind::Structured,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Tabular,
    Text,
    Structured,
}

impl DocumentKind {
    /// Label shown in the context payload (`Type: CSV`, ...).
    pub fn label(&self) -> &'static str {
        match self {
            DocumentKind::Tabular => "CSV",
            DocumentKind::Text => "PDF",
            DocumentKind::Structured => "JSON",
        }
    }
}

/// A reference file loaded from the data directory, keyed by filename.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceDocument {
    pub filename: String,
    pub content: DocumentContent,
}

impl ReferenceDocument {
    pub fn kind(&self) -> DocumentKind {
        self.content.kind()
    }
}

// ============ Environmental data ============

/// Current conditions for a location, as reported by the weather provider.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentConditions {
    pub location: String,
    pub temperature: f64,
    pub feels_like: f64,
    pub description: String,
    pub wind_speed: f64,
    pub wind_direction: Option<f64>,
    pub humidity: f64,
    pub pressure: f64,
    /// Metres.
    pub visibility: Option<f64>,
    /// Percent.
    pub cloud_cover: Option<f64>,
}

/// One step of a multi-day forecast.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub description: String,
    pub wind_speed: f64,
    pub humidity: f64,
}

/// Fresh per-request environmental reading; never cached.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentalSnapshot {
    pub current: CurrentConditions,
    pub forecast: Option<Vec<ForecastPoint>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TideKind {
    High,
    Low,
}

impl TideKind {
    pub fn label(&self) -> &'static str {
        match self {
            TideKind::High => "haute",
            TideKind::Low => "basse",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TideEvent {
    pub kind: TideKind,
    pub time: NaiveTime,
    /// Metres.
    pub height: f64,
}

/// Static tide schedule for one location, stamped with its lookup time.
#[derive(Debug, Clone, PartialEq)]
pub struct TideSchedule {
    pub location: String,
    pub generated_at: NaiveTime,
    pub today: Vec<TideEvent>,
    pub tomorrow: Vec<TideEvent>,
}

/// Phase of the tide at a given moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TidePhase {
    Rising,
    Falling,
    Stationary,
}

impl TidePhase {
    pub fn label(&self) -> &'static str {
        match self {
            TidePhase::Rising => "montante",
            TidePhase::Falling => "descendante",
            TidePhase::Stationary => "étale",
        }
    }
}

// ============ Classification ============

/// Relevance flags and resolved location for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionIntent {
    pub needs_weather: bool,
    pub needs_tide: bool,
    pub needs_statistics: bool,
    pub needs_species: bool,
    pub needs_regulations: bool,
    pub needs_platform_info: bool,
    pub needs_comparison: bool,
    pub location: String,
}

impl QuestionIntent {
    /// An intent with every flag cleared.
    pub fn at(location: impl Into<String>) -> Self {
        Self {
            needs_weather: false,
            needs_tide: false,
            needs_statistics: false,
            needs_species: false,
            needs_regulations: false,
            needs_platform_info: false,
            needs_comparison: false,
            location: location.into(),
        }
    }

    pub fn needs_environment(&self) -> bool {
        self.needs_weather || self.needs_tide
    }
}

// ============ Conversation ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }

    /// Label used when history is rendered for the model.
    pub fn display_label(&self) -> &'static str {
        match self {
            Role::User => "Utilisateur",
            Role::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

impl ConversationMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
            metadata: None,
        }
    }
}

/// A persisted session summary.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub is_active: bool,
    pub message_count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserStats {
    pub total_sessions: i64,
    pub total_messages: i64,
    pub first_session: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
}
