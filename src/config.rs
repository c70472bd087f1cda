use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub tides: TidesConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/sunupeche.sqlite")
}

/// Where reference documents live and how tabular files are decoded.
#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    /// Candidate directories, tried in order; the first that exists wins.
    #[serde(default = "default_candidates")]
    pub candidates: Vec<PathBuf>,
    #[serde(default = "default_encodings")]
    pub encodings: Vec<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            candidates: default_candidates(),
            encodings: default_encodings(),
        }
    }
}

fn default_candidates() -> Vec<PathBuf> {
    vec![PathBuf::from("data"), PathBuf::from("../data")]
}

fn default_encodings() -> Vec<String> {
    ["utf-8", "latin-1", "iso-8859-1", "windows-1252"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct WeatherConfig {
    #[serde(default = "default_weather_url")]
    pub base_url: String,
    #[serde(default = "default_weather_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_units")]
    pub units: String,
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default = "default_weather_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_forecast_points")]
    pub forecast_points: usize,
    /// Canonical location name → coordinates, used instead of the name when present.
    #[serde(default)]
    pub coordinates: HashMap<String, Coordinates>,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: default_weather_url(),
            api_key_env: default_weather_key_env(),
            units: default_units(),
            lang: default_lang(),
            timeout_secs: default_weather_timeout(),
            forecast_points: default_forecast_points(),
            coordinates: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

fn default_weather_url() -> String {
    "https://api.openweathermap.org/data/2.5".to_string()
}
fn default_weather_key_env() -> String {
    "OWM_API_KEY".to_string()
}
fn default_units() -> String {
    "metric".to_string()
}
fn default_lang() -> String {
    "fr".to_string()
}
fn default_weather_timeout() -> u64 {
    10
}
fn default_forecast_points() -> usize {
    8
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TidesConfig {
    /// TOML fixture replacing the built-in tide table.
    #[serde(default)]
    pub fixture: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_provider")]
    pub provider: String,
    #[serde(default = "default_completion_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_completion_key_env")]
    pub api_key_env: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_completion_provider(),
            base_url: default_completion_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_completion_timeout(),
            api_key_env: default_completion_key_env(),
        }
    }
}

fn default_completion_provider() -> String {
    "openai".to_string()
}
fn default_completion_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    1500
}
fn default_completion_timeout() -> u64 {
    60
}
fn default_completion_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

/// Per-source size caps and filename filters for the context payload.
#[derive(Debug, Deserialize, Clone)]
pub struct ContextConfig {
    #[serde(default = "default_document_chars")]
    pub document_chars: usize,
    #[serde(default = "default_structured_chars")]
    pub structured_chars: usize,
    #[serde(default = "default_table_rows")]
    pub table_rows: usize,
    #[serde(default)]
    pub filters: FilterConfig,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            document_chars: default_document_chars(),
            structured_chars: default_structured_chars(),
            table_rows: default_table_rows(),
            filters: FilterConfig::default(),
        }
    }
}

fn default_document_chars() -> usize {
    2000
}
fn default_structured_chars() -> usize {
    1000
}
fn default_table_rows() -> usize {
    20
}

/// Filename substrings that gate a document behind an intent flag.
#[derive(Debug, Deserialize, Clone)]
pub struct FilterConfig {
    #[serde(default = "default_statistics_filter")]
    pub statistics: Vec<String>,
    #[serde(default = "default_species_filter")]
    pub species: Vec<String>,
    #[serde(default = "default_regulations_filter")]
    pub regulations: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            statistics: default_statistics_filter(),
            species: default_species_filter(),
            regulations: default_regulations_filter(),
        }
    }
}

fn default_statistics_filter() -> Vec<String> {
    vec!["statistique".to_string()]
}
fn default_species_filter() -> Vec<String> {
    vec!["espece".to_string()]
}
fn default_regulations_filter() -> Vec<String> {
    vec!["reglement".to_string(), "loi".to_string()]
}

/// Keyword overrides. Any list left unset keeps the built-in vocabulary.
#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    #[serde(default = "default_location")]
    pub default_location: String,
    #[serde(default)]
    pub weather: Option<Vec<String>>,
    #[serde(default)]
    pub tide: Option<Vec<String>>,
    #[serde(default)]
    pub fishing: Option<Vec<String>>,
    #[serde(default)]
    pub statistics: Option<Vec<String>>,
    #[serde(default)]
    pub species: Option<Vec<String>>,
    #[serde(default)]
    pub regulations: Option<Vec<String>>,
    #[serde(default)]
    pub platform: Option<Vec<String>>,
    #[serde(default)]
    pub comparison: Option<Vec<String>>,
    #[serde(default)]
    pub locations: Option<Vec<LocationAlias>>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            default_location: default_location(),
            weather: None,
            tide: None,
            fishing: None,
            statistics: None,
            species: None,
            regulations: None,
            platform: None,
            comparison: None,
            locations: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LocationAlias {
    pub keyword: String,
    pub name: String,
}

fn default_location() -> String {
    "Dakar".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_max_messages")]
    pub max_messages: i64,
    #[serde(default = "default_session_window")]
    pub session_window_hours: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            session_window_hours: default_session_window(),
        }
    }
}

fn default_max_messages() -> i64 {
    20
}
fn default_session_window() -> i64 {
    24
}

impl Config {
    /// Built-in defaults, for commands that can run without a config file.
    pub fn minimal() -> Self {
        Self::default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)?;
    validate(&config)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

/// One hundred years; larger windows overflow timestamp arithmetic.
pub const MAX_SESSION_WINDOW_HOURS: i64 = 24 * 365 * 100;

pub fn validate(config: &Config) -> Result<()> {
    if config.context.document_chars == 0 {
        anyhow::bail!("context.document_chars must be > 0");
    }
    if config.context.structured_chars == 0 {
        anyhow::bail!("context.structured_chars must be > 0");
    }
    if config.context.table_rows == 0 {
        anyhow::bail!("context.table_rows must be > 0");
    }

    if !(0.0..=2.0).contains(&config.completion.temperature) {
        anyhow::bail!("completion.temperature must be in [0.0, 2.0]");
    }
    if config.completion.max_tokens == 0 {
        anyhow::bail!("completion.max_tokens must be > 0");
    }

    if config.weather.timeout_secs == 0 || config.completion.timeout_secs == 0 {
        anyhow::bail!("timeout_secs must be > 0");
    }

    if config.classifier.default_location.trim().is_empty() {
        anyhow::bail!("classifier.default_location must not be empty");
    }
    if let Some(locations) = &config.classifier.locations {
        if locations.is_empty() {
            anyhow::bail!("classifier.locations must not be empty when set");
        }
    }

    if !(1..=MAX_SESSION_WINDOW_HOURS).contains(&config.history.session_window_hours) {
        anyhow::bail!(
            "history.session_window_hours must be in [1, {}]",
            MAX_SESSION_WINDOW_HOURS
        );
    }

    match config.completion.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown completion provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        validate(&config).unwrap();
        assert_eq!(config.context.document_chars, 2000);
        assert_eq!(config.context.structured_chars, 1000);
        assert_eq!(config.context.table_rows, 20);
        assert_eq!(config.weather.timeout_secs, 10);
        assert_eq!(config.completion.model, "gpt-4o-mini");
        assert_eq!(config.classifier.default_location, "Dakar");
        assert_eq!(config.data.encodings[0], "utf-8");
    }

    #[test]
    fn coordinates_table_parses() {
        let config = parse_config(
            r#"
            [weather.coordinates]
            Kayar = { lat = 14.92, lon = -17.12 }
            "#,
        )
        .unwrap();
        let kayar = config.weather.coordinates.get("Kayar").unwrap();
        assert!((kayar.lat - 14.92).abs() < 1e-9);
    }

    #[test]
    fn location_override_parses() {
        let config = parse_config(
            r#"
            [classifier]
            default_location = "Mbour"
            locations = [{ keyword = "rufisque", name = "Rufisque" }]
            "#,
        )
        .unwrap();
        validate(&config).unwrap();
        assert_eq!(config.classifier.default_location, "Mbour");
        assert_eq!(config.classifier.locations.unwrap()[0].name, "Rufisque");
    }

    #[test]
    fn rejects_unknown_provider() {
        let config = parse_config("[completion]\nprovider = \"mystery\"\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_zero_caps() {
        let config = parse_config("[context]\ntable_rows = 0\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        let config = parse_config("[completion]\ntemperature = 3.5\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_unbounded_session_window() {
        let config = parse_config("[history]\nsession_window_hours = 9223372036854775807\n").unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("session_window_hours"));

        let config = parse_config(&format!(
            "[history]\nsession_window_hours = {}\n",
            MAX_SESSION_WINDOW_HOURS
        ))
        .unwrap();
        validate(&config).unwrap();
    }

    #[test]
    fn example_config_is_valid() {
        let config = parse_config(include_str!("../config/sunupeche.example.toml")).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.weather.coordinates.len(), 2);
        assert!(config.weather.coordinates.contains_key("Joal-Fadiouth"));
        assert_eq!(config.context.filters.regulations, vec!["reglement", "loi"]);
    }
}
