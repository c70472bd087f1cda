//! Library-level pipeline tests: real loader, classifier, tide table and
//! assembler, with the weather provider served by a mock HTTP server.

use chrono::{DateTime, FixedOffset, TimeZone};
use serde_json::json;
use std::fs;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sunupeche::classify::Classifier;
use sunupeche::config::{Config, DataConfig};
use sunupeche::context::ContextAssembler;
use sunupeche::loader::{load_reference_data, ReferenceCache};
use sunupeche::tides::TideTable;
use sunupeche::weather::{EnvironmentFetcher, WeatherClient};

fn morning() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2026, 10, 16, 9, 12, 0)
        .unwrap()
}

fn data_dir() -> TempDir {
    let tmp = TempDir::new().unwrap();
    // Latin-1 encoded: "Espèce" with 0xE8
    let mut especes = b"nom,Esp".to_vec();
    especes.push(0xE8);
    especes.extend_from_slice(b"ce\nThiof,Epinephelus aeneus\n");
    fs::write(tmp.path().join("especes.csv"), especes).unwrap();
    fs::write(
        tmp.path().join("ports.csv"),
        "\u{feff}port,region\nKayar,Thies\n",
    )
    .unwrap();
    fs::write(tmp.path().join("reglement.json"), r#"{"maillage_min_mm": 50}"#).unwrap();
    tmp
}

async fn mock_weather() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/weather"))
        .and(query_param("q", "Kayar"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Kayar",
            "main": { "temp": 24.5, "feels_like": 25.1, "humidity": 78, "pressure": 1012 },
            "weather": [{ "description": "ciel dégagé" }],
            "wind": { "speed": 5.2, "deg": 320 }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "list": [{
                "dt": 1_792_137_600,
                "main": { "temp": 26.0, "humidity": 70 },
                "weather": [{ "description": "peu nuageux" }],
                "wind": { "speed": 4.0 }
            }]
        })))
        .mount(&server)
        .await;
    server
}

fn fetcher(server: &MockServer, config: &Config) -> EnvironmentFetcher {
    let mut weather = config.weather.clone();
    weather.base_url = server.uri();
    let client = WeatherClient::with_api_key(&weather, Some("test-key".into())).unwrap();
    EnvironmentFetcher::new(client, TideTable::builtin("Dakar"))
}

#[tokio::test]
async fn kayar_fishing_question_end_to_end() {
    let data = data_dir();
    let server = mock_weather().await;
    let mut config = Config::minimal();
    config.data.candidates = vec![data.path().to_path_buf()];

    let intent = Classifier::default().classify("Quand pêcher à Kayar demain ?");
    let library = load_reference_data(&config.data);
    let assembler = ContextAssembler::from_config(&config.context, config.weather.forecast_points);
    let env = fetcher(&server, &config);

    let text = assembler
        .assemble(&intent, &library, &env, morning())
        .await
        .render();

    assert!(text.contains("Lieu: Kayar"));
    assert!(text.contains("Vent: 5.2 m/s, Direction: 320°"));
    assert!(text.contains("PREVISIONS SUR 5 JOURS:"));
    assert!(text.contains("=== HORAIRES DES MAREES A KAYAR ==="));
    assert!(text.contains("HEURE ACTUELLE: 09:12"));
    assert!(text.contains("DEMAIN:\nMaree basse: 00:05"));
    assert!(text.contains("Date actuelle: 16/10/2026 09:12"));

    // only unfiltered documents follow the environment block
    assert!(text.contains("=== ports.csv ==="));
    assert!(!text.contains("especes.csv"));
    assert!(!text.contains("reglement.json"));

    let meteo = text.find("METEO").unwrap();
    let header = text.find("DONNEES DISPONIBLES").unwrap();
    assert!(meteo < header);
}

#[tokio::test]
async fn species_question_reads_latin1_table() {
    let data = data_dir();
    let server = mock_weather().await;
    let mut config = Config::minimal();
    config.data.candidates = vec![data.path().to_path_buf()];

    let intent = Classifier::default().classify("Où trouver le thiof ?");
    assert!(intent.needs_species);

    let library = load_reference_data(&config.data);
    let assembler = ContextAssembler::from_config(&config.context, config.weather.forecast_points);
    let text = assembler
        .assemble(&intent, &library, &fetcher(&server, &config), morning())
        .await
        .render();

    assert!(text.contains("=== especes.csv ==="));
    assert!(text.contains("Colonnes: nom, Espèce"));
    assert!(!text.contains("METEO"));
}

#[tokio::test]
async fn cache_is_stable_until_refresh() {
    let data = data_dir();
    let config = DataConfig {
        candidates: vec![data.path().to_path_buf()],
        ..DataConfig::default()
    };
    let mut cache = ReferenceCache::new(config);

    assert_eq!(cache.library().len(), 3);
    fs::remove_file(data.path().join("ports.csv")).unwrap();
    assert_eq!(cache.library().len(), 3);
    assert_eq!(cache.refresh().len(), 2);
}

#[tokio::test]
async fn missing_data_directory_still_yields_context() {
    let server = mock_weather().await;
    let mut config = Config::minimal();
    config.data.candidates = vec!["/definitely/not/here".into()];

    let intent = Classifier::default().classify("Météo à Kayar");
    let library = load_reference_data(&config.data);
    assert!(library.is_empty());

    let assembler = ContextAssembler::from_config(&config.context, config.weather.forecast_points);
    let payload = assembler
        .assemble(&intent, &library, &fetcher(&server, &config), morning())
        .await;
    assert!(payload.has_environment());
    assert!(payload.reference_names().is_empty());
}
