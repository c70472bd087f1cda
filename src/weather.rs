//! Environmental data fetcher.
//!
//! Wraps the OpenWeatherMap `weather` and `forecast` endpoints and the static
//! tide table behind the [`EnvironmentSource`] trait. Nothing here returns an
//! error: a missing API key yields [`FetchOutcome::Unavailable`], and any
//! transport, status, or decoding problem yields [`FetchOutcome::Failed`].
//! No call is retried.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use crate::config::{Config, Coordinates, WeatherConfig};
use crate::models::{CurrentConditions, EnvironmentalSnapshot, ForecastPoint};
use crate::tides::{TideLookup, TideTable};

/// Result of an external fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
    Ready(T),
    /// The feature is not configured (e.g. no API key).
    Unavailable(String),
    /// The call was attempted and failed.
    Failed(String),
}

impl<T> FetchOutcome<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            FetchOutcome::Ready(v) => Some(v),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchOutcome<U> {
        match self {
            FetchOutcome::Ready(v) => FetchOutcome::Ready(f(v)),
            FetchOutcome::Unavailable(r) => FetchOutcome::Unavailable(r),
            FetchOutcome::Failed(r) => FetchOutcome::Failed(r),
        }
    }
}

/// How a location is sent to the provider.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationQuery {
    Name(String),
    Coordinates(Coordinates),
}

/// Source of weather readings and tide schedules for the context assembler.
#[async_trait]
pub trait EnvironmentSource: Send + Sync {
    async fn current(&self, location: &str) -> FetchOutcome<CurrentConditions>;

    async fn forecast(&self, location: &str) -> FetchOutcome<Vec<ForecastPoint>>;

    fn tides(&self, location: &str, now: NaiveTime) -> TideLookup;
}

/// Fetches current conditions and, if possible, the forecast.
///
/// The snapshot is only as available as the current conditions; a failed
/// forecast just leaves `forecast` empty.
pub async fn fetch_snapshot(
    source: &dyn EnvironmentSource,
    location: &str,
) -> FetchOutcome<EnvironmentalSnapshot> {
    let current = match source.current(location).await {
        FetchOutcome::Ready(c) => c,
        FetchOutcome::Unavailable(r) => return FetchOutcome::Unavailable(r),
        FetchOutcome::Failed(r) => return FetchOutcome::Failed(r),
    };
    let forecast = match source.forecast(location).await {
        FetchOutcome::Ready(points) => Some(points),
        other => {
            tracing::debug!(location, "forecast not included: {:?}", other.map(|_| ()));
            None
        }
    };
    FetchOutcome::Ready(EnvironmentalSnapshot { current, forecast })
}

// ============ OpenWeatherMap client ============

pub struct WeatherClient {
    http: reqwest::Client,
    config: WeatherConfig,
    api_key: Option<String>,
}

impl WeatherClient {
    /// Builds a client reading the API key from `config.api_key_env`.
    pub fn from_config(config: &WeatherConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            tracing::info!(
                env = %config.api_key_env,
                "weather API key not set; weather data will be unavailable"
            );
        }
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &WeatherConfig, api_key: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            config: config.clone(),
            api_key,
        })
    }

    pub fn query_for(&self, location: &str) -> LocationQuery {
        match self.config.coordinates.get(location) {
            Some(coords) => LocationQuery::Coordinates(*coords),
            None => LocationQuery::Name(location.to_string()),
        }
    }

    pub async fn fetch_current(&self, location: &str) -> FetchOutcome<CurrentConditions> {
        self.get_json::<OwmCurrent>("weather", location)
            .await
            .and_then_parse(|raw| raw.into_conditions(location))
    }

    pub async fn fetch_forecast(&self, location: &str) -> FetchOutcome<Vec<ForecastPoint>> {
        self.get_json::<OwmForecast>("forecast", location)
            .await
            .and_then_parse(OwmForecast::into_points)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        location: &str,
    ) -> FetchOutcome<T> {
        let Some(api_key) = self.api_key.as_deref() else {
            return FetchOutcome::Unavailable("weather API key not configured".to_string());
        };

        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut params: Vec<(&str, String)> = vec![
            ("appid", api_key.to_string()),
            ("units", self.config.units.clone()),
            ("lang", self.config.lang.clone()),
        ];
        match self.query_for(location) {
            LocationQuery::Coordinates(c) => {
                params.push(("lat", c.lat.to_string()));
                params.push(("lon", c.lon.to_string()));
            }
            LocationQuery::Name(name) => params.push(("q", name)),
        }

        let response = match self.http.get(&url).query(&params).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(endpoint, location, "weather request failed: {}", e);
                return FetchOutcome::Failed(format!("request failed: {}", e));
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(endpoint, location, %status, "weather provider returned an error");
            return FetchOutcome::Failed(format!("weather provider returned {}", status));
        }

        match response.json::<T>().await {
            Ok(body) => {
                tracing::debug!(endpoint, location, "weather data fetched");
                FetchOutcome::Ready(body)
            }
            Err(e) => {
                tracing::warn!(endpoint, location, "malformed weather response: {}", e);
                FetchOutcome::Failed(format!("malformed response: {}", e))
            }
        }
    }
}

trait ParseOutcome<T> {
    fn and_then_parse<U>(self, f: impl FnOnce(T) -> Option<U>) -> FetchOutcome<U>;
}

impl<T> ParseOutcome<T> for FetchOutcome<T> {
    fn and_then_parse<U>(self, f: impl FnOnce(T) -> Option<U>) -> FetchOutcome<U> {
        match self {
            FetchOutcome::Ready(v) => match f(v) {
                Some(u) => FetchOutcome::Ready(u),
                None => FetchOutcome::Failed("incomplete weather response".to_string()),
            },
            FetchOutcome::Unavailable(r) => FetchOutcome::Unavailable(r),
            FetchOutcome::Failed(r) => FetchOutcome::Failed(r),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OwmCurrent {
    #[serde(default)]
    name: Option<String>,
    main: OwmMain,
    #[serde(default)]
    weather: Vec<OwmDescription>,
    wind: OwmWind,
    #[serde(default)]
    visibility: Option<f64>,
    #[serde(default)]
    clouds: Option<OwmClouds>,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: f64,
    feels_like: f64,
    humidity: f64,
    pressure: f64,
}

#[derive(Debug, Deserialize)]
struct OwmDescription {
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwmWind {
    speed: f64,
    #[serde(default)]
    deg: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwmClouds {
    all: f64,
}

#[derive(Debug, Deserialize)]
struct OwmForecast {
    list: Vec<OwmForecastItem>,
}

#[derive(Debug, Deserialize)]
struct OwmForecastItem {
    dt: i64,
    main: OwmForecastMain,
    #[serde(default)]
    weather: Vec<OwmDescription>,
    wind: OwmWind,
}

#[derive(Debug, Deserialize)]
struct OwmForecastMain {
    temp: f64,
    humidity: f64,
}

impl OwmCurrent {
    fn into_conditions(self, requested: &str) -> Option<CurrentConditions> {
        let description = self.weather.into_iter().next()?.description;
        let location = self
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| requested.to_string());
        Some(CurrentConditions {
            location,
            temperature: self.main.temp,
            feels_like: self.main.feels_like,
            description,
            wind_speed: self.wind.speed,
            wind_direction: self.wind.deg,
            humidity: self.main.humidity,
            pressure: self.main.pressure,
            visibility: self.visibility,
            cloud_cover: self.clouds.map(|c| c.all),
        })
    }
}

impl OwmForecast {
    fn into_points(self) -> Option<Vec<ForecastPoint>> {
        self.list
            .into_iter()
            .map(|item| {
                Some(ForecastPoint {
                    timestamp: DateTime::<Utc>::from_timestamp(item.dt, 0)?,
                    temperature: item.main.temp,
                    description: item.weather.into_iter().next()?.description,
                    wind_speed: item.wind.speed,
                    humidity: item.main.humidity,
                })
            })
            .collect()
    }
}

// ============ Combined fetcher ============

/// Live weather plus static tides.
pub struct EnvironmentFetcher {
    weather: WeatherClient,
    tides: TideTable,
}

impl EnvironmentFetcher {
    pub fn new(weather: WeatherClient, tides: TideTable) -> Self {
        Self { weather, tides }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let weather = WeatherClient::from_config(&config.weather)?;
        let default_location = &config.classifier.default_location;
        let tides = match &config.tides.fixture {
            Some(path) => TideTable::from_path(path, default_location)?,
            None => TideTable::builtin(default_location),
        };
        Ok(Self::new(weather, tides))
    }
}

#[async_trait]
impl EnvironmentSource for EnvironmentFetcher {
    async fn current(&self, location: &str) -> FetchOutcome<CurrentConditions> {
        self.weather.fetch_current(location).await
    }

    async fn forecast(&self, location: &str) -> FetchOutcome<Vec<ForecastPoint>> {
        self.weather.fetch_forecast(location).await
    }

    fn tides(&self, location: &str, now: NaiveTime) -> TideLookup {
        self.tides.lookup(location, now)
    }
}
