//! HTTP client for the Open-Meteo forecast API.
//!
//! - Blocking client using `ureq` (no async), bounded total timeout per call.
//! - Decodes into the typed wire models in `crate::models::meteo` and
//!   normalizes them into fixed-shape [`ObservationSample`]s at this
//!   boundary, so schemaless provider payloads never propagate inward.
//! - Performs NO retries; retry policy belongs to the caller (the next
//!   scheduled cycle naturally re-covers the same window).

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use log::debug;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::models::meteo::{CurrentBlock, ForecastResponse, HourlyBlock};

pub const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com/v1";

const HOURLY_VARIABLES: &str = "temperature_2m,relative_humidity_2m,precipitation,wind_speed_10m,weather_code";
const CURRENT_VARIABLES: &str = HOURLY_VARIABLES;
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[derive(Debug, Clone)]
pub enum ProviderError {
    /// Network failure, timeout, or non-success HTTP status. Retryable on
    /// the next scheduled cycle.
    Unavailable(String),
    /// Structurally malformed or incomplete payload (missing hourly/current
    /// block, undecodable body, unparseable timestamps). Not retryable
    /// within the same call.
    Incomplete(String),
}

impl core::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ProviderError::Unavailable(s) => write!(f, "provider unavailable: {}", s),
            ProviderError::Incomplete(s) => write!(f, "provider data incomplete: {}", s),
        }
    }
}

impl std::error::Error for ProviderError {}

/// One normalized weather reading. A `None` variable means the provider had
/// no entry for that timestamp; callers decide the storage sentinel.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationSample {
    pub time: DateTime<Utc>,
    pub temp_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub rain_mm: Option<f64>,
    pub wind_speed: Option<f64>,
    pub weather_code: Option<i32>,
}

/// Fetch-and-normalize boundary to the external weather provider.
/// Implementations are pure fetchers: no storage writes, no retries.
pub trait WeatherProvider {
    /// Ordered hourly samples covering `[start, end]` in UTC. The sequence
    /// length follows the provider's `time` array; individual variables may
    /// be absent for any timestamp.
    fn fetch_range(
        &self,
        lat: f64,
        lon: f64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ObservationSample>, ProviderError>;

    /// Single sample at the provider's "now".
    fn fetch_current(&self, lat: f64, lon: f64) -> Result<ObservationSample, ProviderError>;
}

pub struct OpenMeteoClient {
    agent: ureq::Agent,
    base_url: String,
}

impl OpenMeteoClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        OpenMeteoClient {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.agent.get(&url).set("Accept", "application/json");
        for (k, v) in query {
            req = req.query(k, v);
        }

        match req.call() {
            Ok(res) => {
                let mut de = serde_json::Deserializer::from_reader(res.into_reader());
                serde_path_to_error::deserialize(&mut de)
                    .map_err(|e| ProviderError::Incomplete(format!("decode failed at `{}`: {}", e.path(), e)))
            }
            Err(ureq::Error::Transport(t)) => Err(ProviderError::Unavailable(t.to_string())),
            Err(ureq::Error::Status(status, res)) => {
                let body = res.into_string().unwrap_or_else(|_| String::from("<no body>"));
                Err(ProviderError::Unavailable(format!("http {}: {}", status, body)))
            }
        }
    }
}

impl WeatherProvider for OpenMeteoClient {
    fn fetch_range(
        &self,
        lat: f64,
        lon: f64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ObservationSample>, ProviderError> {
        let query = [
            ("latitude", format!("{:.4}", lat)),
            ("longitude", format!("{:.4}", lon)),
            ("hourly", HOURLY_VARIABLES.to_string()),
            ("start_date", start.date_naive().to_string()),
            ("end_date", end.date_naive().to_string()),
            ("timezone", "UTC".to_string()),
        ];
        debug!(
            "Provider: fetch_range lat={:.4} lon={:.4} [{}, {}]",
            lat,
            lon,
            start.to_rfc3339_opts(SecondsFormat::Secs, true),
            end.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let resp: ForecastResponse = self.get_json("/forecast", &query)?;
        let hourly = resp
            .hourly
            .ok_or_else(|| ProviderError::Incomplete("response has no `hourly` block".to_string()))?;
        normalize_hourly(&hourly)
    }

    fn fetch_current(&self, lat: f64, lon: f64) -> Result<ObservationSample, ProviderError> {
        let query = [
            ("latitude", format!("{:.4}", lat)),
            ("longitude", format!("{:.4}", lon)),
            ("current", CURRENT_VARIABLES.to_string()),
            ("timezone", "UTC".to_string()),
        ];
        debug!("Provider: fetch_current lat={:.4} lon={:.4}", lat, lon);
        let resp: ForecastResponse = self.get_json("/forecast", &query)?;
        let current = resp
            .current
            .ok_or_else(|| ProviderError::Incomplete("response has no `current` block".to_string()))?;
        normalize_current(&current)
    }
}

/// Parse a zone-less Open-Meteo timestamp (always requested in UTC).
fn parse_time(raw: &str) -> Result<DateTime<Utc>, ProviderError> {
    NaiveDateTime::parse_from_str(raw, TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| ProviderError::Incomplete(format!("unparseable timestamp `{}`: {}", raw, e)))
}

/// Align per-variable arrays against the `time` axis. Arrays shorter than
/// `time` (the mismatched-length failure mode) yield absent entries for the
/// tail instead of dropping records or failing the whole fetch.
fn normalize_hourly(hourly: &HourlyBlock) -> Result<Vec<ObservationSample>, ProviderError> {
    if hourly.time.is_empty() {
        return Err(ProviderError::Incomplete("`hourly.time` is empty".to_string()));
    }

    let mut samples = Vec::with_capacity(hourly.time.len());
    for (i, raw) in hourly.time.iter().enumerate() {
        samples.push(ObservationSample {
            time: parse_time(raw)?,
            temp_c: hourly.temperature_2m.get(i).copied().flatten(),
            humidity_pct: hourly.relative_humidity_2m.get(i).copied().flatten(),
            rain_mm: hourly.precipitation.get(i).copied().flatten(),
            wind_speed: hourly.wind_speed_10m.get(i).copied().flatten(),
            weather_code: hourly.weather_code.get(i).copied().flatten(),
        });
    }
    Ok(samples)
}

fn normalize_current(current: &CurrentBlock) -> Result<ObservationSample, ProviderError> {
    Ok(ObservationSample {
        time: parse_time(&current.time)?,
        temp_c: current.temperature_2m,
        humidity_pct: current.relative_humidity_2m,
        rain_mm: current.precipitation,
        wind_speed: current.wind_speed_10m,
        weather_code: current.weather_code,
    })
}
