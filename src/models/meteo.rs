//! Wire models for the Open-Meteo forecast API.
//!
//! Scope: types only; decoding and validation happen in `crate::provider`.
//!
//! Notes
//! - Per-variable arrays are time-aligned against `hourly.time` but the API
//!   does not guarantee uniform lengths; every array is therefore optional
//!   and may be shorter than `time`.
//! - Timestamps arrive as zone-less ISO-8601 strings in the requested
//!   timezone (we always request UTC) and are parsed by the provider.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ForecastResponse {
    #[serde(default)]
    pub hourly: Option<HourlyBlock>,
    #[serde(default)]
    pub current: Option<CurrentBlock>,
}

/// Parallel per-variable arrays, one entry per timestamp in `time`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HourlyBlock {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default)]
    pub temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    pub relative_humidity_2m: Vec<Option<f64>>,
    #[serde(default)]
    pub precipitation: Vec<Option<f64>>,
    #[serde(default)]
    pub wind_speed_10m: Vec<Option<f64>>,
    #[serde(default)]
    pub weather_code: Vec<Option<i32>>,
}

/// Single sample at the provider's "now".
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentBlock {
    pub time: String,
    #[serde(default)]
    pub temperature_2m: Option<f64>,
    #[serde(default)]
    pub relative_humidity_2m: Option<f64>,
    #[serde(default)]
    pub precipitation: Option<f64>,
    #[serde(default)]
    pub wind_speed_10m: Option<f64>,
    #[serde(default)]
    pub weather_code: Option<i32>,
}
