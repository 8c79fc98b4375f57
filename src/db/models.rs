//! Diesel model structs for tracked locations and time-series data.
//!
//! Important: Migrations will set up a TimescaleDB hypertable for
//! `observations`.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema;

/// Sampling resolution tag of an observation. Stored as text; part of the
/// (location, time, granularity) unique key.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hourly,
    Daily,
    Current,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hourly => "hourly",
            Granularity::Daily => "daily",
            Granularity::Current => "current",
        }
    }
}

impl core::fmt::Display for Granularity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Standard values for the observation `source` provenance tag. External
// writers (e.g. a web layer inserting rows directly) tag their own sources.
pub mod ingest_source {
    pub const SCHEDULED: &str = "scheduled";
    pub const ON_DEMAND: &str = "on_demand";
}

/// Tracked point of interest. CRUD is owned by the (out-of-scope) web layer;
/// this crate only reads locations through `store::LocationDirectory`.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::locations)]
pub struct Location {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: Option<String>,
    pub is_active: bool,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

// Hypertable: observations. Unique on (location_id, time, granularity);
// `rain_mm` and `wind_speed` use a 0.0 sentinel for absent readings (zero is
// the identity for their aggregates), temperature/humidity/code stay NULL.
#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::observations)]
#[diesel(primary_key(id, time))]
#[diesel(belongs_to(Location))]
pub struct Observation {
    pub id: i64,
    pub time: DateTime<Utc>,
    pub location_id: i64,
    pub granularity: String,
    pub source: String,
    pub temp_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub rain_mm: f64,
    pub wind_speed: f64,
    pub weather_code: Option<i32>,
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::observations)]
pub struct NewObservation {
    pub time: DateTime<Utc>,
    pub location_id: i64,
    pub granularity: String,
    pub source: String,
    pub temp_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub rain_mm: f64,
    pub wind_speed: f64,
    pub weather_code: Option<i32>,
}

/// One fully recomputed aggregate row per (location, UTC calendar date).
#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::daily_summaries)]
#[diesel(primary_key(location_id, day))]
#[diesel(belongs_to(Location))]
pub struct DailySummary {
    pub location_id: i64,
    pub day: NaiveDate,
    pub temp_min: Option<f64>,
    pub temp_max: Option<f64>,
    pub rain_total: f64,
    pub wind_max: f64,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::daily_summaries)]
pub struct NewDailySummary {
    pub location_id: i64,
    pub day: NaiveDate,
    pub temp_min: Option<f64>,
    pub temp_max: Option<f64>,
    pub rain_total: f64,
    pub wind_max: f64,
    pub computed_at: DateTime<Utc>,
}
