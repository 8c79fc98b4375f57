//! Daily rollups: one fully recomputed aggregate per (location, UTC date).
//!
//! The aggregate is never patched incrementally: every run reads the day's
//! hourly observations and overwrites the summary row, so replays and
//! late-arriving observations are handled by simply running again.

use chrono::{NaiveDate, Utc};
use log::info;

use crate::db::models::NewDailySummary;
use crate::store::{ObservationStore, StoreError, SummaryStore};

#[derive(Debug)]
pub enum SummarizeError {
    /// No hourly observations stored for (location, date). Not a fault;
    /// callers log and move on. No summary row is written.
    NoDataForPeriod { location_id: i64, day: NaiveDate },
    Store(StoreError),
}

impl core::fmt::Display for SummarizeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SummarizeError::NoDataForPeriod { location_id, day } => {
                write!(f, "no observations for location {} on {}", location_id, day)
            }
            SummarizeError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SummarizeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SummarizeError::Store(e) => Some(e),
            SummarizeError::NoDataForPeriod { .. } => None,
        }
    }
}

impl From<StoreError> for SummarizeError {
    fn from(value: StoreError) -> Self {
        SummarizeError::Store(value)
    }
}

#[derive(Debug, Default)]
pub struct SummarizationEngine;

impl SummarizationEngine {
    pub fn new() -> Self {
        SummarizationEngine
    }

    /// Recompute and upsert the summary for (location, `day`), bounded to
    /// [00:00, 24:00) UTC. Temperature min/max range over non-null readings
    /// only and stay NULL when the whole day has none.
    pub fn summarize_location_date<S: ObservationStore + SummaryStore>(
        &self,
        store: &mut S,
        location_id: i64,
        day: NaiveDate,
    ) -> Result<NewDailySummary, SummarizeError> {
        let observations = store.hourly_observations_for_day(location_id, day)?;
        if observations.is_empty() {
            return Err(SummarizeError::NoDataForPeriod { location_id, day });
        }

        let temps = observations.iter().filter_map(|o| o.temp_c);
        let temp_min = temps.clone().reduce(f64::min);
        let temp_max = temps.reduce(f64::max);
        let rain_total = observations.iter().map(|o| o.rain_mm).sum();
        let wind_max = observations.iter().map(|o| o.wind_speed).fold(0.0, f64::max);

        let row = NewDailySummary {
            location_id,
            day,
            temp_min,
            temp_max,
            rain_total,
            wind_max,
            computed_at: Utc::now(),
        };
        store.upsert_daily_summary(&row)?;
        info!(
            "Summary: location {} day {} recomputed from {} observation(s)",
            location_id,
            day,
            observations.len()
        );
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{ingest_source, Granularity, NewObservation};
    use crate::store::memory::MemoryStore;
    use chrono::{DateTime, TimeZone};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, 27).unwrap()
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 27, hour, 0, 0).unwrap()
    }

    fn hourly_row(hour: u32, temp: Option<f64>, rain: f64, wind: f64) -> NewObservation {
        NewObservation {
            time: at(hour),
            location_id: 1,
            granularity: Granularity::Hourly.as_str().to_string(),
            source: ingest_source::SCHEDULED.to_string(),
            temp_c: temp,
            humidity_pct: Some(65.0),
            rain_mm: rain,
            wind_speed: wind,
            weather_code: Some(3),
        }
    }

    fn seeded_store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.add_location(1, 18.7883, 98.9853);
        let rows = vec![
            hourly_row(0, Some(25.0), 0.0, 3.0),
            hourly_row(5, Some(27.4), 1.2, 0.0), // wind sentinel
            hourly_row(12, Some(30.1), 0.4, 8.0),
        ];
        store.insert_observations_skip_duplicates(&rows).expect("seed");
        store
    }

    #[test]
    fn computes_min_max_sum_aggregates() {
        let mut store = seeded_store();
        let engine = SummarizationEngine::new();

        let summary = engine
            .summarize_location_date(&mut store, 1, day())
            .expect("summarize");
        assert_eq!(summary.temp_min, Some(25.0));
        assert_eq!(summary.temp_max, Some(30.1));
        assert!((summary.rain_total - 1.6).abs() < 1e-9);
        assert_eq!(summary.wind_max, 8.0);

        let stored = store.get_daily_summary(1, day()).expect("read").expect("row written");
        assert_eq!(stored.temp_max, Some(30.1));
    }

    #[test]
    fn rerun_is_deterministic_and_recomputes_fully() {
        let mut store = seeded_store();
        let engine = SummarizationEngine::new();

        let first = engine.summarize_location_date(&mut store, 1, day()).expect("first");

        // a late observation arrives; the rerun must reflect the full set,
        // not an incremental patch
        store
            .insert_observations_skip_duplicates(&[hourly_row(18, Some(21.5), 2.0, 11.0)])
            .expect("late row");
        let second = engine.summarize_location_date(&mut store, 1, day()).expect("second");

        assert_eq!(first.temp_min, Some(25.0));
        assert_eq!(second.temp_min, Some(21.5));
        assert_eq!(second.wind_max, 11.0);
        assert!((second.rain_total - 3.6).abs() < 1e-9);

        let third = engine.summarize_location_date(&mut store, 1, day()).expect("third");
        assert_eq!(third.temp_min, second.temp_min);
        assert_eq!(third.temp_max, second.temp_max);
        assert_eq!(third.rain_total, second.rain_total);
        assert_eq!(third.wind_max, second.wind_max);
    }

    #[test]
    fn empty_day_signals_no_data_and_writes_nothing() {
        let mut store = MemoryStore::new();
        store.add_location(1, 18.7883, 98.9853);
        let engine = SummarizationEngine::new();

        let result = engine.summarize_location_date(&mut store, 1, day());
        assert!(matches!(result, Err(SummarizeError::NoDataForPeriod { .. })));
        assert!(store.get_daily_summary(1, day()).expect("read").is_none());
    }

    #[test]
    fn all_null_temperatures_yield_null_min_max() {
        let mut store = MemoryStore::new();
        store.add_location(1, 18.7883, 98.9853);
        store
            .insert_observations_skip_duplicates(&[hourly_row(3, None, 0.5, 2.0), hourly_row(4, None, 0.5, 6.0)])
            .expect("seed");
        let engine = SummarizationEngine::new();

        let summary = engine.summarize_location_date(&mut store, 1, day()).expect("summarize");
        assert_eq!(summary.temp_min, None);
        assert_eq!(summary.temp_max, None);
        assert!((summary.rain_total - 1.0).abs() < 1e-9);
        assert_eq!(summary.wind_max, 6.0);
    }

    #[test]
    fn only_hourly_granularity_contributes() {
        let mut store = seeded_store();
        let current = NewObservation {
            granularity: Granularity::Current.as_str().to_string(),
            temp_c: Some(99.0),
            ..hourly_row(13, Some(99.0), 0.0, 50.0)
        };
        store.upsert_observation(&current).expect("current row");
        let engine = SummarizationEngine::new();

        let summary = engine.summarize_location_date(&mut store, 1, day()).expect("summarize");
        assert_eq!(summary.temp_max, Some(30.1));
        assert_eq!(summary.wind_max, 8.0);
    }

    #[test]
    fn observations_outside_the_day_are_excluded() {
        let mut store = seeded_store();
        let mut next_day = hourly_row(0, Some(10.0), 5.0, 20.0);
        next_day.time = Utc.with_ymd_and_hms(2025, 8, 28, 0, 0, 0).unwrap();
        store.insert_observations_skip_duplicates(&[next_day]).expect("row");
        let engine = SummarizationEngine::new();

        let summary = engine.summarize_location_date(&mut store, 1, day()).expect("summarize");
        assert_eq!(summary.temp_min, Some(25.0));
        assert!((summary.rain_total - 1.6).abs() < 1e-9);
    }
}
