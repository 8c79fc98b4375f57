//! Ingestion engine: provider fetch -> normalized observation rows ->
//! duplicate-safe storage writes.
//!
//! One contract, parameterized by mode: the bulk hourly path inserts with
//! skip-duplicate semantics (first writer wins), the single "current" path
//! upserts (last writer wins). Both share the same transform. The
//! user-triggered path ([`IngestionEngine::ingest_on_demand`]) runs both
//! writes behind a per-caller quota checked before any provider call.

use chrono::{DateTime, NaiveTime, Utc};
use log::{debug, info};
use std::time::Instant;

use crate::db::models::{ingest_source, Granularity, Location, NewObservation, Observation};
use crate::provider::{ObservationSample, ProviderError, WeatherProvider};
use crate::ratelimit::FixedWindowLimiter;
use crate::store::{ObservationStore, StoreError};

/// Timer-driven ingest modes. User-triggered "fetch now" is not a mode:
/// it goes exclusively through [`IngestionEngine::ingest_on_demand`], which
/// checks the caller's quota before any provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    /// Recurring timer-driven fetch of today's hourly window.
    ScheduledHourly,
    /// Recurring timer-driven refresh of the single "current" reading.
    ScheduledCurrent,
}

#[derive(Debug)]
pub enum IngestError {
    Provider(ProviderError),
    /// On-demand quota exceeded; no provider call was made.
    RateLimited { identity: String },
    Store(StoreError),
}

impl core::fmt::Display for IngestError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            IngestError::Provider(e) => write!(f, "{}", e),
            IngestError::RateLimited { identity } => {
                write!(f, "rate limited: on-demand quota exhausted for `{}`", identity)
            }
            IngestError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IngestError::Provider(e) => Some(e),
            IngestError::Store(e) => Some(e),
            IngestError::RateLimited { .. } => None,
        }
    }
}

impl From<ProviderError> for IngestError {
    fn from(value: ProviderError) -> Self {
        IngestError::Provider(value)
    }
}

impl From<StoreError> for IngestError {
    fn from(value: StoreError) -> Self {
        IngestError::Store(value)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Samples returned by the provider.
    pub fetched: usize,
    /// Rows the store physically wrote: newly inserted rows on the
    /// skip-duplicate batch path, the one replaced-or-inserted row on the
    /// upsert path.
    pub written: usize,
}

pub struct IngestionEngine<P: WeatherProvider> {
    provider: P,
    limiter: FixedWindowLimiter,
}

impl<P: WeatherProvider> IngestionEngine<P> {
    pub fn new(provider: P, limiter: FixedWindowLimiter) -> Self {
        IngestionEngine { provider, limiter }
    }

    /// Ingest one location for `mode`. Either succeeds with >= 0 newly
    /// visible observations or fails without partial corruption; duplicate
    /// keys from overlapping runs are absorbed by the store's unique key.
    pub fn ingest_location<S: ObservationStore>(
        &mut self,
        store: &mut S,
        location: &Location,
        mode: IngestMode,
    ) -> Result<IngestOutcome, IngestError> {
        self.ingest_location_at(store, location, mode, Utc::now())
    }

    pub fn ingest_location_at<S: ObservationStore>(
        &mut self,
        store: &mut S,
        location: &Location,
        mode: IngestMode,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome, IngestError> {
        match mode {
            IngestMode::ScheduledHourly => self.ingest_window(store, location, ingest_source::SCHEDULED, now),
            IngestMode::ScheduledCurrent => self
                .ingest_current(store, location, ingest_source::SCHEDULED)
                .map(|_| IngestOutcome { fetched: 1, written: 1 }),
        }
    }

    /// User-triggered "fetch now": re-covers today's hourly window and
    /// refreshes the current reading, returning the fresh current row.
    /// Rejected with `RateLimited` before any provider call when the
    /// caller's fixed-window quota is exhausted.
    pub fn ingest_on_demand<S: ObservationStore>(
        &mut self,
        store: &mut S,
        location: &Location,
        caller: &str,
    ) -> Result<Observation, IngestError> {
        self.ingest_on_demand_at(store, location, caller, Utc::now(), Instant::now())
    }

    pub fn ingest_on_demand_at<S: ObservationStore>(
        &mut self,
        store: &mut S,
        location: &Location,
        caller: &str,
        now: DateTime<Utc>,
        clock: Instant,
    ) -> Result<Observation, IngestError> {
        if !self.limiter.try_acquire(caller, clock) {
            return Err(IngestError::RateLimited {
                identity: caller.to_string(),
            });
        }

        self.ingest_window(store, location, ingest_source::ON_DEMAND, now)?;
        self.ingest_current(store, location, ingest_source::ON_DEMAND)
    }

    #[cfg(test)]
    pub(crate) fn provider(&self) -> &P {
        &self.provider
    }

    /// Start of the current UTC day through `now`: re-running mid-day only
    /// ever re-covers today, bounding the idempotent write volume.
    fn ingest_window<S: ObservationStore>(
        &mut self,
        store: &mut S,
        location: &Location,
        source: &str,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome, IngestError> {
        let window_start = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        let samples = self
            .provider
            .fetch_range(location.latitude, location.longitude, window_start, now)?;
        let fetched = samples.len();

        // Defensive clamp against provider clock skew: anything outside the
        // requested window is dropped, not stored.
        let rows: Vec<NewObservation> = samples
            .into_iter()
            .filter(|s| s.time >= window_start && s.time <= now)
            .map(|s| observation_row(location.id, Granularity::Hourly, source, &s))
            .collect();
        let clamped = fetched - rows.len();
        if clamped > 0 {
            debug!(
                "Ingest: location {} dropped {} out-of-window sample(s)",
                location.id, clamped
            );
        }

        let written = store.insert_observations_skip_duplicates(&rows)?;
        info!(
            "Ingest: location {} fetched={} written={} (source={})",
            location.id, fetched, written, source
        );
        Ok(IngestOutcome { fetched, written })
    }

    fn ingest_current<S: ObservationStore>(
        &mut self,
        store: &mut S,
        location: &Location,
        source: &str,
    ) -> Result<Observation, IngestError> {
        let sample = self.provider.fetch_current(location.latitude, location.longitude)?;
        let row = observation_row(location.id, Granularity::Current, source, &sample);
        let stored = store.upsert_observation(&row)?;
        debug!(
            "Ingest: location {} current reading upserted at {}",
            location.id, stored.time
        );
        Ok(stored)
    }
}

/// Sentinel policy: absent precipitation/wind become 0.0 (the identity for
/// their sum/max aggregates); absent temperature/humidity/code stay NULL so
/// min/max never see fabricated values.
fn observation_row(location_id: i64, granularity: Granularity, source: &str, sample: &ObservationSample) -> NewObservation {
    NewObservation {
        time: sample.time,
        location_id,
        granularity: granularity.as_str().to_string(),
        source: source.to_string(),
        temp_c: sample.temp_c,
        humidity_pct: sample.humidity_pct,
        rain_mm: sample.rain_mm.unwrap_or(0.0),
        wind_speed: sample.wind_speed.unwrap_or(0.0),
        weather_code: sample.weather_code,
    }
}
