//! Timer-driven scheduling: per tracked location, hourly ingestion plus a
//! once-daily summary of the completed UTC day.
//!
//! Single-process tick loop in the steady-cadence style of a polling
//! daemon. Each pass re-syncs the location registry on its own interval
//! (locations created after startup get picked up, deactivated ones
//! dropped), then fires whatever is due. Every triggered run is wrapped so
//! a failing location never aborts its siblings or the loop; correctness
//! under overlapping triggers is delegated to the store's unique keys.

use chrono::{DateTime, Days, Duration, NaiveTime, Utc};
use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::thread;
use std::time::{Duration as StdDuration, Instant};

use crate::db::models::{Location, Observation};
use crate::provider::WeatherProvider;
use crate::services::ingest::{IngestError, IngestMode, IngestionEngine};
use crate::services::summarize::{SummarizationEngine, SummarizeError};
use crate::store::{LocationDirectory, ObservationStore, StoreError, SummaryStore};

#[derive(Debug)]
pub enum FetchNowError {
    UnknownLocation(i64),
    Ingest(IngestError),
    Store(StoreError),
}

impl core::fmt::Display for FetchNowError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FetchNowError::UnknownLocation(id) => write!(f, "unknown location {}", id),
            FetchNowError::Ingest(e) => write!(f, "{}", e),
            FetchNowError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for FetchNowError {}

impl From<IngestError> for FetchNowError {
    fn from(value: IngestError) -> Self {
        FetchNowError::Ingest(value)
    }
}

impl From<StoreError> for FetchNowError {
    fn from(value: StoreError) -> Self {
        FetchNowError::Store(value)
    }
}

#[derive(Debug, Clone)]
struct LocationTimers {
    location: Location,
    next_ingest: DateTime<Utc>,
    next_summary: DateTime<Utc>,
}

/// Counters for one scheduler pass; used for loop logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassStats {
    pub ingests_ok: usize,
    pub ingests_failed: usize,
    pub summaries_ok: usize,
    pub summaries_empty: usize,
    pub summaries_failed: usize,
}

pub struct Scheduler<P: WeatherProvider> {
    ingestion: IngestionEngine<P>,
    summarization: SummarizationEngine,
    ingest_interval: Duration,
    resync_interval: Duration,
    timers: BTreeMap<i64, LocationTimers>,
    next_resync: Option<DateTime<Utc>>,
}

impl<P: WeatherProvider> Scheduler<P> {
    pub fn new(
        ingestion: IngestionEngine<P>,
        summarization: SummarizationEngine,
        ingest_interval: StdDuration,
        resync_interval: StdDuration,
    ) -> Self {
        Scheduler {
            ingestion,
            summarization,
            ingest_interval: Duration::from_std(ingest_interval).unwrap_or(Duration::hours(1)),
            resync_interval: Duration::from_std(resync_interval).unwrap_or(Duration::minutes(5)),
            timers: BTreeMap::new(),
            next_resync: None,
        }
    }

    /// Run forever at a steady tick cadence.
    pub fn run_loop<S>(&mut self, store: &mut S, tick: StdDuration) -> Result<(), String>
    where
        S: ObservationStore + SummaryStore + LocationDirectory,
    {
        info!(
            "Scheduler started (ingest_interval={}s, resync_interval={}s, tick={}s)",
            self.ingest_interval.num_seconds(),
            self.resync_interval.num_seconds(),
            tick.as_secs()
        );
        loop {
            let tick_start = Instant::now();
            let stats = self.run_pass(store, Utc::now());
            debug!(
                "Scheduler pass: ingests ok={} failed={}, summaries ok={} empty={} failed={}",
                stats.ingests_ok,
                stats.ingests_failed,
                stats.summaries_ok,
                stats.summaries_empty,
                stats.summaries_failed
            );

            // Maintain steady cadence
            let elapsed = tick_start.elapsed();
            if elapsed < tick {
                thread::sleep(tick - elapsed);
            }
        }
    }

    /// One scheduler pass at instant `now`: resync the registry if due, then
    /// fire every due trigger. Per-location failures are contained here.
    pub fn run_pass<S>(&mut self, store: &mut S, now: DateTime<Utc>) -> PassStats
    where
        S: ObservationStore + SummaryStore + LocationDirectory,
    {
        if self.next_resync.map_or(true, |due| now >= due) {
            if let Err(e) = self.resync_registry(store, now) {
                warn!("Scheduler: registry resync failed: {}", e);
            }
            self.next_resync = Some(now + self.resync_interval);
        }

        let mut stats = PassStats::default();
        let due_ids: Vec<i64> = self.timers.keys().copied().collect();
        for id in due_ids {
            let (location, ingest_due) = match self.timers.get(&id) {
                Some(t) => (t.location.clone(), now >= t.next_ingest),
                None => continue,
            };

            if ingest_due {
                if self.ingest_one(store, &location, now) {
                    stats.ingests_ok += 1;
                } else {
                    stats.ingests_failed += 1;
                }
                if let Some(t) = self.timers.get_mut(&id) {
                    t.next_ingest = now + self.ingest_interval;
                }
            }

            let summary_due = self.timers.get(&id).map(|t| now >= t.next_summary).unwrap_or(false);
            if summary_due {
                // summarize the just-completed UTC day
                let completed_day = now.date_naive() - Days::new(1);
                match self.summarization.summarize_location_date(store, location.id, completed_day) {
                    Ok(_) => stats.summaries_ok += 1,
                    Err(SummarizeError::NoDataForPeriod { .. }) => {
                        info!("Scheduler: location {} has no data for {}, skipping summary", location.id, completed_day);
                        stats.summaries_empty += 1;
                    }
                    Err(SummarizeError::Store(StoreError::Conflict(msg))) => {
                        error!("Scheduler: summary conflict for location {}: {}", location.id, msg);
                        stats.summaries_failed += 1;
                    }
                    Err(e) => {
                        warn!("Scheduler: summary failed for location {}: {}", location.id, e);
                        stats.summaries_failed += 1;
                    }
                }
                if let Some(t) = self.timers.get_mut(&id) {
                    t.next_summary = next_utc_midnight(now);
                }
            }
        }
        stats
    }

    /// User-triggered "fetch now"; same engine entry point as the timers,
    /// so the same rate limit and failure handling apply.
    pub fn fetch_now<S>(&mut self, store: &mut S, location_id: i64, caller: &str) -> Result<Observation, FetchNowError>
    where
        S: ObservationStore + LocationDirectory,
    {
        let location = store
            .get_location(location_id)?
            .ok_or(FetchNowError::UnknownLocation(location_id))?;
        Ok(self.ingestion.ingest_on_demand(store, &location, caller)?)
    }

    fn ingest_one<S: ObservationStore>(&mut self, store: &mut S, location: &Location, now: DateTime<Utc>) -> bool {
        let hourly = self
            .ingestion
            .ingest_location_at(store, location, IngestMode::ScheduledHourly, now);
        let current = self
            .ingestion
            .ingest_location_at(store, location, IngestMode::ScheduledCurrent, now);

        let mut ok = true;
        if let Err(e) = &hourly {
            log_ingest_error(location.id, e);
            ok = false;
        }
        if let Err(e) = &current {
            log_ingest_error(location.id, e);
            ok = false;
        }
        ok
    }

    fn resync_registry<S: LocationDirectory>(&mut self, store: &mut S, now: DateTime<Utc>) -> Result<(), StoreError> {
        let active = store.list_active_locations()?;

        let active_ids: Vec<i64> = active.iter().map(|l| l.id).collect();
        let dropped: Vec<i64> = self.timers.keys().copied().filter(|id| !active_ids.contains(id)).collect();
        for id in dropped {
            self.timers.remove(&id);
            info!("Scheduler: location {} deactivated, timers dropped", id);
        }

        for location in active {
            match self.timers.get_mut(&location.id) {
                Some(timers) => {
                    // coordinates/name may have been edited
                    timers.location = location;
                }
                None => {
                    info!("Scheduler: registered location {} ({})", location.id, location.name);
                    self.timers.insert(
                        location.id,
                        LocationTimers {
                            location,
                            // first fetch happens on this pass, like the
                            // immediate fetch on location creation
                            next_ingest: now,
                            next_summary: next_utc_midnight(now),
                        },
                    );
                }
            }
        }
        Ok(())
    }

    #[cfg(test)]
    fn registered_count(&self) -> usize {
        self.timers.len()
    }
}

fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    (now.date_naive() + Days::new(1)).and_time(NaiveTime::MIN).and_utc()
}

fn log_ingest_error(location_id: i64, e: &IngestError) {
    match e {
        IngestError::Store(StoreError::Conflict(msg)) => {
            error!("Scheduler: unexpected storage conflict for location {}: {}", location_id, msg);
        }
        other => {
            warn!("Scheduler: ingest failed for location {}, skipping this cycle: {}", location_id, other);
        }
    }
}
