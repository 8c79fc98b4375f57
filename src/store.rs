//! Persistence seams for the ingestion core.
//!
//! The engines never touch a connection directly: they receive an explicit
//! store handle implementing these traits. Production uses [`PgStore`]
//! (opened once at process start, dropped at shutdown); unit tests use the
//! in-memory store in [`memory`].
//!
//! Cross-task coordination is delegated entirely to the unique keys below;
//! (location_id, time, granularity) for observations, (location_id, day) for
//! summaries. No in-process locks.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::PgConnection;

use crate::db::models::{DailySummary, Location, NewDailySummary, NewObservation, Observation};
use crate::schema;

#[derive(Debug)]
pub enum StoreError {
    /// Unique-key violation outside the expected upsert/skip-duplicate
    /// paths. Indicates a logic error; surfaced loudly by callers.
    Conflict(String),
    /// Any other database failure.
    Database(String),
}

impl core::fmt::Display for StoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StoreError::Conflict(s) => write!(f, "storage conflict: {}", s),
            StoreError::Database(s) => write!(f, "database error: {}", s),
        }
    }
}

impl std::error::Error for StoreError {}

fn map_diesel(context: &str, e: DieselError) -> StoreError {
    match e {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            StoreError::Conflict(format!("{}: {}", context, info.message()))
        }
        other => StoreError::Database(format!("{}: {}", context, other)),
    }
}

/// UTC day bounds `[00:00:00, 24:00:00)`.
pub fn day_bounds_utc(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day.and_time(NaiveTime::MIN).and_utc();
    (start, start + chrono::Duration::days(1))
}

/// Read access to the externally-owned location directory.
pub trait LocationDirectory {
    fn list_active_locations(&mut self) -> Result<Vec<Location>, StoreError>;
    fn get_location(&mut self, id: i64) -> Result<Option<Location>, StoreError>;
}

/// Raw weather observations, at most one per (location, time, granularity).
pub trait ObservationStore {
    /// Bulk insert; rows conflicting on the unique key are silently skipped
    /// (first writer wins). Returns the number of newly inserted rows.
    fn insert_observations_skip_duplicates(&mut self, rows: &[NewObservation]) -> Result<usize, StoreError>;

    /// Insert-or-replace on the unique key (last writer wins). Returns the
    /// stored row.
    fn upsert_observation(&mut self, row: &NewObservation) -> Result<Observation, StoreError>;

    /// All hourly-granularity observations for (location, UTC day), ordered
    /// by time.
    fn hourly_observations_for_day(&mut self, location_id: i64, day: NaiveDate) -> Result<Vec<Observation>, StoreError>;
}

/// One derived aggregate per (location, date).
pub trait SummaryStore {
    fn upsert_daily_summary(&mut self, row: &NewDailySummary) -> Result<(), StoreError>;
    fn get_daily_summary(&mut self, location_id: i64, day: NaiveDate) -> Result<Option<DailySummary>, StoreError>;
}

pub struct PgStore {
    conn: PgConnection,
}

impl PgStore {
    pub fn new(conn: PgConnection) -> Self {
        PgStore { conn }
    }
}

impl LocationDirectory for PgStore {
    fn list_active_locations(&mut self) -> Result<Vec<Location>, StoreError> {
        use schema::locations::dsl as L;

        L::locations
            .filter(L::is_active.eq(true))
            .order(L::id.asc())
            .select(Location::as_select())
            .load(&mut self.conn)
            .map_err(|e| map_diesel("list active locations", e))
    }

    fn get_location(&mut self, id: i64) -> Result<Option<Location>, StoreError> {
        use schema::locations::dsl as L;

        L::locations
            .filter(L::id.eq(id))
            .select(Location::as_select())
            .first(&mut self.conn)
            .optional()
            .map_err(|e| map_diesel("get location", e))
    }
}

impl ObservationStore for PgStore {
    fn insert_observations_skip_duplicates(&mut self, rows: &[NewObservation]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        use schema::observations::dsl as O;

        diesel::insert_into(O::observations)
            .values(rows)
            .on_conflict((O::location_id, O::time, O::granularity))
            .do_nothing()
            .execute(&mut self.conn)
            .map_err(|e| map_diesel("insert observations", e))
    }

    fn upsert_observation(&mut self, row: &NewObservation) -> Result<Observation, StoreError> {
        use schema::observations::dsl as O;

        diesel::insert_into(O::observations)
            .values(row)
            .on_conflict((O::location_id, O::time, O::granularity))
            .do_update()
            .set((
                O::source.eq(row.source.clone()),
                O::temp_c.eq(row.temp_c),
                O::humidity_pct.eq(row.humidity_pct),
                O::rain_mm.eq(row.rain_mm),
                O::wind_speed.eq(row.wind_speed),
                O::weather_code.eq(row.weather_code),
            ))
            .returning(Observation::as_returning())
            .get_result(&mut self.conn)
            .map_err(|e| map_diesel("upsert observation", e))
    }

    fn hourly_observations_for_day(&mut self, location_id: i64, day: NaiveDate) -> Result<Vec<Observation>, StoreError> {
        use schema::observations::dsl as O;

        let (start, end) = day_bounds_utc(day);
        O::observations
            .filter(
                O::location_id
                    .eq(location_id)
                    .and(O::granularity.eq(crate::db::models::Granularity::Hourly.as_str()))
                    .and(O::time.ge(start))
                    .and(O::time.lt(end)),
            )
            .order(O::time.asc())
            .select(Observation::as_select())
            .load(&mut self.conn)
            .map_err(|e| map_diesel("load hourly observations", e))
    }
}

impl SummaryStore for PgStore {
    fn upsert_daily_summary(&mut self, row: &NewDailySummary) -> Result<(), StoreError> {
        use schema::daily_summaries::dsl as S;

        diesel::insert_into(S::daily_summaries)
            .values(row)
            .on_conflict((S::location_id, S::day))
            .do_update()
            .set((
                S::temp_min.eq(row.temp_min),
                S::temp_max.eq(row.temp_max),
                S::rain_total.eq(row.rain_total),
                S::wind_max.eq(row.wind_max),
                S::computed_at.eq(row.computed_at),
            ))
            .execute(&mut self.conn)
            .map(|_| ())
            .map_err(|e| map_diesel("upsert daily summary", e))
    }

    fn get_daily_summary(&mut self, location_id: i64, day: NaiveDate) -> Result<Option<DailySummary>, StoreError> {
        use schema::daily_summaries::dsl as S;

        S::daily_summaries
            .filter(S::location_id.eq(location_id).and(S::day.eq(day)))
            .select(DailySummary::as_select())
            .first(&mut self.conn)
            .optional()
            .map_err(|e| map_diesel("get daily summary", e))
    }
}

#[cfg(test)]
pub mod memory {
    //! In-memory store double with the same unique-key semantics as the
    //! Postgres schema.

    use super::*;
    use std::collections::BTreeMap;

    #[derive(Default)]
    pub struct MemoryStore {
        locations: Vec<Location>,
        observations: BTreeMap<(i64, DateTime<Utc>, String), Observation>,
        summaries: BTreeMap<(i64, NaiveDate), DailySummary>,
        next_id: i64,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_location(&mut self, id: i64, lat: f64, lon: f64) -> Location {
            let loc = Location {
                id,
                owner_id: 1,
                name: format!("loc{}", id),
                latitude: lat,
                longitude: lon,
                timezone: Some("Etc/UTC".to_string()),
                is_active: true,
                is_default: false,
                created_at: Utc::now(),
            };
            self.locations.push(loc.clone());
            loc
        }

        pub fn deactivate_location(&mut self, id: i64) {
            for loc in &mut self.locations {
                if loc.id == id {
                    loc.is_active = false;
                }
            }
        }

        pub fn observation_count(&self) -> usize {
            self.observations.len()
        }

        pub fn observations_for(&self, location_id: i64) -> Vec<Observation> {
            self.observations
                .values()
                .filter(|o| o.location_id == location_id)
                .cloned()
                .collect()
        }

        fn alloc_id(&mut self) -> i64 {
            self.next_id += 1;
            self.next_id
        }
    }

    impl LocationDirectory for MemoryStore {
        fn list_active_locations(&mut self) -> Result<Vec<Location>, StoreError> {
            Ok(self.locations.iter().filter(|l| l.is_active).cloned().collect())
        }

        fn get_location(&mut self, id: i64) -> Result<Option<Location>, StoreError> {
            Ok(self.locations.iter().find(|l| l.id == id).cloned())
        }
    }

    impl ObservationStore for MemoryStore {
        fn insert_observations_skip_duplicates(&mut self, rows: &[NewObservation]) -> Result<usize, StoreError> {
            let mut inserted = 0;
            for row in rows {
                let key = (row.location_id, row.time, row.granularity.clone());
                if self.observations.contains_key(&key) {
                    continue;
                }
                let id = self.alloc_id();
                self.observations.insert(key, materialize(id, row));
                inserted += 1;
            }
            Ok(inserted)
        }

        fn upsert_observation(&mut self, row: &NewObservation) -> Result<Observation, StoreError> {
            let key = (row.location_id, row.time, row.granularity.clone());
            let id = match self.observations.get(&key) {
                Some(existing) => existing.id,
                None => self.alloc_id(),
            };
            let stored = materialize(id, row);
            self.observations.insert(key, stored.clone());
            Ok(stored)
        }

        fn hourly_observations_for_day(
            &mut self,
            location_id: i64,
            day: NaiveDate,
        ) -> Result<Vec<Observation>, StoreError> {
            let (start, end) = day_bounds_utc(day);
            Ok(self
                .observations
                .values()
                .filter(|o| {
                    o.location_id == location_id
                        && o.granularity == crate::db::models::Granularity::Hourly.as_str()
                        && o.time >= start
                        && o.time < end
                })
                .cloned()
                .collect())
        }
    }

    impl SummaryStore for MemoryStore {
        fn upsert_daily_summary(&mut self, row: &NewDailySummary) -> Result<(), StoreError> {
            self.summaries.insert(
                (row.location_id, row.day),
                DailySummary {
                    location_id: row.location_id,
                    day: row.day,
                    temp_min: row.temp_min,
                    temp_max: row.temp_max,
                    rain_total: row.rain_total,
                    wind_max: row.wind_max,
                    computed_at: row.computed_at,
                },
            );
            Ok(())
        }

        fn get_daily_summary(&mut self, location_id: i64, day: NaiveDate) -> Result<Option<DailySummary>, StoreError> {
            Ok(self.summaries.get(&(location_id, day)).cloned())
        }
    }

    fn materialize(id: i64, row: &NewObservation) -> Observation {
        Observation {
            id,
            time: row.time,
            location_id: row.location_id,
            granularity: row.granularity.clone(),
            source: row.source.clone(),
            temp_c: row.temp_c,
            humidity_pct: row.humidity_pct,
            rain_mm: row.rain_mm,
            wind_speed: row.wind_speed,
            weather_code: row.weather_code,
        }
    }
}
