//! Shared test utilities for the planner.
//!
//! This module provides an in-memory database setup, builders for roster entities with
//! sensible defaults, the "Plaza" fixture used across the store, session and flush tests,
//! and a [`FailingStore`] wrapper for exercising partial flush failures.
#![allow(clippy::unwrap_used, clippy::panic)]

use crate::{
    core::{
        dates,
        model::{Assignment, Availability, AvailabilityState, Gender, Period, SlotKey, Station},
        overrides::ManualOverrides,
        roster,
        store::{CreateOutcome, RemoveOutcome, SchedulingStore, SeaOrmStore},
    },
    entities,
    errors::{Error, Result},
};
use chrono::NaiveDate;
use sea_orm::DatabaseConnection;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all database tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Monday 2025-06-02, the day every Plaza scenario runs on.
pub fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
}

/// June 2025.
pub fn june_period() -> Period {
    Period {
        start: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        end: NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
    }
}

/// Creates an active station with capacity 3.
pub async fn create_test_station(
    db: &DatabaseConnection,
    name: &str,
    weekdays: &[u32],
) -> Result<entities::StationModel> {
    roster::create_station(db, name, "", weekdays, 3).await
}

/// Creates a time slot from `HH:MM` times.
pub async fn create_test_slot(
    db: &DatabaseConnection,
    station_id: i64,
    start: &str,
    end: &str,
    max_volunteers: Option<usize>,
) -> Result<entities::TimeSlotModel> {
    roster::create_time_slot(
        db,
        station_id,
        dates::parse_time(start)?,
        dates::parse_time(end)?,
        max_volunteers,
    )
    .await
}

/// Creates an active volunteer.
pub async fn create_test_volunteer(
    db: &DatabaseConnection,
    name: &str,
    gender: Gender,
) -> Result<entities::VolunteerModel> {
    roster::create_volunteer(db, name, gender, true).await
}

/// Declares the volunteer available for the slot on `date`.
pub async fn declare_available(
    db: &DatabaseConnection,
    volunteer_id: i64,
    date: NaiveDate,
    slot_id: i64,
) -> Result<entities::AvailabilityModel> {
    roster::declare_availability(db, volunteer_id, date, slot_id, AvailabilityState::Available)
        .await
}

/// The Plaza station (Mondays) with a single 09:00-11:00 slot of capacity 2.
pub struct PlazaFixture {
    pub station: entities::StationModel,
    pub slot: entities::TimeSlotModel,
}

impl PlazaFixture {
    pub const fn key(&self, date: NaiveDate) -> SlotKey {
        SlotKey::new(date, self.slot.id, self.station.id)
    }
}

/// Sets up a store over a fresh database holding the Plaza fixture.
pub async fn setup_plaza() -> Result<(SeaOrmStore, PlazaFixture)> {
    let db = setup_test_db().await?;
    let station = create_test_station(&db, "Plaza", &[1]).await?;
    let slot = create_test_slot(&db, station.id, "09:00", "11:00", Some(2)).await?;
    Ok((SeaOrmStore::new(db), PlazaFixture { station, slot }))
}

/// Store wrapper whose writes fail for a chosen set of volunteers until healed.
///
/// Creations can also be made to panic for some volunteers, and the assignment read can be
/// switched off. `calls` counts the create and remove calls that reached it.
pub struct FailingStore {
    inner: SeaOrmStore,
    failing: Mutex<BTreeSet<i64>>,
    panicking: Mutex<BTreeSet<i64>>,
    fail_reads: AtomicBool,
    calls: AtomicUsize,
}

impl FailingStore {
    pub fn new(inner: SeaOrmStore, failing: impl IntoIterator<Item = i64>) -> Self {
        Self {
            inner,
            failing: Mutex::new(failing.into_iter().collect()),
            panicking: Mutex::new(BTreeSet::new()),
            fail_reads: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Makes `create_assignment` panic for the volunteer.
    #[must_use]
    pub fn with_panic_on(self, volunteer_id: i64) -> Self {
        if let Ok(mut panicking) = self.panicking.lock() {
            panicking.insert(volunteer_id);
        }
        self
    }

    /// Makes `assignments` fail until healed.
    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.clear();
        }
        if let Ok(mut panicking) = self.panicking.lock() {
            panicking.clear();
        }
        self.fail_reads.store(false, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self, volunteer_id: i64) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing
            .lock()
            .map(|f| f.contains(&volunteer_id))
            .unwrap_or(true);
        if failing {
            return Err(Error::Config {
                message: format!("simulated outage for volunteer {volunteer_id}"),
            });
        }
        Ok(())
    }
}

impl SchedulingStore for FailingStore {
    async fn stations(&self, period: Period) -> Result<Vec<Station>> {
        self.inner.stations(period).await
    }

    async fn availabilities(&self, period: Period) -> Result<Vec<Availability>> {
        self.inner.availabilities(period).await
    }

    async fn assignments(&self, period: Period) -> Result<Vec<Assignment>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::Config {
                message: "simulated outage reading assignments".to_string(),
            });
        }
        self.inner.assignments(period).await
    }

    async fn last_assignment_dates(&self, before: NaiveDate) -> Result<HashMap<i64, NaiveDate>> {
        self.inner.last_assignment_dates(before).await
    }

    async fn create_assignment(&self, key: SlotKey, volunteer_id: i64) -> Result<CreateOutcome> {
        self.check(volunteer_id)?;
        // The guard is released before panicking so the mutex is not poisoned.
        let panics = self
            .panicking
            .lock()
            .map(|p| p.contains(&volunteer_id))
            .unwrap_or(false);
        if panics {
            panic!("store crashed creating assignment for volunteer {volunteer_id}");
        }
        self.inner.create_assignment(key, volunteer_id).await
    }

    async fn remove_volunteer(&self, assignment_id: i64, volunteer_id: i64) -> Result<RemoveOutcome> {
        self.check(volunteer_id)?;
        self.inner.remove_volunteer(assignment_id, volunteer_id).await
    }

    async fn reset_assignments(&self, period: Period, station_id: Option<i64>) -> Result<u64> {
        self.inner.reset_assignments(period, station_id).await
    }

    async fn load_overrides(&self, period: Period) -> Result<ManualOverrides> {
        self.inner.load_overrides(period).await
    }

    async fn save_overrides(&self, period: Period, overrides: ManualOverrides) -> Result<()> {
        self.inner.save_overrides(period, overrides).await
    }
}
