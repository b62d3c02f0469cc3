//! Scheduling store - the backing service the planner reads snapshots from and flushes into.
//!
//! [`SchedulingStore`] is the seam between the in-memory engine and persistence. The
//! reconciliation driver spawns store calls onto tokio tasks, so implementations are
//! `Send + Sync + 'static` and return `Send` futures. [`SeaOrmStore`] is the `SQLite`
//! implementation used by the binary and the tests.

use crate::{
    core::{
        model::{
            Assignment, Availability, AvailabilityState, Gender, Period, SlotKey, Station, TimeSlot,
            VolunteerRef,
        },
        overrides::{self, ManualOverrides},
    },
    entities::{
        Assignment as AssignmentEntity, AssignmentVolunteer, Availability as AvailabilityEntity,
        Station as StationEntity, TimeSlot as TimeSlotEntity, Volunteer, assignment,
        assignment_volunteer, availability, station, time_slot, volunteer,
    },
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use std::collections::{BTreeSet, HashMap};

/// Result of asking the store to attach a volunteer to a slot-instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created { assignment_id: i64 },
    /// The tuple already existed; nothing was written.
    AlreadyPresent { assignment_id: i64 },
}

/// Result of asking the store to detach a volunteer from an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Detached; `assignment_deleted` is true when the row had no volunteers left.
    Removed { assignment_deleted: bool },
    /// The volunteer was not attached (already removed elsewhere).
    AlreadyAbsent,
}

pub trait SchedulingStore: Send + Sync + 'static {
    /// Stations with their time slots. Stations are ordered by id, slots by start time.
    fn stations(&self, period: Period) -> impl Future<Output = Result<Vec<Station>>> + Send;

    /// Availability declarations dated inside the period, with volunteer attributes.
    fn availabilities(&self, period: Period)
    -> impl Future<Output = Result<Vec<Availability>>> + Send;

    /// Persisted assignments dated inside the period.
    fn assignments(&self, period: Period) -> impl Future<Output = Result<Vec<Assignment>>> + Send;

    /// Latest assignment date of every volunteer strictly before `before`.
    fn last_assignment_dates(
        &self,
        before: NaiveDate,
    ) -> impl Future<Output = Result<HashMap<i64, NaiveDate>>> + Send;

    /// Attaches a volunteer to a slot-instance. Idempotent.
    fn create_assignment(
        &self,
        key: SlotKey,
        volunteer_id: i64,
    ) -> impl Future<Output = Result<CreateOutcome>> + Send;

    /// Detaches a volunteer, deleting the assignment once it is empty. Idempotent.
    fn remove_volunteer(
        &self,
        assignment_id: i64,
        volunteer_id: i64,
    ) -> impl Future<Output = Result<RemoveOutcome>> + Send;

    /// Deletes every assignment in the period, optionally only for one station.
    /// Returns the number of assignments deleted.
    fn reset_assignments(
        &self,
        period: Period,
        station_id: Option<i64>,
    ) -> impl Future<Output = Result<u64>> + Send;

    fn load_overrides(&self, period: Period)
    -> impl Future<Output = Result<ManualOverrides>> + Send;

    fn save_overrides(
        &self,
        period: Period,
        overrides: ManualOverrides,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// [`SchedulingStore`] over a `SeaORM` connection.
#[derive(Debug, Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

fn parse_weekdays(raw: &str) -> Result<BTreeSet<u32>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match s.parse::<u32>() {
            Ok(day) if (1..=7).contains(&day) => Ok(day),
            _ => Err(Error::Config {
                message: format!("Invalid weekday '{s}' in '{raw}'"),
            }),
        })
        .collect()
}

fn positive_capacity(value: Option<i32>) -> Option<usize> {
    value
        .and_then(|v| usize::try_from(v).ok())
        .filter(|v| *v > 0)
}

fn volunteer_ref(model: &volunteer::Model) -> Result<VolunteerRef> {
    Ok(VolunteerRef {
        id: model.id,
        name: model.name.clone(),
        gender: model.gender.parse::<Gender>()?,
    })
}

async fn assignments_with_volunteers<C>(
    db: &C,
    rows: Vec<(assignment::Model, Vec<assignment_volunteer::Model>)>,
) -> Result<Vec<Assignment>>
where
    C: ConnectionTrait,
{
    let volunteer_ids: BTreeSet<i64> = rows
        .iter()
        .flat_map(|(_, links)| links.iter().map(|l| l.volunteer_id))
        .collect();

    let volunteers: HashMap<i64, VolunteerRef> = Volunteer::find()
        .filter(volunteer::Column::Id.is_in(volunteer_ids))
        .all(db)
        .await?
        .iter()
        .map(|v| volunteer_ref(v).map(|r| (v.id, r)))
        .collect::<Result<_>>()?;

    Ok(rows
        .into_iter()
        .map(|(row, links)| Assignment {
            id: row.id,
            date: row.date,
            slot_id: row.slot_id,
            station_id: row.station_id,
            volunteers: links
                .iter()
                .filter_map(|l| volunteers.get(&l.volunteer_id).cloned())
                .collect(),
        })
        .collect())
}

impl SchedulingStore for SeaOrmStore {
    async fn stations(&self, _period: Period) -> Result<Vec<Station>> {
        let stations = StationEntity::find()
            .order_by_asc(station::Column::Id)
            .all(&self.db)
            .await?;
        let slots = TimeSlotEntity::find()
            .order_by_asc(time_slot::Column::StartTime)
            .order_by_asc(time_slot::Column::Id)
            .all(&self.db)
            .await?;

        let mut slots_by_station: HashMap<i64, Vec<TimeSlot>> = HashMap::new();
        for slot in slots {
            slots_by_station
                .entry(slot.station_id)
                .or_default()
                .push(TimeSlot {
                    id: slot.id,
                    station_id: slot.station_id,
                    start: slot.start_time,
                    end: slot.end_time,
                    max_volunteers: positive_capacity(slot.max_volunteers),
                });
        }

        stations
            .into_iter()
            .map(|s| {
                Ok(Station {
                    id: s.id,
                    active_weekdays: parse_weekdays(&s.active_weekdays)?,
                    max_volunteers: positive_capacity(Some(s.max_volunteers)),
                    slots: slots_by_station.remove(&s.id).unwrap_or_default(),
                    name: s.name,
                    address: s.address,
                    is_active: s.is_active,
                })
            })
            .collect()
    }

    async fn availabilities(&self, period: Period) -> Result<Vec<Availability>> {
        let rows = AvailabilityEntity::find()
            .filter(availability::Column::Date.between(period.start, period.end))
            .order_by_asc(availability::Column::Date)
            .order_by_asc(availability::Column::Id)
            .find_also_related(Volunteer)
            .all(&self.db)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for (record, volunteer) in rows {
            let Some(volunteer) = volunteer else {
                tracing::warn!(
                    "Availability {} references missing volunteer {}",
                    record.id,
                    record.volunteer_id
                );
                continue;
            };
            out.push(Availability {
                volunteer_id: volunteer.id,
                volunteer_name: volunteer.name.clone(),
                date: record.date,
                slot_id: record.slot_id,
                state: record.state.parse::<AvailabilityState>()?,
                gender: volunteer.gender.parse::<Gender>()?,
                volunteer_active: volunteer.is_active,
            });
        }
        Ok(out)
    }

    async fn assignments(&self, period: Period) -> Result<Vec<Assignment>> {
        let rows = AssignmentEntity::find()
            .filter(assignment::Column::Date.between(period.start, period.end))
            .order_by_asc(assignment::Column::Date)
            .order_by_asc(assignment::Column::Id)
            .find_with_related(AssignmentVolunteer)
            .all(&self.db)
            .await?;

        assignments_with_volunteers(&self.db, rows).await
    }

    async fn last_assignment_dates(&self, before: NaiveDate) -> Result<HashMap<i64, NaiveDate>> {
        let rows = AssignmentEntity::find()
            .filter(assignment::Column::Date.lt(before))
            .find_with_related(AssignmentVolunteer)
            .all(&self.db)
            .await?;

        let mut latest: HashMap<i64, NaiveDate> = HashMap::new();
        for (row, links) in rows {
            for link in links {
                latest
                    .entry(link.volunteer_id)
                    .and_modify(|d| *d = (*d).max(row.date))
                    .or_insert(row.date);
            }
        }
        Ok(latest)
    }

    async fn create_assignment(&self, key: SlotKey, volunteer_id: i64) -> Result<CreateOutcome> {
        let txn = self.db.begin().await?;

        Volunteer::find_by_id(volunteer_id)
            .one(&txn)
            .await?
            .ok_or(Error::VolunteerNotFound { id: volunteer_id })?;

        let existing = AssignmentEntity::find()
            .filter(assignment::Column::Date.eq(key.date))
            .filter(assignment::Column::SlotId.eq(key.slot_id))
            .filter(assignment::Column::StationId.eq(key.station_id))
            .order_by_asc(assignment::Column::Id)
            .all(&txn)
            .await?;
        let existing_ids: Vec<i64> = existing.iter().map(|a| a.id).collect();

        if !existing_ids.is_empty() {
            let link = AssignmentVolunteer::find()
                .filter(assignment_volunteer::Column::AssignmentId.is_in(existing_ids.clone()))
                .filter(assignment_volunteer::Column::VolunteerId.eq(volunteer_id))
                .one(&txn)
                .await?;
            if let Some(link) = link {
                txn.commit().await?;
                return Ok(CreateOutcome::AlreadyPresent {
                    assignment_id: link.assignment_id,
                });
            }
        }

        let assignment_id = if let Some(id) = existing_ids.first() {
            *id
        } else {
            let row = assignment::ActiveModel {
                date: Set(key.date),
                slot_id: Set(key.slot_id),
                station_id: Set(key.station_id),
                created_at: Set(Utc::now()),
                ..Default::default()
            };
            row.insert(&txn).await?.id
        };

        let link = assignment_volunteer::ActiveModel {
            assignment_id: Set(assignment_id),
            volunteer_id: Set(volunteer_id),
            ..Default::default()
        };
        link.insert(&txn).await?;

        txn.commit().await?;
        Ok(CreateOutcome::Created { assignment_id })
    }

    async fn remove_volunteer(&self, assignment_id: i64, volunteer_id: i64) -> Result<RemoveOutcome> {
        let txn = self.db.begin().await?;

        let deleted = AssignmentVolunteer::delete_many()
            .filter(assignment_volunteer::Column::AssignmentId.eq(assignment_id))
            .filter(assignment_volunteer::Column::VolunteerId.eq(volunteer_id))
            .exec(&txn)
            .await?;
        if deleted.rows_affected == 0 {
            txn.commit().await?;
            return Ok(RemoveOutcome::AlreadyAbsent);
        }

        let remaining = AssignmentVolunteer::find()
            .filter(assignment_volunteer::Column::AssignmentId.eq(assignment_id))
            .count(&txn)
            .await?;
        let assignment_deleted = remaining == 0;
        if assignment_deleted {
            AssignmentEntity::delete_by_id(assignment_id)
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(RemoveOutcome::Removed { assignment_deleted })
    }

    async fn reset_assignments(&self, period: Period, station_id: Option<i64>) -> Result<u64> {
        let txn = self.db.begin().await?;

        let mut query = AssignmentEntity::find()
            .filter(assignment::Column::Date.between(period.start, period.end));
        if let Some(station_id) = station_id {
            query = query.filter(assignment::Column::StationId.eq(station_id));
        }
        let ids: Vec<i64> = query.all(&txn).await?.iter().map(|a| a.id).collect();

        if ids.is_empty() {
            txn.commit().await?;
            return Ok(0);
        }

        AssignmentVolunteer::delete_many()
            .filter(assignment_volunteer::Column::AssignmentId.is_in(ids.clone()))
            .exec(&txn)
            .await?;
        let deleted = AssignmentEntity::delete_many()
            .filter(assignment::Column::Id.is_in(ids))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(deleted.rows_affected)
    }

    async fn load_overrides(&self, period: Period) -> Result<ManualOverrides> {
        overrides::load_overrides(&self.db, &period).await
    }

    async fn save_overrides(&self, period: Period, overrides: ManualOverrides) -> Result<()> {
        overrides::save_overrides(&self.db, &period, &overrides).await
    }
}
