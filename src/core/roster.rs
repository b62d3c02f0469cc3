//! Roster business logic - stations, time slots, volunteers and their availability declarations.
//!
//! These are the writers feeding the planner's inputs. Station seeding from `config.toml`
//! mirrors what the management screens would otherwise create by hand.

use crate::{
    config::settings::StationSeed,
    core::{
        dates,
        model::{AvailabilityState, Gender},
    },
    entities::{
        Availability, Station, TimeSlot, Volunteer, availability, station, time_slot, volunteer,
    },
    errors::{Error, Result},
};
use chrono::{NaiveDate, NaiveTime};
use sea_orm::{PaginatorTrait, Set, TransactionTrait, prelude::*};
use tracing::info;

fn to_db_capacity(value: usize) -> Result<i32> {
    match i32::try_from(value) {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(Error::Config {
            message: format!("Capacity must be between 1 and {}, got {value}", i32::MAX),
        }),
    }
}

/// Creates a station, validating its name, weekdays (1-7) and capacity.
pub async fn create_station<C>(
    db: &C,
    name: &str,
    address: &str,
    active_weekdays: &[u32],
    max_volunteers: usize,
) -> Result<station::Model>
where
    C: ConnectionTrait,
{
    if name.trim().is_empty() {
        return Err(Error::Config {
            message: "Station name cannot be empty".to_string(),
        });
    }
    if let Some(day) = active_weekdays.iter().find(|d| !(1..=7).contains(*d)) {
        return Err(Error::Config {
            message: format!("Invalid weekday {day} for station {name} (expected 1-7)"),
        });
    }

    let mut weekdays = active_weekdays.to_vec();
    weekdays.sort_unstable();
    weekdays.dedup();
    let weekdays = weekdays
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",");

    let model = station::ActiveModel {
        name: Set(name.trim().to_string()),
        address: Set(address.trim().to_string()),
        is_active: Set(true),
        active_weekdays: Set(weekdays),
        max_volunteers: Set(to_db_capacity(max_volunteers)?),
        ..Default::default()
    };
    Ok(model.insert(db).await?)
}

/// Adds a time slot to an existing station. The slot must end after it starts.
pub async fn create_time_slot<C>(
    db: &C,
    station_id: i64,
    start: NaiveTime,
    end: NaiveTime,
    max_volunteers: Option<usize>,
) -> Result<time_slot::Model>
where
    C: ConnectionTrait,
{
    Station::find_by_id(station_id)
        .one(db)
        .await?
        .ok_or(Error::StationNotFound { id: station_id })?;

    if start >= end {
        return Err(Error::Config {
            message: format!("Time slot must end after it starts ({start} - {end})"),
        });
    }

    let model = time_slot::ActiveModel {
        station_id: Set(station_id),
        start_time: Set(start),
        end_time: Set(end),
        max_volunteers: Set(max_volunteers.map(to_db_capacity).transpose()?),
        ..Default::default()
    };
    Ok(model.insert(db).await?)
}

pub async fn create_volunteer<C>(
    db: &C,
    name: &str,
    gender: Gender,
    is_active: bool,
) -> Result<volunteer::Model>
where
    C: ConnectionTrait,
{
    if name.trim().is_empty() {
        return Err(Error::Config {
            message: "Volunteer name cannot be empty".to_string(),
        });
    }

    let model = volunteer::ActiveModel {
        name: Set(name.trim().to_string()),
        gender: Set(gender.as_code().to_string()),
        is_active: Set(is_active),
        ..Default::default()
    };
    Ok(model.insert(db).await?)
}

/// Records a volunteer's availability for one slot on one date, replacing any earlier
/// declaration for the same (volunteer, date, slot).
pub async fn declare_availability<C>(
    db: &C,
    volunteer_id: i64,
    date: NaiveDate,
    slot_id: i64,
    state: AvailabilityState,
) -> Result<availability::Model>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;

    Volunteer::find_by_id(volunteer_id)
        .one(&txn)
        .await?
        .ok_or(Error::VolunteerNotFound { id: volunteer_id })?;

    let existing = Availability::find()
        .filter(availability::Column::VolunteerId.eq(volunteer_id))
        .filter(availability::Column::Date.eq(date))
        .filter(availability::Column::SlotId.eq(slot_id))
        .one(&txn)
        .await?;

    let saved = if let Some(existing) = existing {
        let mut model: availability::ActiveModel = existing.into();
        model.state = Set(state.as_str().to_string());
        model.update(&txn).await?
    } else {
        let model = availability::ActiveModel {
            volunteer_id: Set(volunteer_id),
            date: Set(date),
            slot_id: Set(slot_id),
            state: Set(state.as_str().to_string()),
            ..Default::default()
        };
        model.insert(&txn).await?
    };

    txn.commit().await?;
    Ok(saved)
}

/// Creates the configured stations and their slots, unless stations already exist.
/// Returns the number of stations created.
pub async fn seed_stations(db: &DatabaseConnection, seeds: &[StationSeed]) -> Result<usize> {
    if seeds.is_empty() {
        return Ok(0);
    }
    let existing = Station::find().count(db).await?;
    if existing > 0 {
        info!("{} station(s) already present, skipping seed.", existing);
        return Ok(0);
    }

    let txn = db.begin().await?;
    for seed in seeds {
        let created = create_station(
            &txn,
            &seed.name,
            &seed.address,
            &seed.active_weekdays,
            seed.max_volunteers,
        )
        .await?;
        for slot in &seed.slots {
            create_time_slot(
                &txn,
                created.id,
                dates::parse_time(&slot.start)?,
                dates::parse_time(&slot.end)?,
                slot.max_volunteers,
            )
            .await?;
        }
        info!("Seeded station {} with {} slot(s).", created.name, seed.slots.len());
    }
    txn.commit().await?;

    Ok(seeds.len())
}
