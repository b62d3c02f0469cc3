//! Domain types shared by the allocation engine, the ledger and the store.
//!
//! These are plain values detached from the database rows in [`crate::entities`]; the store
//! converts between the two so the engine never touches `SeaORM` directly.

use crate::core::dates;
use crate::errors::{Error, Result};
use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Capacity used when neither the slot nor the station sets one.
pub const DEFAULT_CAPACITY: usize = 3;

/// Volunteer gender as recorded on the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "M", alias = "m")]
    Male,
    #[serde(rename = "F", alias = "f")]
    Female,
}

impl Gender {
    #[must_use]
    pub const fn as_code(self) -> &'static str {
        match self {
            Self::Male => "M",
            Self::Female => "F",
        }
    }
}

impl FromStr for Gender {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "M" | "m" => Ok(Self::Male),
            "F" | "f" => Ok(Self::Female),
            other => Err(Error::InvalidGender {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

/// Identity of one schedulable unit: a (date, slot, station) triple.
///
/// Every overlay, the override registry and capacity checks are keyed by this struct, so
/// the date must already be normalized when a key is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotKey {
    pub date: NaiveDate,
    pub slot_id: i64,
    pub station_id: i64,
}

impl SlotKey {
    #[must_use]
    pub const fn new(date: NaiveDate, slot_id: i64, station_id: i64) -> Self {
        Self {
            date,
            slot_id,
            station_id,
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} slot {} @ station {}",
            dates::format_date(self.date),
            self.slot_id,
            self.station_id
        )
    }
}

/// A recurring time window of a station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSlot {
    pub id: i64,
    pub station_id: i64,
    pub start: NaiveTime,
    pub end: NaiveTime,
    /// Slot-level cap; overrides the station's when present.
    pub max_volunteers: Option<usize>,
}

/// A duty location with its weekly schedule and ordered slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Station {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub is_active: bool,
    /// ISO weekday numbers, 1 = Monday .. 7 = Sunday.
    pub active_weekdays: BTreeSet<u32>,
    pub max_volunteers: Option<usize>,
    /// Ordered by start time.
    pub slots: Vec<TimeSlot>,
}

impl Station {
    /// Whether the station operates on `date`: it must be active and the date's weekday
    /// must be one of its active weekdays.
    #[must_use]
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.is_active
            && self
                .active_weekdays
                .contains(&date.weekday().number_from_monday())
    }

    /// Capacity of one slot-instance of `slot`: slot cap, else station cap, else the default.
    #[must_use]
    pub fn capacity_of(&self, slot: &TimeSlot, default_capacity: usize) -> usize {
        slot.max_volunteers
            .or(self.max_volunteers)
            .unwrap_or(default_capacity)
    }

    #[must_use]
    pub fn slot(&self, slot_id: i64) -> Option<&TimeSlot> {
        self.slots.iter().find(|s| s.id == slot_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvailabilityState {
    Available,
    Unavailable,
}

impl AvailabilityState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Unavailable => "unavailable",
        }
    }
}

impl FromStr for AvailabilityState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "available" => Ok(Self::Available),
            "unavailable" => Ok(Self::Unavailable),
            other => Err(Error::Config {
                message: format!("Unknown availability state: {other}"),
            }),
        }
    }
}

/// A volunteer's declaration for one (date, slot), with the volunteer attributes the
/// engine needs denormalized onto it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub volunteer_id: i64,
    pub volunteer_name: String,
    #[serde(deserialize_with = "dates::deserialize_date")]
    pub date: NaiveDate,
    pub slot_id: i64,
    pub state: AvailabilityState,
    pub gender: Gender,
    pub volunteer_active: bool,
}

impl Availability {
    /// Available and belonging to an active volunteer.
    #[must_use]
    pub fn is_assignable(&self) -> bool {
        self.state == AvailabilityState::Available && self.volunteer_active
    }

    #[must_use]
    pub fn volunteer(&self) -> VolunteerRef {
        VolunteerRef {
            id: self.volunteer_id,
            name: self.volunteer_name.clone(),
            gender: self.gender,
        }
    }
}

/// The volunteer attributes carried through overlays and rankings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VolunteerRef {
    pub id: i64,
    pub name: String,
    pub gender: Gender,
}

/// A persisted assignment row and the volunteers attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub id: i64,
    pub date: NaiveDate,
    pub slot_id: i64,
    pub station_id: i64,
    pub volunteers: Vec<VolunteerRef>,
}

impl Assignment {
    #[must_use]
    pub const fn key(&self) -> SlotKey {
        SlotKey::new(self.date, self.slot_id, self.station_id)
    }

    #[must_use]
    pub fn has_volunteer(&self, volunteer_id: i64) -> bool {
        self.volunteers.iter().any(|v| v.id == volunteer_id)
    }
}

/// An inclusive range of calendar dates being scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidPeriod { start, end });
        }
        Ok(Self { start, end })
    }

    /// The calendar month containing `date`.
    pub fn month_of(date: NaiveDate) -> Result<Self> {
        let (start, end) = dates::month_bounds(date.year(), date.month())?;
        Self::new(start, end)
    }

    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Every date of the period, in order.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}",
            dates::format_date(self.start),
            dates::format_date(self.end)
        )
    }
}

/// Display state of a slot-instance.
///
/// `ManuallyEmpty` is sticky: only an explicit operator addition leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Partial { filled: usize, capacity: usize },
    Full { has_male: bool },
    ManuallyEmpty,
}
