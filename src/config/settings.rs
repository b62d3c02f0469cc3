//! Planner settings loaded from config.toml
//!
//! The file carries the allocation policy and, optionally, the stations to seed on first run:
//!
//! ```toml
//! [allocation]
//! default_capacity = 3
//! require_male = true
//! fill_without_male = true
//!
//! [[stations]]
//! name = "Plaza"
//! address = "Piazza Grande"
//! active_weekdays = [1, 3]
//!
//! [[stations.slots]]
//! start = "09:00"
//! end = "11:00"
//! max_volunteers = 2
//! ```

use crate::core::{
    allocation::AllocationPolicy,
    dates,
    model::{DEFAULT_CAPACITY, Period},
};
use crate::errors::{Error, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Default, Deserialize)]
pub struct PlannerConfig {
    /// Allocation business rules
    #[serde(default)]
    pub allocation: AllocationPolicy,
    /// Stations to create when the database has none
    #[serde(default)]
    pub stations: Vec<StationSeed>,
}

/// A station to seed, with its slots
#[derive(Debug, Deserialize, Clone)]
pub struct StationSeed {
    pub name: String,
    #[serde(default)]
    pub address: String,
    /// ISO weekday numbers, 1 = Monday .. 7 = Sunday
    pub active_weekdays: Vec<u32>,
    #[serde(default = "default_capacity")]
    pub max_volunteers: usize,
    #[serde(default)]
    pub slots: Vec<SlotSeed>,
}

/// A time slot to seed; times are `HH:MM`
#[derive(Debug, Deserialize, Clone)]
pub struct SlotSeed {
    pub start: String,
    pub end: String,
    pub max_volunteers: Option<usize>,
}

const fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

/// Loads planner configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - Required fields are missing
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PlannerConfig> {
    let path = path.as_ref();
    debug!("Attempting to load configuration from: {:?}", path);

    let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path.display()),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse {}: {e}", path.display()),
    })
}

/// Loads configuration from `PLANNER_CONFIG` (default `./config.toml`).
/// A missing file yields the default policy and no seeds.
pub fn load_default_config() -> Result<PlannerConfig> {
    let path = std::env::var("PLANNER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    if !Path::new(&path).exists() {
        warn!("No configuration file at {}, using defaults.", path);
        return Ok(PlannerConfig::default());
    }
    load_config(path)
}

/// Resolves the scheduling period from optional start/end dates.
///
/// Without a start the month containing `today` is used; without an end the period runs to
/// the end of the start's month. An end without a start is rejected.
pub fn resolve_period(start: Option<&str>, end: Option<&str>, today: NaiveDate) -> Result<Period> {
    match (start, end) {
        (None, None) => Period::month_of(today),
        (None, Some(end)) => Err(Error::Config {
            message: format!("PLANNER_PERIOD_END ({end}) requires PLANNER_PERIOD_START"),
        }),
        (Some(start), None) => {
            let start = dates::normalize_date(start)?;
            Period::new(start, Period::month_of(start)?.end)
        }
        (Some(start), Some(end)) => {
            Period::new(dates::normalize_date(start)?, dates::normalize_date(end)?)
        }
    }
}

/// Reads the period from `PLANNER_PERIOD_START` / `PLANNER_PERIOD_END`.
pub fn period_from_env(today: NaiveDate) -> Result<Period> {
    let start = std::env::var("PLANNER_PERIOD_START").ok();
    let end = std::env::var("PLANNER_PERIOD_END").ok();
    resolve_period(start.as_deref(), end.as_deref(), today)
}
