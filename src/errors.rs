//! Unified error type for the planner.
//!
//! Validation rejections are raised before any store call and leave state untouched.
//! Flush failures are aggregated so the operator can retry without losing pending work.

use crate::core::model::SlotKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    // ---------------------------
    // Input normalization
    // ---------------------------
    #[error("Invalid date: {value}")]
    InvalidDate { value: String },

    #[error("Invalid time: {value}")]
    InvalidTime { value: String },

    #[error("Invalid gender: {value} (expected M or F)")]
    InvalidGender { value: String },

    #[error("Invalid period: {start} is after {end}")]
    InvalidPeriod {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    // ---------------------------
    // Validation rejections
    // ---------------------------
    #[error("Volunteer {volunteer_id} is not available for {key}")]
    NotAvailable { volunteer_id: i64, key: SlotKey },

    #[error("Volunteer {volunteer_id} is already assigned to {key}")]
    AlreadyAssigned { volunteer_id: i64, key: SlotKey },

    #[error("{key} is already full ({capacity} volunteers)")]
    SlotFull { key: SlotKey, capacity: usize },

    #[error("Volunteer {volunteer_id} is not assigned to {target}")]
    NotAssigned { volunteer_id: i64, target: String },

    #[error("Unknown slot-instance: {key}")]
    UnknownSlot { key: SlotKey },

    #[error("Station not found: {id}")]
    StationNotFound { id: i64 },

    #[error("Volunteer not found: {id}")]
    VolunteerNotFound { id: i64 },

    // ---------------------------
    // Persistence
    // ---------------------------
    #[error("{failed} of {attempted} changes could not be saved: {summary}")]
    FlushFailed {
        failed: usize,
        attempted: usize,
        summary: String,
    },
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
