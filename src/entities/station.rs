//! Station entity - A physical duty location (postazione) with its own weekly schedule.
//!
//! Active weekdays are stored as a comma-separated list of ISO weekday numbers
//! (`1` = Monday .. `7` = Sunday), e.g. `"1,3,5"`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Station database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stations")]
pub struct Model {
    /// Unique identifier for the station
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Human-readable name (e.g., "Piazza Duomo")
    pub name: String,
    /// Street address shown on the roster
    pub address: String,
    /// Inactive stations are never scheduled
    pub is_active: bool,
    /// Comma-separated ISO weekday numbers the station operates on
    pub active_weekdays: String,
    /// Default capacity of each slot-instance at this station
    pub max_volunteers: i32,
}

/// Defines relationships between Station and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One station has many time slots
    #[sea_orm(has_many = "super::time_slot::Entity")]
    TimeSlots,
    /// One station has many assignments
    #[sea_orm(has_many = "super::assignment::Entity")]
    Assignments,
}

impl Related<super::time_slot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TimeSlots.def()
    }
}

impl Related<super::assignment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Assignments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
