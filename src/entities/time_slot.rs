//! Time slot entity - A recurring time window within a station's schedule.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Time slot database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "time_slots")]
pub struct Model {
    /// Unique identifier for the slot
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Station this slot belongs to
    pub station_id: i64,
    /// Start of the shift
    pub start_time: Time,
    /// End of the shift
    pub end_time: Time,
    /// Slot-level capacity; overrides the station's when set
    pub max_volunteers: Option<i32>,
}

/// Defines relationships between `TimeSlot` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each slot belongs to one station
    #[sea_orm(
        belongs_to = "super::station::Entity",
        from = "Column::StationId",
        to = "super::station::Column::Id"
    )]
    Station,
    /// One slot has many availability declarations
    #[sea_orm(has_many = "super::availability::Entity")]
    Availabilities,
}

impl Related<super::station::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Station.def()
    }
}

impl Related<super::availability::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Availabilities.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
