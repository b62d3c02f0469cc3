//! Assignment entity - One persisted slot-instance row (date, slot, station).
//!
//! The volunteers serving it live in `assignment_volunteers`; a row is deleted once
//! its last volunteer is detached.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Assignment database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "assignments")]
pub struct Model {
    /// Unique identifier for the assignment
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Calendar date of the shift
    pub date: Date,
    /// Time slot served
    pub slot_id: i64,
    /// Station the slot belongs to
    pub station_id: i64,
    /// When the row was first created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Assignment and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each assignment belongs to one station
    #[sea_orm(
        belongs_to = "super::station::Entity",
        from = "Column::StationId",
        to = "super::station::Column::Id"
    )]
    Station,
    /// One assignment has many assigned volunteers
    #[sea_orm(has_many = "super::assignment_volunteer::Entity")]
    AssignmentVolunteers,
}

impl Related<super::station::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Station.def()
    }
}

impl Related<super::assignment_volunteer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AssignmentVolunteers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
