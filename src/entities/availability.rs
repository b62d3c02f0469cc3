//! Availability entity - A volunteer's declared (un)willingness to serve one slot on one date.
//!
//! Declarations are unique per (`volunteer_id`, `date`, `slot_id`); the roster layer upserts.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Availability database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "availabilities")]
pub struct Model {
    /// Unique identifier for the declaration
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Volunteer who declared it
    pub volunteer_id: i64,
    /// Calendar date of the slot-instance
    pub date: Date,
    /// Time slot the declaration refers to
    pub slot_id: i64,
    /// `"available"` or `"unavailable"`
    pub state: String,
}

/// Defines relationships between Availability and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each declaration belongs to one volunteer
    #[sea_orm(
        belongs_to = "super::volunteer::Entity",
        from = "Column::VolunteerId",
        to = "super::volunteer::Column::Id"
    )]
    Volunteer,
    /// Each declaration targets one time slot
    #[sea_orm(
        belongs_to = "super::time_slot::Entity",
        from = "Column::SlotId",
        to = "super::time_slot::Column::Id"
    )]
    TimeSlot,
}

impl Related<super::volunteer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Volunteer.def()
    }
}

impl Related<super::time_slot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TimeSlot.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
