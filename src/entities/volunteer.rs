//! Volunteer entity - A person who can be scheduled onto shifts.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Volunteer database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "volunteers")]
pub struct Model {
    /// Unique identifier for the volunteer
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name
    pub name: String,
    /// `"M"` or `"F"`
    pub gender: String,
    /// Inactive volunteers are never auto-assigned
    pub is_active: bool,
}

/// Defines relationships between Volunteer and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One volunteer declares many availabilities
    #[sea_orm(has_many = "super::availability::Entity")]
    Availabilities,
    /// One volunteer appears in many assignments
    #[sea_orm(has_many = "super::assignment_volunteer::Entity")]
    AssignmentVolunteers,
}

impl Related<super::availability::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Availabilities.def()
    }
}

impl Related<super::assignment_volunteer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AssignmentVolunteers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
