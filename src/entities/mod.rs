//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod assignment;
pub mod assignment_volunteer;
pub mod availability;
pub mod station;
pub mod system_state;
pub mod time_slot;
pub mod volunteer;

// Re-export specific types to avoid conflicts
pub use assignment::{Column as AssignmentColumn, Entity as Assignment, Model as AssignmentModel};
pub use assignment_volunteer::{
    Column as AssignmentVolunteerColumn, Entity as AssignmentVolunteer,
    Model as AssignmentVolunteerModel,
};
pub use availability::{
    Column as AvailabilityColumn, Entity as Availability, Model as AvailabilityModel,
};
pub use station::{Column as StationColumn, Entity as Station, Model as StationModel};
pub use system_state::{
    Column as SystemStateColumn, Entity as SystemState, Model as SystemStateModel,
};
pub use time_slot::{Column as TimeSlotColumn, Entity as TimeSlot, Model as TimeSlotModel};
pub use volunteer::{Column as VolunteerColumn, Entity as Volunteer, Model as VolunteerModel};
