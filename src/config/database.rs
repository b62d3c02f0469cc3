//! Database configuration module.
//!
//! This module handles the `SQLite` connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the schema always matches the Rust structs without hand-written SQL.

use crate::entities::{
    Assignment, AssignmentVolunteer, Availability, Station, SystemState, TimeSlot, Volunteer,
};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/planner_turni.sqlite?mode=rwc";

/// Gets the database URL from the `DATABASE_URL` environment variable or returns the default
/// local `SQLite` path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by [`get_database_url`].
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url();
    tracing::debug!("Connecting to {}", database_url);
    Database::connect(&database_url).await.map_err(Into::into)
}

async fn create_table<E>(db: &DatabaseConnection, schema: &Schema, entity: E) -> Result<()>
where
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}

/// Creates every planner table that does not exist yet.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let schema = Schema::new(db.get_database_backend());

    create_table(db, &schema, Station).await?;
    create_table(db, &schema, TimeSlot).await?;
    create_table(db, &schema, Volunteer).await?;
    create_table(db, &schema, Availability).await?;
    create_table(db, &schema, Assignment).await?;
    create_table(db, &schema, AssignmentVolunteer).await?;
    create_table(db, &schema, SystemState).await?;

    Ok(())
}
