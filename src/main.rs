#![allow(clippy::result_large_err)]

use chrono::Local;
use dotenvy::dotenv;
use planner_turni::{
    config::{database, settings},
    core::{roster, session::PlannerSession, store::SeaOrmStore},
    errors::Result,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file (non-fatal, env vars can be set externally)
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load the planner configuration
    let planner_config = settings::load_default_config()
        .inspect_err(|e| error!("Failed to load planner configuration: {}", e))?;
    let period = settings::period_from_env(Local::now().date_naive())?;
    info!("Planning period {}", period);

    // 4. Initialize database
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;

    // 5. Seed stations from config.toml on first run
    roster::seed_stations(&db, &planner_config.stations)
        .await
        .inspect_err(|e| error!("Failed to seed stations: {}", e))?;

    // 6. One unattended autofill + save pass
    let store = Arc::new(SeaOrmStore::new(db));
    let mut session = PlannerSession::open(store, period, planner_config.allocation).await?;

    let summary = session.autofill().await?;
    if !summary.missing_male.is_empty() {
        warn!(
            "{} slot-instance(s) have no male volunteer available",
            summary.missing_male.len()
        );
    }

    let report = session
        .save()
        .await
        .inspect_err(|e| error!("Save failed, run again to retry: {}", e))?;
    info!(
        "Done: {} added by allocation, {} created, {} already applied, {} skipped as manually emptied",
        summary.added_count(),
        report.created,
        report.already_applied,
        summary.skipped_manual
    );

    for (volunteer_id, load) in session.volunteer_loads() {
        info!("Volunteer {} has {} assignment(s) in {}", volunteer_id, load, period);
    }

    Ok(())
}
