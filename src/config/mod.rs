/// Database configuration and connection management
pub mod database;

/// Planner settings and station seeds loaded from config.toml
pub mod settings;
