/// Allocation engine and policy
pub mod allocation;

/// Availability index over a period snapshot
pub mod availability;

/// Date and time normalization
pub mod dates;

/// Fairness ranking by last assignment date
pub mod fairness;

/// Persisted assignments plus pending overlays
pub mod ledger;

/// Domain types shared by the engine, store and session
pub mod model;

/// Manual-override registry and its persistence
pub mod overrides;

/// Flushing pending changes to the store
pub mod reconcile;

/// Station, slot, volunteer and availability writers
pub mod roster;

/// Operator session over one scheduling period
pub mod session;

/// Store trait and the `SeaORM` implementation
pub mod store;
