//! Keel — start-up wiring: configuration, telemetry, database pool,
//! migrations and the Customer command pipeline.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod state;
pub mod telemetry;
