//! Start-up: connection pool, migrations and the Customer pipeline.

use std::sync::Arc;

use keel_core::cache::AggregateCache;
use keel_core::clock::SystemClock;
use keel_core::pipeline::CommandPipeline;
use keel_customer::domain::events::event_registry;
use keel_event_store::PgEventStore;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::config::Config;
use crate::error::AppError;
use crate::state::AppState;

/// Connects to the store, applies pending migrations and assembles the
/// application state.
///
/// # Errors
///
/// Returns `AppError::Config` if no migrations path is configured,
/// `AppError::Database` if the pool cannot connect, and
/// `AppError::Migration` if the migrations cannot be applied.
pub async fn start(config: &Config) -> Result<AppState, AppError> {
    let migrations_path = config.migrations_path.clone().ok_or_else(|| {
        AppError::Config("KEEL_STORE_MIGRATIONS_PATH must be set".to_owned())
    })?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.store_dsn)
        .await?;

    let migrator = Migrator::new(migrations_path).await?;
    migrator.run(&pool).await?;
    info!(migrations = migrator.iter().count(), "event store schema is up to date");

    assemble(pool, config)
}

/// Builds the application state on an already migrated pool.
///
/// # Errors
///
/// Returns `AppError::Domain` if the event registry or the pipeline
/// configuration is invalid.
pub fn assemble(pool: PgPool, config: &Config) -> Result<AppState, AppError> {
    let store = Arc::new(PgEventStore::new(pool.clone(), event_registry()?));
    let customers = CommandPipeline::new(store, Arc::new(SystemClock), config.pipeline.clone())?
        .with_cache(Arc::new(AggregateCache::new()));
    Ok(AppState::new(pool, customers))
}
