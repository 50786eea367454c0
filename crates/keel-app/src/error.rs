//! Keel — start-up error types.

use keel_core::error::DomainError;
use thiserror::Error;

/// Errors raised while starting the application.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required setting is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migrations could not be loaded or applied.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The command pipeline could not be assembled.
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
}
