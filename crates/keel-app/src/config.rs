//! Application configuration read from the environment.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `KEEL_STORE_DSN` (or `DATABASE_URL`) | required |
//! | `KEEL_STORE_MIGRATIONS_PATH` | required at start-up |
//! | `KEEL_STORE_MAX_CONNECTIONS` | 10 |
//! | `KEEL_PIPELINE_MAX_RETRIES` | 10, at least 2 |
//! | `KEEL_PIPELINE_COMMAND_TIMEOUT_MS` | none |

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use keel_core::pipeline::PipelineConfig;

use crate::error::AppError;

/// Default size of the connection pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Settings for the event store and the command pipeline.
#[derive(Clone)]
pub struct Config {
    /// `PostgreSQL` connection string.
    pub store_dsn: String,
    /// Directory holding the SQL migrations.
    pub migrations_path: Option<PathBuf>,
    /// Upper bound of pooled connections.
    pub max_connections: u32,
    /// Retry ceiling and deadline for commands.
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or a
    /// value does not parse.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or a
    /// value does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store_dsn = lookup("KEEL_STORE_DSN")
            .or_else(|| lookup("DATABASE_URL"))
            .filter(|dsn| !dsn.trim().is_empty())
            .ok_or_else(|| {
                AppError::Config("KEEL_STORE_DSN or DATABASE_URL must be set".to_owned())
            })?;

        let migrations_path = lookup("KEEL_STORE_MIGRATIONS_PATH")
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        let max_connections = parse(&lookup, "KEEL_STORE_MAX_CONNECTIONS")?
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);
        if max_connections == 0 {
            return Err(AppError::Config(
                "KEEL_STORE_MAX_CONNECTIONS must be positive".to_owned(),
            ));
        }

        let mut pipeline = PipelineConfig::default();
        if let Some(max_retries) = parse(&lookup, "KEEL_PIPELINE_MAX_RETRIES")? {
            pipeline = pipeline.with_max_retries(max_retries);
        }
        if let Some(millis) = parse::<u64, _>(&lookup, "KEEL_PIPELINE_COMMAND_TIMEOUT_MS")? {
            pipeline = pipeline.with_command_timeout(Duration::from_millis(millis));
        }
        pipeline
            .validate()
            .map_err(|e| AppError::Config(format!("KEEL_PIPELINE_MAX_RETRIES: {}", e.message())))?;

        Ok(Self {
            store_dsn,
            migrations_path,
            max_connections,
            pipeline,
        })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("store_dsn", &"<redacted>")
            .field("migrations_path", &self.migrations_path)
            .field("max_connections", &self.max_connections)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>, AppError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| AppError::Config(format!("{key} must be a valid number: {e}")))
        })
        .transpose()
}
