//! `PostgreSQL` implementation of the `EventStore` trait.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::{debug, warn};

use keel_core::error::{DomainError, ErrorKind};
use keel_core::event::{DomainEvent, format_timestamp};
use keel_core::registry::EventRegistry;
use keel_core::store::EventStore;
use keel_core::stream::StreamId;

use crate::schema::CREATE_EVENTS_TABLE;

/// SQLSTATE raised when a serializable transaction loses a race.
const SERIALIZATION_FAILURE: &str = "40001";

/// PostgreSQL-backed event store.
///
/// Rows are decoded through the registry supplied at construction; a row
/// whose event name is not registered fails the whole load.
pub struct PgEventStore<E> {
    pool: PgPool,
    registry: Arc<EventRegistry<E>>,
}

impl<E: DomainEvent> PgEventStore<E> {
    /// Creates a new `PgEventStore`.
    #[must_use]
    pub fn new(pool: PgPool, registry: Arc<EventRegistry<E>>) -> Self {
        Self { pool, registry }
    }

    /// The connection pool shared by all sessions.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the events table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `Technical` if the DDL fails.
    pub async fn create_schema(&self) -> Result<(), DomainError> {
        sqlx::raw_sql(CREATE_EVENTS_TABLE)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| {
                DomainError::wrap(ErrorKind::Technical, "failed to create event store schema", e)
            })
    }
}

impl<E> std::fmt::Debug for PgEventStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgEventStore")
            .field("pool", &self.pool)
            .field("registry", &self.registry)
            .finish()
    }
}

impl<E> Clone for PgEventStore<E> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            registry: Arc::clone(&self.registry),
        }
    }
}

#[async_trait]
impl<E: DomainEvent> EventStore<E> for PgEventStore<E> {
    type Session = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Session, DomainError> {
        self.pool
            .begin()
            .await
            .map_err(|e| DomainError::wrap(ErrorKind::Technical, "failed to begin transaction", e))
    }

    async fn commit(&self, session: Self::Session) -> Result<(), DomainError> {
        session
            .commit()
            .await
            .map_err(|e| classify("commit", None, e))
    }

    async fn rollback(&self, session: Self::Session) -> Result<(), DomainError> {
        session
            .rollback()
            .await
            .map_err(|e| {
                DomainError::wrap(ErrorKind::Technical, "failed to roll back transaction", e)
            })
    }

    #[tracing::instrument(skip_all, fields(stream_id = %stream_id, from_version = from_version))]
    async fn load_event_stream(
        &self,
        session: &mut Self::Session,
        stream_id: &StreamId,
        from_version: u64,
        max_events: u64,
    ) -> Result<Vec<E>, DomainError> {
        let rows = sqlx::query(
            r"
            SELECT stream_version, event_name, payload
            FROM event_store
            WHERE stream_id = $1 AND stream_version >= $2
            ORDER BY stream_version ASC
            LIMIT $3
            ",
        )
        .bind(stream_id.as_str())
        .bind(to_bigint(from_version))
        .bind(to_bigint(max_events))
        .fetch_all(&mut **session)
        .await
        .map_err(|e| classify("load", Some(stream_id), e))?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let version: i64 = row.try_get("stream_version").map_err(unreadable_row)?;
            let event_name: String = row.try_get("event_name").map_err(unreadable_row)?;
            let payload: String = row.try_get("payload").map_err(unreadable_row)?;
            let version = u64::try_from(version).map_err(|e| {
                DomainError::wrap(
                    ErrorKind::UnmarshalingFailed,
                    format!("negative stream version {version} in {stream_id}"),
                    e,
                )
            })?;
            events.push(self.registry.decode(&event_name, payload.as_bytes(), version)?);
        }

        debug!(loaded = events.len(), "loaded event stream");
        Ok(events)
    }

    #[tracing::instrument(skip_all, fields(stream_id = %stream_id))]
    async fn stream_exists(
        &self,
        session: &mut Self::Session,
        stream_id: &StreamId,
    ) -> Result<bool, DomainError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM event_store WHERE stream_id = $1)",
        )
        .bind(stream_id.as_str())
        .fetch_one(&mut **session)
        .await
        .map_err(|e| classify("exists", Some(stream_id), e))
    }

    #[tracing::instrument(skip_all, fields(stream_id = %stream_id, events = events.len()))]
    async fn append_events_to_stream(
        &self,
        session: &mut Self::Session,
        stream_id: &StreamId,
        events: &[E],
    ) -> Result<(), DomainError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut rows = Vec::with_capacity(events.len());
        for event in events {
            let payload = String::from_utf8(event.encode()?).map_err(|e| {
                DomainError::wrap(
                    ErrorKind::MarshalingFailed,
                    format!("{} payload is not UTF-8", event.event_name()),
                    e,
                )
            })?;
            let version = i64::try_from(event.stream_version()).map_err(|e| {
                DomainError::wrap(
                    ErrorKind::MarshalingFailed,
                    format!("stream version {} out of range", event.stream_version()),
                    e,
                )
            })?;
            rows.push((
                version,
                event.event_name().to_owned(),
                payload,
                format_timestamp(&event.occurred_at()),
            ));
        }

        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO event_store (stream_id, stream_version, event_name, payload, occurred_at) ",
        );
        qb.push_values(rows, |mut b, (version, event_name, payload, occurred_at)| {
            b.push_bind(stream_id.as_str());
            b.push_bind(version);
            b.push_bind(event_name);
            b.push_bind(payload);
            b.push_bind(occurred_at);
        });

        qb.build()
            .execute(&mut **session)
            .await
            .map_err(|e| classify("append", Some(stream_id), e))?;

        debug!("appended events");
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(stream_id = %stream_id))]
    async fn purge_event_stream(&self, stream_id: &StreamId) -> Result<(), DomainError> {
        let result = sqlx::query("DELETE FROM event_store WHERE stream_id = $1")
            .bind(stream_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| classify("purge", Some(stream_id), e))?;

        warn!(deleted = result.rows_affected(), "purged event stream");
        Ok(())
    }
}

fn to_bigint(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn unreadable_row(error: sqlx::Error) -> DomainError {
    DomainError::wrap(ErrorKind::UnmarshalingFailed, "unreadable event row", error)
}

/// Maps a driver error to the error taxonomy: unique violations and
/// serialization failures are version conflicts, everything else is
/// technical.
fn classify(operation: &str, stream_id: Option<&StreamId>, error: sqlx::Error) -> DomainError {
    let conflict = matches!(
        &error,
        sqlx::Error::Database(db)
            if db.is_unique_violation() || db.code().as_deref() == Some(SERIALIZATION_FAILURE)
    );
    let target = stream_id.map_or_else(String::new, |id| format!(" on {id}"));

    if conflict {
        warn!(operation, error = %error, "version conflict");
        DomainError::wrap(
            ErrorKind::ConcurrencyConflict,
            format!("{operation}{target} collided with a committed stream version"),
            error,
        )
    } else {
        DomainError::wrap(
            ErrorKind::Technical,
            format!("{operation}{target} failed"),
            error,
        )
    }
}
