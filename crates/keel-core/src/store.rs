//! Event store abstraction.

use async_trait::async_trait;

use crate::error::{DomainError, ErrorKind};
use crate::event::DomainEvent;
use crate::stream::StreamId;

/// Passed as `max_events` to load a stream without limit.
pub const ALL_EVENTS: u64 = u64::MAX;

/// Append-only per-stream event log with transactional append.
///
/// All writes happen inside a session opened with [`begin`](Self::begin) and
/// closed with [`commit`](Self::commit) or [`rollback`](Self::rollback). The
/// store never commits or rolls back on its own. Dropping an open session
/// without committing discards its writes.
#[async_trait]
pub trait EventStore<E: DomainEvent>: Send + Sync {
    /// An open transaction.
    type Session: Send;

    /// Opens a new session.
    async fn begin(&self) -> Result<Self::Session, DomainError>;

    /// Makes the session's writes durable and visible.
    ///
    /// Returns `ConcurrencyConflict` if a competing session committed the same
    /// stream version first.
    async fn commit(&self, session: Self::Session) -> Result<(), DomainError>;

    /// Discards the session's writes.
    async fn rollback(&self, session: Self::Session) -> Result<(), DomainError>;

    /// Loads the events of `stream_id` with version `>= from_version`, in
    /// ascending version order, at most `max_events` of them. Writes already
    /// made in `session` are visible.
    ///
    /// An empty or unknown stream yields an empty vector.
    async fn load_event_stream(
        &self,
        session: &mut Self::Session,
        stream_id: &StreamId,
        from_version: u64,
        max_events: u64,
    ) -> Result<Vec<E>, DomainError>;

    /// Reports whether `stream_id` holds any event, visible in `session`.
    ///
    /// Stored events are not decoded, so a stream whose rows cannot be read
    /// back still exists.
    async fn stream_exists(
        &self,
        session: &mut Self::Session,
        stream_id: &StreamId,
    ) -> Result<bool, DomainError> {
        match self.load_event_stream(session, stream_id, 1, 1).await {
            Ok(events) => Ok(!events.is_empty()),
            Err(err) if err.kind() == ErrorKind::UnmarshalingFailed => Ok(true),
            Err(err) => Err(err),
        }
    }

    /// Appends `events` to `stream_id` within `session`. Each event must
    /// already carry its stream version.
    ///
    /// Returns `ConcurrencyConflict` if any `(stream_id, stream_version)`
    /// already exists, `MarshalingFailed` if an event cannot be encoded, and
    /// `Technical` for any other failure.
    async fn append_events_to_stream(
        &self,
        session: &mut Self::Session,
        stream_id: &StreamId,
        events: &[E],
    ) -> Result<(), DomainError>;

    /// Irreversibly deletes every event of `stream_id`.
    async fn purge_event_stream(&self, stream_id: &StreamId) -> Result<(), DomainError>;

    /// Loads committed events outside of any caller transaction.
    async fn read_event_stream(
        &self,
        stream_id: &StreamId,
        from_version: u64,
        max_events: u64,
    ) -> Result<Vec<E>, DomainError> {
        let mut session = self.begin().await?;
        let loaded = self
            .load_event_stream(&mut session, stream_id, from_version, max_events)
            .await;
        self.rollback(session).await?;
        loaded
    }
}
