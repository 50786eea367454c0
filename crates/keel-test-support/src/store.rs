//! Test stores — `EventStore` implementations for tests.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use keel_core::error::DomainError;
use keel_core::event::DomainEvent;
use keel_core::registry::EventRegistry;
use keel_core::store::EventStore;
use keel_core::stream::StreamId;

/// An encoded event row, as a relational store would hold it.
#[derive(Debug, Clone)]
struct Row {
    event_name: String,
    payload: Vec<u8>,
}

type Streams = HashMap<StreamId, BTreeMap<u64, Row>>;

/// An open session of an [`InMemoryEventStore`]: writes buffered until
/// commit.
#[derive(Debug, Default)]
pub struct InMemorySession {
    pending: Vec<(StreamId, u64, Row)>,
}

/// An in-memory event store with the same transactional semantics as the
/// `PostgreSQL` store.
///
/// Events are encoded on append and decoded through the registry on load.
/// Writes are buffered per session and become visible on commit. A version
/// collision is reported as `ConcurrencyConflict` both at append time
/// (against committed rows and the session's own writes) and at commit time
/// (against rows committed since the append).
pub struct InMemoryEventStore<E> {
    registry: Arc<EventRegistry<E>>,
    streams: Mutex<Streams>,
    commit_log: Mutex<Vec<(StreamId, u64)>>,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

impl<E: DomainEvent> InMemoryEventStore<E> {
    /// Creates an empty store decoding through `registry`.
    #[must_use]
    pub fn new(registry: Arc<EventRegistry<E>>) -> Self {
        Self {
            registry,
            streams: Mutex::new(HashMap::new()),
            commit_log: Mutex::new(Vec::new()),
            commits: AtomicUsize::new(0),
            rollbacks: AtomicUsize::new(0),
        }
    }

    /// Every committed `(stream, version)` in commit order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn commit_log(&self) -> Vec<(StreamId, u64)> {
        self.commit_log.lock().unwrap().clone()
    }

    /// Highest committed version of `stream_id`, 0 if the stream is empty.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn stream_version(&self, stream_id: &StreamId) -> u64 {
        self.streams
            .lock()
            .unwrap()
            .get(stream_id)
            .and_then(|rows| rows.keys().next_back().copied())
            .unwrap_or(0)
    }

    /// Commits a raw row under `event_name` without encoding or decoding it,
    /// as if another writer had stored it.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn insert_row(&self, stream_id: &StreamId, version: u64, event_name: &str, payload: &[u8]) {
        let row = Row {
            event_name: event_name.to_owned(),
            payload: payload.to_vec(),
        };
        self.streams
            .lock()
            .unwrap()
            .entry(stream_id.clone())
            .or_default()
            .insert(version, row);
        self.commit_log.lock().unwrap().push((stream_id.clone(), version));
    }

    /// Number of successful commits, including empty ones.
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Number of rollbacks, explicit or caused by a failed commit.
    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    fn collision(stream_id: &StreamId, version: u64) -> DomainError {
        DomainError::concurrency_conflict(format!(
            "{stream_id} already holds stream version {version}"
        ))
    }
}

#[async_trait]
impl<E: DomainEvent> EventStore<E> for InMemoryEventStore<E> {
    type Session = InMemorySession;

    async fn begin(&self) -> Result<Self::Session, DomainError> {
        Ok(InMemorySession::default())
    }

    async fn commit(&self, session: Self::Session) -> Result<(), DomainError> {
        let mut streams = self.streams.lock().unwrap();
        for (stream_id, version, _) in &session.pending {
            if streams
                .get(stream_id)
                .is_some_and(|rows| rows.contains_key(version))
            {
                self.rollbacks.fetch_add(1, Ordering::SeqCst);
                return Err(Self::collision(stream_id, *version));
            }
        }

        let mut log = self.commit_log.lock().unwrap();
        for (stream_id, version, row) in session.pending {
            log.push((stream_id.clone(), version));
            streams.entry(stream_id).or_default().insert(version, row);
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self, _session: Self::Session) -> Result<(), DomainError> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_event_stream(
        &self,
        session: &mut Self::Session,
        stream_id: &StreamId,
        from_version: u64,
        max_events: u64,
    ) -> Result<Vec<E>, DomainError> {
        let mut rows: BTreeMap<u64, Row> = self
            .streams
            .lock()
            .unwrap()
            .get(stream_id)
            .cloned()
            .unwrap_or_default();
        for (pending_stream, version, row) in &session.pending {
            if pending_stream == stream_id {
                rows.insert(*version, row.clone());
            }
        }

        let limit = usize::try_from(max_events).unwrap_or(usize::MAX);
        rows.range(from_version..)
            .take(limit)
            .map(|(version, row)| self.registry.decode(&row.event_name, &row.payload, *version))
            .collect()
    }

    async fn stream_exists(
        &self,
        session: &mut Self::Session,
        stream_id: &StreamId,
    ) -> Result<bool, DomainError> {
        let committed = self
            .streams
            .lock()
            .unwrap()
            .get(stream_id)
            .is_some_and(|rows| !rows.is_empty());
        Ok(committed || session.pending.iter().any(|(s, _, _)| s == stream_id))
    }

    async fn append_events_to_stream(
        &self,
        session: &mut Self::Session,
        stream_id: &StreamId,
        events: &[E],
    ) -> Result<(), DomainError> {
        let mut staged = Vec::with_capacity(events.len());
        {
            let streams = self.streams.lock().unwrap();
            let committed = streams.get(stream_id);
            for event in events {
                let version = event.stream_version();
                let taken = committed.is_some_and(|rows| rows.contains_key(&version))
                    || session
                        .pending
                        .iter()
                        .chain(staged.iter())
                        .any(|(s, v, _)| s == stream_id && *v == version);
                if taken {
                    return Err(Self::collision(stream_id, version));
                }
                let row = Row {
                    event_name: event.event_name().to_owned(),
                    payload: event.encode()?,
                };
                staged.push((stream_id.clone(), version, row));
            }
        }
        session.pending.extend(staged);
        Ok(())
    }

    async fn purge_event_stream(&self, stream_id: &StreamId) -> Result<(), DomainError> {
        self.streams.lock().unwrap().remove(stream_id);
        Ok(())
    }
}

/// An event store that fails every operation with a technical error.
/// Useful for testing error-handling paths.
#[derive(Debug, Default)]
pub struct FailingEventStore;

#[async_trait]
impl<E: DomainEvent> EventStore<E> for FailingEventStore {
    type Session = ();

    async fn begin(&self) -> Result<Self::Session, DomainError> {
        Err(DomainError::technical("connection refused"))
    }

    async fn commit(&self, _session: Self::Session) -> Result<(), DomainError> {
        Err(DomainError::technical("connection refused"))
    }

    async fn rollback(&self, _session: Self::Session) -> Result<(), DomainError> {
        Err(DomainError::technical("connection refused"))
    }

    async fn load_event_stream(
        &self,
        _session: &mut Self::Session,
        _stream_id: &StreamId,
        _from_version: u64,
        _max_events: u64,
    ) -> Result<Vec<E>, DomainError> {
        Err(DomainError::technical("connection refused"))
    }

    async fn append_events_to_stream(
        &self,
        _session: &mut Self::Session,
        _stream_id: &StreamId,
        _events: &[E],
    ) -> Result<(), DomainError> {
        Err(DomainError::technical("connection refused"))
    }

    async fn purge_event_stream(&self, _stream_id: &StreamId) -> Result<(), DomainError> {
        Err(DomainError::technical("connection refused"))
    }
}

/// Wraps a store and fails the next `n` commits with `ConcurrencyConflict`,
/// rolling the wrapped session back as a real store would.
#[derive(Debug)]
pub struct ConflictingEventStore<S> {
    inner: S,
    remaining: AtomicU32,
    injected: AtomicU32,
}

impl<S> ConflictingEventStore<S> {
    /// Wraps `inner`, failing its next `conflicts` commits.
    pub fn new(inner: S, conflicts: u32) -> Self {
        Self {
            inner,
            remaining: AtomicU32::new(conflicts),
            injected: AtomicU32::new(0),
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of conflicts injected so far.
    pub fn injected(&self) -> u32 {
        self.injected.load(Ordering::SeqCst)
    }

    fn take_conflict(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl<E, S> EventStore<E> for ConflictingEventStore<S>
where
    E: DomainEvent,
    S: EventStore<E>,
{
    type Session = S::Session;

    async fn begin(&self) -> Result<Self::Session, DomainError> {
        self.inner.begin().await
    }

    async fn commit(&self, session: Self::Session) -> Result<(), DomainError> {
        if self.take_conflict() {
            self.injected.fetch_add(1, Ordering::SeqCst);
            self.inner.rollback(session).await?;
            return Err(DomainError::concurrency_conflict("injected commit conflict"));
        }
        self.inner.commit(session).await
    }

    async fn rollback(&self, session: Self::Session) -> Result<(), DomainError> {
        self.inner.rollback(session).await
    }

    async fn load_event_stream(
        &self,
        session: &mut Self::Session,
        stream_id: &StreamId,
        from_version: u64,
        max_events: u64,
    ) -> Result<Vec<E>, DomainError> {
        self.inner
            .load_event_stream(session, stream_id, from_version, max_events)
            .await
    }

    async fn stream_exists(
        &self,
        session: &mut Self::Session,
        stream_id: &StreamId,
    ) -> Result<bool, DomainError> {
        self.inner.stream_exists(session, stream_id).await
    }

    async fn append_events_to_stream(
        &self,
        session: &mut Self::Session,
        stream_id: &StreamId,
        events: &[E],
    ) -> Result<(), DomainError> {
        self.inner
            .append_events_to_stream(session, stream_id, events)
            .await
    }

    async fn purge_event_stream(&self, stream_id: &StreamId) -> Result<(), DomainError> {
        self.inner.purge_event_stream(stream_id).await
    }
}
