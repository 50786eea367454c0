//! Shared helpers for Customer pipeline tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use keel_core::aggregate::Aggregate;
use keel_core::error::DomainError;
use keel_core::pipeline::{CommandPipeline, PipelineConfig};
use keel_core::store::EventStore;
use keel_core::stream::StreamId;
use keel_customer::domain::aggregates::Customer;
use keel_customer::domain::commands::Register;
use keel_customer::domain::events::{CustomerEvent, event_registry};
use keel_test_support::{FixedClock, InMemoryEventStore, InMemorySession};
use tokio::sync::Barrier;

pub type MemoryStore = InMemoryEventStore<CustomerEvent>;

/// An empty in-memory store that decodes Customer events.
pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(InMemoryEventStore::new(event_registry().unwrap()))
}

/// A pipeline over `store` with the fixed test clock.
pub fn pipeline_over<S>(store: Arc<S>, config: PipelineConfig) -> CommandPipeline<Customer, S>
where
    S: EventStore<CustomerEvent>,
{
    CommandPipeline::new(store, Arc::new(FixedClock::standard()), config).unwrap()
}

/// The registration used by most tests.
pub fn fiona() -> Register {
    Register::build("fiona@gallagher.net", "Fiona", "Gallagher").unwrap()
}

/// Commits the `CustomerRegistered` event for `command` directly through a
/// store session, bypassing the pipeline.
pub async fn seed_registration<S>(store: &S, command: &Register)
where
    S: EventStore<CustomerEvent>,
{
    let events = Customer::create(&command.clone().into(), &FixedClock::standard()).unwrap();
    let stream_id = Customer::stream_id(&command.customer_id);
    let mut session = store.begin().await.unwrap();
    store
        .append_events_to_stream(&mut session, &stream_id, &events)
        .await
        .unwrap();
    store.commit(session).await.unwrap();
}

/// Holds the first `parties` stream loads until all of them have arrived, so
/// that concurrent commands observe the same version.
pub struct BarrierStore {
    inner: Arc<MemoryStore>,
    barrier: Barrier,
    parties: usize,
    loads: AtomicUsize,
}

impl BarrierStore {
    pub fn new(inner: Arc<MemoryStore>, parties: usize) -> Self {
        Self {
            inner,
            barrier: Barrier::new(parties),
            parties,
            loads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EventStore<CustomerEvent> for BarrierStore {
    type Session = InMemorySession;

    async fn begin(&self) -> Result<Self::Session, DomainError> {
        self.inner.begin().await
    }

    async fn commit(&self, session: Self::Session) -> Result<(), DomainError> {
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
    ) -> Result<Vec<CustomerEvent>, DomainError> {
        let loaded = self
            .inner
            .load_event_stream(session, stream_id, from_version, max_events)
            .await;
        if self.loads.fetch_add(1, Ordering::SeqCst) < self.parties {
            self.barrier.wait().await;
        }
        loaded
    }

    async fn append_events_to_stream(
        &self,
        session: &mut Self::Session,
        stream_id: &StreamId,
        events: &[CustomerEvent],
    ) -> Result<(), DomainError> {
        self.inner
            .append_events_to_stream(session, stream_id, events)
            .await
    }

    async fn purge_event_stream(&self, stream_id: &StreamId) -> Result<(), DomainError> {
        self.inner.purge_event_stream(stream_id).await
    }
}

/// Never completes an append, leaving the attempt's session open until the
/// caller gives up on it.
pub struct StallingStore {
    inner: Arc<MemoryStore>,
}

impl StallingStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl EventStore<CustomerEvent> for StallingStore {
    type Session = InMemorySession;

    async fn begin(&self) -> Result<Self::Session, DomainError> {
        self.inner.begin().await
    }

    async fn commit(&self, session: Self::Session) -> Result<(), DomainError> {
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
    ) -> Result<Vec<CustomerEvent>, DomainError> {
        self.inner
            .load_event_stream(session, stream_id, from_version, max_events)
            .await
    }

    async fn append_events_to_stream(
        &self,
        _session: &mut Self::Session,
        _stream_id: &StreamId,
        _events: &[CustomerEvent],
    ) -> Result<(), DomainError> {
        std::future::pending().await
    }

    async fn purge_event_stream(&self, stream_id: &StreamId) -> Result<(), DomainError> {
        self.inner.purge_event_stream(stream_id).await
    }
}
