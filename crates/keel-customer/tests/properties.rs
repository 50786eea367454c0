//! Pipeline guarantees exercised through the Customer aggregate: dense and
//! monotonic versions, codec fidelity, no-op commits, atomicity, caching and
//! cancellation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use keel_core::aggregate::{Aggregate, fold};
use keel_core::cache::AggregateCache;
use keel_core::error::ErrorKind;
use keel_core::event::DomainEvent;
use keel_core::pipeline::PipelineConfig;
use keel_core::store::{ALL_EVENTS, EventStore};
use keel_customer::application::command_handlers::{
    handle_change_email_address, handle_confirm_email_address, handle_register, load_customer,
};
use keel_customer::domain::aggregates::Customer;
use keel_customer::domain::commands::{ChangeEmailAddress, ConfirmEmailAddress, CustomerCommand};
use keel_customer::domain::events::{CustomerEvent, event_registry};
use keel_test_support::{ConflictingEventStore, FailingEventStore, FixedClock};
use tokio::task::JoinSet;

use common::{MemoryStore, StallingStore, fiona, memory_store, pipeline_over, seed_registration};

#[tokio::test]
async fn test_concurrent_writers_produce_dense_ordered_versions() {
    // Arrange
    let store = memory_store();
    let pipeline = Arc::new(pipeline_over(
        Arc::clone(&store),
        PipelineConfig::default().with_max_retries(10),
    ));
    let register = fiona();
    handle_register(&register, pipeline.as_ref()).await.unwrap();
    let id = register.customer_id.as_str().to_owned();

    // Act
    let mut writers = JoinSet::new();
    for n in 0..8 {
        let pipeline = Arc::clone(&pipeline);
        let change = ChangeEmailAddress::build(&id, &format!("writer{n}@x.com")).unwrap();
        writers.spawn(async move { handle_change_email_address(&change, pipeline.as_ref()).await });
    }
    while let Some(joined) = writers.join_next().await {
        joined.unwrap().unwrap();
    }

    // Assert
    let stream_id = Customer::stream_id(&register.customer_id);
    let versions: Vec<u64> = store
        .read_event_stream(&stream_id, 1, ALL_EVENTS)
        .await
        .unwrap()
        .iter()
        .map(DomainEvent::stream_version)
        .collect();
    assert_eq!(versions, (1..=9).collect::<Vec<_>>());

    let committed: Vec<u64> = store
        .commit_log()
        .into_iter()
        .filter(|(stream, _)| *stream == stream_id)
        .map(|(_, version)| version)
        .collect();
    assert_eq!(committed, versions);
}

#[tokio::test]
async fn test_events_read_back_equal_events_committed() {
    // Arrange
    let store = memory_store();
    let pipeline = pipeline_over(Arc::clone(&store), PipelineConfig::default());
    let register = fiona();
    let id = register.customer_id.as_str().to_owned();
    let mut committed = Vec::new();

    // Act
    committed.extend(handle_register(&register, &pipeline).await.unwrap().events);
    let wrong = ConfirmEmailAddress::build(&id, "invalid_hash").unwrap();
    assert!(handle_confirm_email_address(&wrong, &pipeline).await.is_err());
    let confirm = ConfirmEmailAddress::build(&id, register.confirmation_hash.as_str()).unwrap();
    committed.extend(handle_confirm_email_address(&confirm, &pipeline).await.unwrap().events);
    let change = ChangeEmailAddress::build(&id, "new@x.com").unwrap();
    committed.extend(handle_change_email_address(&change, &pipeline).await.unwrap().events);

    // Assert
    let stream_id = Customer::stream_id(&register.customer_id);
    let read = store.read_event_stream(&stream_id, 1, ALL_EVENTS).await.unwrap();
    assert_eq!(read.len(), 4);
    assert_eq!(read[0], committed[0]);
    assert!(matches!(read[1], CustomerEvent::EmailAddressConfirmationFailed(_)));
    assert_eq!(read[2], committed[1]);
    assert_eq!(read[3], committed[2]);
}

#[test]
fn test_handlers_are_pure_over_folded_state() {
    // Arrange
    let register = fiona();
    let clock = FixedClock::standard();
    let history = Customer::create(&register.clone().into(), &clock).unwrap();
    let (customer, version) = fold::<Customer>(&history).unwrap();
    let snapshot = customer.clone();
    let command: CustomerCommand =
        ConfirmEmailAddress::build(register.customer_id.as_str(), "invalid_hash")
            .unwrap()
            .into();

    // Act
    let first = customer.handle(version, &command, &clock).unwrap();
    let second = customer.handle(version, &command, &clock).unwrap();

    // Assert
    assert_eq!(first.events(), second.events());
    assert_eq!(customer, snapshot);
}

#[tokio::test]
async fn test_no_op_commits_an_empty_transaction() {
    // Arrange
    let store = memory_store();
    let pipeline = pipeline_over(Arc::clone(&store), PipelineConfig::default());
    let register = fiona();
    handle_register(&register, &pipeline).await.unwrap();
    let same = ChangeEmailAddress::build(register.customer_id.as_str(), "fiona@gallagher.net").unwrap();
    let commits_before = store.commits();

    // Act
    let result = handle_change_email_address(&same, &pipeline).await.unwrap();

    // Assert
    assert!(result.events.is_empty());
    assert_eq!(store.commits(), commits_before + 1);
    assert_eq!(store.stream_version(&Customer::stream_id(&register.customer_id)), 1);
}

#[tokio::test]
async fn test_single_conflict_is_retried_to_success() {
    // Arrange
    let register = fiona();
    let inner = MemoryStore::new(event_registry().unwrap());
    seed_registration(&inner, &register).await;
    let store = Arc::new(ConflictingEventStore::new(inner, 1));
    let pipeline = pipeline_over(Arc::clone(&store), PipelineConfig::default());
    let change = ChangeEmailAddress::build(register.customer_id.as_str(), "new@x.com").unwrap();

    // Act
    let result = handle_change_email_address(&change, &pipeline).await.unwrap();

    // Assert
    assert_eq!(store.injected(), 1);
    assert_eq!(result.events[0].stream_version(), 2);
    let stream_id = Customer::stream_id(&register.customer_id);
    assert_eq!(store.inner().stream_version(&stream_id), 2);
}

#[tokio::test]
async fn test_failed_commit_leaves_stream_as_before() {
    // Arrange
    let register = fiona();
    let inner = MemoryStore::new(event_registry().unwrap());
    seed_registration(&inner, &register).await;
    let stream_id = Customer::stream_id(&register.customer_id);
    let before = inner.read_event_stream(&stream_id, 1, ALL_EVENTS).await.unwrap();
    let config = PipelineConfig::default().with_max_retries(2);
    let store = Arc::new(ConflictingEventStore::new(inner, 2));
    let pipeline = pipeline_over(Arc::clone(&store), config);
    let change = ChangeEmailAddress::build(register.customer_id.as_str(), "new@x.com").unwrap();

    // Act
    let err = handle_change_email_address(&change, &pipeline).await.unwrap_err();

    // Assert
    assert_eq!(err.kind(), ErrorKind::MaxRetriesExceeded);
    let after: Vec<CustomerEvent> = store.read_event_stream(&stream_id, 1, ALL_EVENTS).await.unwrap();
    assert_eq!(after, before);
}

#[tokio::test]
async fn test_cached_pipeline_matches_uncached_and_sees_foreign_writes() {
    // Arrange
    let store = memory_store();
    let cache = Arc::new(AggregateCache::<Customer>::new());
    let cached = pipeline_over(Arc::clone(&store), PipelineConfig::default())
        .with_cache(Arc::clone(&cache));
    let plain = pipeline_over(Arc::clone(&store), PipelineConfig::default());
    let register = fiona();
    let id = register.customer_id.as_str().to_owned();
    handle_register(&register, &cached).await.unwrap();

    // Act
    let change = ChangeEmailAddress::build(&id, "new@x.com").unwrap();
    handle_change_email_address(&change, &plain).await.unwrap();
    let confirm = ConfirmEmailAddress::build(&id, change.confirmation_hash.as_str()).unwrap();
    let confirmed = handle_confirm_email_address(&confirm, &cached).await.unwrap();

    // Assert
    assert_eq!(confirmed.events[0].stream_version(), 3);
    let stream_id = Customer::stream_id(&register.customer_id);
    let (cached_state, cached_version) = cache.get(&stream_id).unwrap();
    let (loaded_state, loaded_version) = load_customer(store.as_ref(), &register.customer_id)
        .await
        .unwrap();
    assert_eq!(cached_version, loaded_version);
    assert_eq!(cached_state, loaded_state);
    assert!(loaded_state.is_email_address_confirmed);
}

#[tokio::test]
async fn test_conflict_invalidates_cache_entry() {
    // Arrange
    let register = fiona();
    let inner = MemoryStore::new(event_registry().unwrap());
    seed_registration(&inner, &register).await;
    let store = Arc::new(ConflictingEventStore::new(inner, 2));
    let cache = Arc::new(AggregateCache::<Customer>::new());
    let pipeline = pipeline_over(Arc::clone(&store), PipelineConfig::default().with_max_retries(2))
        .with_cache(Arc::clone(&cache));
    let stream_id = Customer::stream_id(&register.customer_id);
    let (state, version) = load_customer(store.as_ref(), &register.customer_id).await.unwrap();
    cache.put(&stream_id, &state, version);
    let change = ChangeEmailAddress::build(register.customer_id.as_str(), "new@x.com").unwrap();

    // Act
    let err = handle_change_email_address(&change, &pipeline).await.unwrap_err();

    // Assert
    assert_eq!(err.kind(), ErrorKind::MaxRetriesExceeded);
    assert!(cache.get(&stream_id).is_none());
}

#[tokio::test]
async fn test_cached_pipeline_reports_purged_stream_as_not_found() {
    // Arrange
    let store = memory_store();
    let cache = Arc::new(AggregateCache::<Customer>::new());
    let cached = pipeline_over(Arc::clone(&store), PipelineConfig::default())
        .with_cache(Arc::clone(&cache));
    let register = fiona();
    let id = register.customer_id.as_str().to_owned();
    let stream_id = Customer::stream_id(&register.customer_id);
    handle_register(&register, &cached).await.unwrap();
    handle_change_email_address(&ChangeEmailAddress::build(&id, "new@x.com").unwrap(), &cached)
        .await
        .unwrap();
    assert_eq!(cache.get(&stream_id).map(|(_, version)| version), Some(2));
    store.purge_event_stream(&stream_id).await.unwrap();
    let again = ChangeEmailAddress::build(&id, "again@x.com").unwrap();

    // Act
    let err = handle_change_email_address(&again, &cached).await.unwrap_err();

    // Assert
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(store.stream_version(&stream_id), 0);
    assert!(store.read_event_stream(&stream_id, 1, ALL_EVENTS).await.unwrap().is_empty());
    assert!(cache.get(&stream_id).is_none());
}

#[tokio::test]
async fn test_cached_pipeline_refolds_a_recreated_stream() {
    // Arrange
    let store = memory_store();
    let cache = Arc::new(AggregateCache::<Customer>::new());
    let cached = pipeline_over(Arc::clone(&store), PipelineConfig::default())
        .with_cache(Arc::clone(&cache));
    let register = fiona();
    let id = register.customer_id.as_str().to_owned();
    let stream_id = Customer::stream_id(&register.customer_id);
    handle_register(&register, &cached).await.unwrap();
    handle_change_email_address(&ChangeEmailAddress::build(&id, "new@x.com").unwrap(), &cached)
        .await
        .unwrap();
    store.purge_event_stream(&stream_id).await.unwrap();
    seed_registration(store.as_ref(), &register).await;
    let change = ChangeEmailAddress::build(&id, "third@x.com").unwrap();

    // Act
    let changed = handle_change_email_address(&change, &cached).await.unwrap();

    // Assert
    assert_eq!(changed.events[0].stream_version(), 2);
    let versions: Vec<u64> = store
        .read_event_stream(&stream_id, 1, ALL_EVENTS)
        .await
        .unwrap()
        .iter()
        .map(DomainEvent::stream_version)
        .collect();
    assert_eq!(versions, vec![1, 2]);
    let (customer, version) = load_customer(store.as_ref(), &register.customer_id).await.unwrap();
    assert_eq!(version, 2);
    assert_eq!(customer.email_address.as_str(), "third@x.com");
    assert_eq!(cache.get(&stream_id), Some((customer, 2)));
}

#[tokio::test]
async fn test_cancellation_rolls_back_open_attempt() {
    // Arrange
    let store = memory_store();
    let register = fiona();
    seed_registration(store.as_ref(), &register).await;
    let pipeline = pipeline_over(
        Arc::new(StallingStore::new(Arc::clone(&store))),
        PipelineConfig::default(),
    );
    let change: CustomerCommand =
        ChangeEmailAddress::build(register.customer_id.as_str(), "new@x.com")
            .unwrap()
            .into();

    // Act
    let err = pipeline
        .execute_until(&change, tokio::time::sleep(Duration::from_millis(20)))
        .await
        .unwrap_err();

    // Assert
    assert_eq!(err.kind(), ErrorKind::Technical);
    assert_eq!(store.stream_version(&Customer::stream_id(&register.customer_id)), 1);
}

#[tokio::test]
async fn test_completed_command_ignores_ready_cancellation() {
    // Arrange
    let store = memory_store();
    let pipeline = pipeline_over(Arc::clone(&store), PipelineConfig::default());
    let register: CustomerCommand = fiona().into();

    // Act
    let events = pipeline
        .execute_until(&register, std::future::ready(()))
        .await
        .unwrap();

    // Assert
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn test_command_timeout_is_technical() {
    // Arrange
    let store = memory_store();
    let register = fiona();
    seed_registration(store.as_ref(), &register).await;
    let pipeline = pipeline_over(
        Arc::new(StallingStore::new(Arc::clone(&store))),
        PipelineConfig::default().with_command_timeout(Duration::from_millis(20)),
    );
    let change = ChangeEmailAddress::build(register.customer_id.as_str(), "new@x.com").unwrap();

    // Act
    let err = handle_change_email_address(&change, &pipeline).await.unwrap_err();

    // Assert
    assert_eq!(err.kind(), ErrorKind::Technical);
    assert_eq!(store.stream_version(&Customer::stream_id(&register.customer_id)), 1);
}

#[tokio::test]
async fn test_zero_value_command_is_invalid() {
    let store = memory_store();
    let pipeline = pipeline_over(Arc::clone(&store), PipelineConfig::default());

    let err = handle_confirm_email_address(&ConfirmEmailAddress::default(), &pipeline)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CommandInvalid);
    assert_eq!(store.commits(), 0);
}

#[tokio::test]
async fn test_unavailable_store_surfaces_technical() {
    let pipeline = pipeline_over(Arc::new(FailingEventStore), PipelineConfig::default());

    let err = handle_register(&fiona(), &pipeline).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Technical);
}

#[tokio::test]
async fn test_pipeline_rejects_retry_ceiling_below_two() {
    let result = keel_core::pipeline::CommandPipeline::<Customer, MemoryStore>::new(
        memory_store(),
        Arc::new(FixedClock::standard()),
        PipelineConfig::default().with_max_retries(1),
    );

    assert!(matches!(result, Err(ref e) if e.kind() == ErrorKind::InputInvalid));
}
