//! Shared test stores and utilities for the Keel aggregate runtime.

mod clock;
mod store;

pub use clock::FixedClock;
pub use store::{ConflictingEventStore, FailingEventStore, InMemoryEventStore, InMemorySession};
