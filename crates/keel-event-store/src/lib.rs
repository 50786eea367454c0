//! Keel Event Store — `PostgreSQL` adapter for the event store contract.

pub mod pg_event_store;
pub mod schema;

pub use pg_event_store::PgEventStore;
