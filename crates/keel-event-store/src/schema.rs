//! Event store database schema.

/// SQL to create the events table.
///
/// The primary key on `(stream_id, stream_version)` is the store's only
/// concurrency control: of two sessions appending the same version to a
/// stream, the second insert (or commit) fails with a unique violation.
/// Kept in sync with `migrations/20240101000000_create_event_store.sql`.
pub const CREATE_EVENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS event_store (
    stream_id      TEXT   NOT NULL CHECK (stream_id <> ''),
    stream_version BIGINT NOT NULL CHECK (stream_version >= 1),
    event_name     TEXT   NOT NULL,
    payload        TEXT   NOT NULL,
    occurred_at    TEXT   NOT NULL,
    CONSTRAINT event_store_stream_version_key PRIMARY KEY (stream_id, stream_version)
);
";
