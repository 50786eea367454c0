//! Keel Core — event-sourced aggregate runtime.
//!
//! This crate defines the event model, the decoder registry, the event store
//! contract, the aggregate runtime and the command pipeline that ties them
//! together. It contains no storage backend.

pub mod aggregate;
pub mod cache;
pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod pipeline;
pub mod registry;
pub mod store;
pub mod stream;
