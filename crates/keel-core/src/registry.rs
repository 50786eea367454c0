//! Event-name keyed registry of decoders.
//!
//! One registry exists per event catalog and is filled once at start-up; the
//! event store consults it to turn persisted rows back into typed events.

use std::collections::HashMap;
use std::fmt;

use crate::error::{DomainError, ErrorKind};
use crate::event::{DomainEvent, EventPayload, decode_payload};

type Unmarshaler<E> = Box<dyn Fn(&[u8], u64) -> Result<E, DomainError> + Send + Sync>;

/// Maps event names to decoders producing events of type `E`.
pub struct EventRegistry<E> {
    unmarshalers: HashMap<&'static str, Unmarshaler<E>>,
}

impl<E: DomainEvent> EventRegistry<E> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            unmarshalers: HashMap::new(),
        }
    }

    /// Registers a decoder under `event_name`.
    ///
    /// # Errors
    ///
    /// Returns `Duplicate` if a decoder is already registered for the name.
    pub fn register<F>(&mut self, event_name: &'static str, unmarshal: F) -> Result<(), DomainError>
    where
        F: Fn(&[u8], u64) -> Result<E, DomainError> + Send + Sync + 'static,
    {
        if self.unmarshalers.contains_key(event_name) {
            return Err(DomainError::duplicate(format!(
                "an unmarshaler for {event_name} is already registered"
            )));
        }
        self.unmarshalers.insert(event_name, Box::new(unmarshal));
        Ok(())
    }

    /// Registers the payload type `P` under its own name, lifting it into `E`
    /// with `lift` (typically an enum variant constructor).
    ///
    /// # Errors
    ///
    /// Returns `Duplicate` if `P::EVENT_NAME` is already registered.
    pub fn register_payload<P>(&mut self, lift: fn(P) -> E) -> Result<(), DomainError>
    where
        P: EventPayload + 'static,
    {
        self.register(P::EVENT_NAME, move |bytes, version| {
            decode_payload::<P>(bytes, version).map(lift)
        })
    }

    /// Decodes `bytes` with the decoder registered for `event_name`, stamping
    /// the result with `stream_version`.
    ///
    /// # Errors
    ///
    /// Returns `UnmarshalingFailed` if the name is unknown or the payload is
    /// invalid.
    pub fn decode(&self, event_name: &str, bytes: &[u8], stream_version: u64) -> Result<E, DomainError> {
        let unmarshal = self.unmarshalers.get(event_name).ok_or_else(|| {
            DomainError::new(
                ErrorKind::UnmarshalingFailed,
                format!("no unmarshaler registered for event {event_name}"),
            )
        })?;
        unmarshal(bytes, stream_version)
    }

    /// Returns `true` if a decoder is registered for `event_name`.
    #[must_use]
    pub fn contains(&self, event_name: &str) -> bool {
        self.unmarshalers.contains_key(event_name)
    }

    /// Registered event names, sorted.
    #[must_use]
    pub fn event_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.unmarshalers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl<E: DomainEvent> Default for EventRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.unmarshalers.keys().collect();
        names.sort_unstable();
        f.debug_struct("EventRegistry").field("events", &names).finish()
    }
}
