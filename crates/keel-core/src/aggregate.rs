//! Aggregate runtime: folding event streams and deciding on commands.
//!
//! An aggregate kind is a value type plus a handful of pure functions. State
//! is never persisted; it is recomputed from the stream (or picked up from an
//! [`AggregateCache`](crate::cache::AggregateCache)) for every command.

use std::fmt;

use crate::clock::Clock;
use crate::command::Command;
use crate::error::DomainError;
use crate::event::DomainEvent;
use crate::stream::{Identifier, StreamId};

/// Result of handling a command against existing state.
#[derive(Debug)]
pub enum Outcome<E> {
    /// The command was accepted; the events (possibly none) are appended.
    Accepted(Vec<E>),
    /// The command was rejected, but the rejection itself is recorded: the
    /// events are appended and committed, then `reason` is returned to the
    /// caller.
    Rejected {
        /// Events recording the rejection.
        events: Vec<E>,
        /// Error surfaced after the events are committed.
        reason: DomainError,
    },
}

impl<E> Outcome<E> {
    /// An accepted outcome with no events.
    #[must_use]
    pub fn unchanged() -> Self {
        Self::Accepted(Vec::new())
    }

    /// The events to append, regardless of acceptance.
    #[must_use]
    pub fn events(&self) -> &[E] {
        match self {
            Self::Accepted(events) | Self::Rejected { events, .. } => events,
        }
    }

    /// Splits into the events to append and the error to report afterwards.
    #[must_use]
    pub fn into_parts(self) -> (Vec<E>, Option<DomainError>) {
        match self {
            Self::Accepted(events) => (events, None),
            Self::Rejected { events, reason } => (events, Some(reason)),
        }
    }
}

/// Trait for event-sourced aggregates.
pub trait Aggregate: Clone + Send + Sync + fmt::Debug + 'static {
    /// The event type this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The closed set of commands this aggregate accepts.
    type Command: Command;

    /// Prefix of this aggregate's stream ids.
    const KIND: &'static str;

    /// Stream id holding the events of aggregate `id`.
    fn stream_id(id: &Identifier) -> StreamId {
        StreamId::for_aggregate(Self::KIND, id)
    }

    /// Builds the initial state from the first event of a stream, or returns
    /// `None` if `event` does not create this kind of aggregate.
    fn genesis(event: &Self::Event) -> Option<Self>;

    /// Returns the state after applying `event`.
    #[must_use]
    fn evolve(self, event: &Self::Event) -> Self;

    /// Produces the events establishing a new stream. The single event must
    /// carry stream version 1.
    ///
    /// # Errors
    ///
    /// Returns `CommandInvalid` if `command` is not a creation command.
    fn create(command: &Self::Command, clock: &dyn Clock) -> Result<Vec<Self::Event>, DomainError>;

    /// Decides on `command` against the current state. Emitted events must be
    /// numbered `current_version + 1`, `current_version + 2`, and so on.
    ///
    /// # Errors
    ///
    /// Returns `DomainConstraintsViolation` for rejections that are not
    /// recorded as events, or `CommandInvalid` for creation commands.
    fn handle(
        &self,
        current_version: u64,
        command: &Self::Command,
        clock: &dyn Clock,
    ) -> Result<Outcome<Self::Event>, DomainError>;
}

/// Folds a complete stream into state, returning it with the version of the
/// last event.
///
/// # Errors
///
/// Returns `NotFound` if the stream is empty or does not start with a
/// creation event, and `Technical` if the versions are not `1, 2, …`.
pub fn fold<A: Aggregate>(events: &[A::Event]) -> Result<(A, u64), DomainError> {
    let Some((first, rest)) = events.split_first() else {
        return Err(DomainError::not_found(format!("{} stream is empty", A::KIND)));
    };
    let state = A::genesis(first).ok_or_else(|| {
        DomainError::not_found(format!(
            "{} stream does not start with a creation event (found {})",
            A::KIND,
            first.event_name()
        ))
    })?;
    check_version(first, 1)?;
    fold_onto(state, 1, rest)
}

/// Applies `events` on top of `state` that was folded up to `version`.
///
/// # Errors
///
/// Returns `Technical` if the events do not continue at `version + 1`
/// without gaps.
pub fn fold_onto<A: Aggregate>(
    state: A,
    version: u64,
    events: &[A::Event],
) -> Result<(A, u64), DomainError> {
    let mut state = state;
    let mut version = version;
    for event in events {
        check_version(event, version + 1)?;
        state = state.evolve(event);
        version += 1;
    }
    Ok((state, version))
}

/// Verifies that freshly decided events are numbered after `current_version`.
///
/// # Errors
///
/// Returns `Technical` naming the first misnumbered event.
pub fn check_numbering<E: DomainEvent>(current_version: u64, events: &[E]) -> Result<(), DomainError> {
    let mut expected = current_version;
    for event in events {
        expected += 1;
        check_version(event, expected)?;
    }
    Ok(())
}

fn check_version<E: DomainEvent>(event: &E, expected: u64) -> Result<(), DomainError> {
    if event.stream_version() == expected {
        Ok(())
    } else {
        Err(DomainError::technical(format!(
            "{} carries stream version {}, expected {expected}",
            event.event_name(),
            event.stream_version()
        )))
    }
}
