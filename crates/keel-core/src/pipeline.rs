//! Command pipeline: one transaction per attempt, retried on version
//! conflicts.
//!
//! For every attempt the pipeline opens a session, folds the target stream,
//! asks the aggregate to decide, appends whatever it decided (possibly
//! nothing) and commits. A `ConcurrencyConflict` from the append or the
//! commit rolls the attempt back and starts over with fresh state, up to
//! [`PipelineConfig::max_retries`] attempts. The unique
//! `(stream_id, stream_version)` key of the store is the only
//! synchronization between concurrent commands.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::aggregate::{Aggregate, check_numbering, fold, fold_onto};
use crate::cache::AggregateCache;
use crate::clock::Clock;
use crate::command::Command;
use crate::error::{DomainError, ErrorKind};
use crate::event::DomainEvent;
use crate::store::{ALL_EVENTS, EventStore};
use crate::stream::StreamId;

/// Default number of attempts before giving up on conflicts.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Default upper bound of the pause between attempts.
pub const DEFAULT_RETRY_JITTER: Duration = Duration::from_millis(5);

/// Tuning knobs for [`CommandPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Attempts per command, including the first one. At least 2.
    pub max_retries: u32,
    /// Upper bound of the randomized pause between attempts. Zero disables
    /// the pause.
    pub retry_jitter: Duration,
    /// Deadline applied to each command as a whole.
    pub command_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_jitter: DEFAULT_RETRY_JITTER,
            command_timeout: None,
        }
    }
}

impl PipelineConfig {
    /// Sets the attempt ceiling.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the retry pause bound.
    #[must_use]
    pub fn with_retry_jitter(mut self, retry_jitter: Duration) -> Self {
        self.retry_jitter = retry_jitter;
        self
    }

    /// Sets the per-command deadline.
    #[must_use]
    pub fn with_command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = Some(command_timeout);
        self
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns `InputInvalid` if `max_retries` is below 2.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.max_retries < 2 {
            return Err(DomainError::input_invalid(format!(
                "max_retries must be at least 2, got {}",
                self.max_retries
            )));
        }
        Ok(())
    }
}

/// What one successful attempt decided and committed.
struct Decision<A: Aggregate> {
    events: Vec<A::Event>,
    rejection: Option<DomainError>,
    state: Option<(A, u64)>,
}

/// Executes commands of aggregate kind `A` against store `S`.
pub struct CommandPipeline<A: Aggregate, S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: PipelineConfig,
    cache: Option<Arc<AggregateCache<A>>>,
}

impl<A, S> CommandPipeline<A, S>
where
    A: Aggregate,
    S: EventStore<A::Event>,
{
    /// Creates a pipeline without a state cache.
    ///
    /// # Errors
    ///
    /// Returns `InputInvalid` if `config` is invalid.
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        config: PipelineConfig,
    ) -> Result<Self, DomainError> {
        config.validate()?;
        Ok(Self {
            store,
            clock,
            config,
            cache: None,
        })
    }

    /// Enables the folded-state cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<AggregateCache<A>>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// The underlying event store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Executes `command`, returning the events it committed.
    ///
    /// # Errors
    ///
    /// - `CommandInvalid` for a zero-value command.
    /// - `NotFound` if a non-creation command targets an empty stream.
    /// - `Duplicate` if a creation command targets an existing stream.
    /// - `DomainConstraintsViolation` if the aggregate rejected the command
    ///   (any events recording the rejection are committed first).
    /// - `MaxRetriesExceeded` (wrapping the last `ConcurrencyConflict`) once
    ///   the attempt ceiling is reached.
    /// - `Technical`, `MarshalingFailed` or `UnmarshalingFailed` from the
    ///   store, and `Technical` if the configured deadline elapses.
    pub async fn execute(&self, command: &A::Command) -> Result<Vec<A::Event>, DomainError> {
        match self.config.command_timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(command))
                .await
                .unwrap_or_else(|_| {
                    Err(DomainError::technical(format!(
                        "{} exceeded its deadline of {limit:?}",
                        command.command_type()
                    )))
                }),
            None => self.run(command).await,
        }
    }

    /// Executes `command` unless `cancel` completes first.
    ///
    /// Cancelling drops the in-flight attempt, and with it any open session,
    /// which rolls the session back. A command whose commit already finished
    /// reports success even if `cancel` is ready at the same time.
    ///
    /// # Errors
    ///
    /// As [`execute`](Self::execute), plus `Technical` on cancellation.
    pub async fn execute_until<F>(
        &self,
        command: &A::Command,
        cancel: F,
    ) -> Result<Vec<A::Event>, DomainError>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::select! {
            biased;
            result = self.execute(command) => result,
            () = cancel => Err(DomainError::technical(format!(
                "{} was cancelled",
                command.command_type()
            ))),
        }
    }

    async fn run(&self, command: &A::Command) -> Result<Vec<A::Event>, DomainError> {
        command.validate()?;
        let stream_id = A::stream_id(command.aggregate_id());

        let mut attempt = 1;
        loop {
            debug!(
                command = command.command_type(),
                stream_id = %stream_id,
                attempt,
                "executing command"
            );
            match self.attempt(&stream_id, command).await {
                Ok(decision) => {
                    info!(
                        command = command.command_type(),
                        stream_id = %stream_id,
                        attempt,
                        events = decision.events.len(),
                        rejected = decision.rejection.is_some(),
                        "command committed"
                    );
                    if let (Some(cache), Some((state, version))) = (&self.cache, &decision.state) {
                        cache.put(&stream_id, state, *version);
                    }
                    return match decision.rejection {
                        Some(reason) => Err(reason),
                        None => Ok(decision.events),
                    };
                }
                Err(err) if err.kind() == ErrorKind::ConcurrencyConflict => {
                    self.forget(&stream_id);
                    if command.is_creation() {
                        return Err(err.reclassify(
                            ErrorKind::Duplicate,
                            format!("stream {stream_id} already exists"),
                        ));
                    }
                    if attempt >= self.config.max_retries {
                        warn!(
                            command = command.command_type(),
                            stream_id = %stream_id,
                            attempts = attempt,
                            "giving up after repeated concurrency conflicts"
                        );
                        return Err(err.reclassify(
                            ErrorKind::MaxRetriesExceeded,
                            format!(
                                "{} on {stream_id} failed after {attempt} attempts",
                                command.command_type()
                            ),
                        ));
                    }
                    warn!(
                        command = command.command_type(),
                        stream_id = %stream_id,
                        attempt,
                        error = %err,
                        "concurrency conflict, retrying"
                    );
                    self.pause().await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.kind() == ErrorKind::UnmarshalingFailed {
                        self.forget(&stream_id);
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn attempt(
        &self,
        stream_id: &StreamId,
        command: &A::Command,
    ) -> Result<Decision<A>, DomainError> {
        let mut session = self.store.begin().await?;
        match self.decide(&mut session, stream_id, command).await {
            Ok(decision) => {
                self.store.commit(session).await?;
                Ok(decision)
            }
            Err(err) => {
                if let Err(rollback_err) = self.store.rollback(session).await {
                    error!(
                        stream_id = %stream_id,
                        error = %rollback_err,
                        "rollback failed"
                    );
                }
                Err(err)
            }
        }
    }

    async fn decide(
        &self,
        session: &mut S::Session,
        stream_id: &StreamId,
        command: &A::Command,
    ) -> Result<Decision<A>, DomainError> {
        let clock = self.clock.as_ref();
        let decision = if command.is_creation() {
            if self.store.stream_exists(session, stream_id).await? {
                return Err(DomainError::duplicate(format!(
                    "stream {stream_id} already exists"
                )));
            }
            let events = A::create(command, clock)?;
            check_numbering(0, &events)?;
            let state = fold::<A>(&events)?;
            Decision {
                events,
                rejection: None,
                state: Some(state),
            }
        } else {
            let (state, version) = self.load_state(session, stream_id).await?;
            let (events, rejection) = state.handle(version, command, clock)?.into_parts();
            check_numbering(version, &events)?;
            let state = fold_onto(state, version, &events)?;
            Decision {
                events,
                rejection,
                state: Some(state),
            }
        };

        self.store
            .append_events_to_stream(session, stream_id, &decision.events)
            .await?;
        Ok(decision)
    }

    async fn load_state(
        &self,
        session: &mut S::Session,
        stream_id: &StreamId,
    ) -> Result<(A, u64), DomainError> {
        if let Some((state, version)) = self.cache.as_ref().and_then(|cache| cache.get(stream_id)) {
            let loaded = self
                .store
                .load_event_stream(session, stream_id, version, ALL_EVENTS)
                .await?;
            // The cached version itself must still be stored, or the stream
            // was purged or rewritten underneath the cache.
            match loaded.split_first() {
                Some((head, tail)) if head.stream_version() == version => {
                    debug!(
                        stream_id = %stream_id,
                        cached_version = version,
                        tail = tail.len(),
                        "resuming from cached state"
                    );
                    return fold_onto(state, version, tail);
                }
                _ => {
                    warn!(
                        stream_id = %stream_id,
                        cached_version = version,
                        "cached state no longer matches the stream"
                    );
                    self.forget(stream_id);
                }
            }
        }

        let events = self
            .store
            .load_event_stream(session, stream_id, 1, ALL_EVENTS)
            .await?;
        if events.is_empty() {
            return Err(DomainError::not_found(format!("stream {stream_id} not found")));
        }
        debug!(
            stream_id = %stream_id,
            version = events.last().map_or(0, |event| event.stream_version()),
            "folding stream"
        );
        fold::<A>(&events)
    }

    fn forget(&self, stream_id: &StreamId) {
        if let Some(cache) = &self.cache {
            cache.invalidate(stream_id);
        }
    }

    async fn pause(&self) {
        let bound = u64::try_from(self.config.retry_jitter.as_micros()).unwrap_or(u64::MAX);
        if bound == 0 {
            return;
        }
        let micros = rand::random_range(0..=bound);
        tokio::time::sleep(Duration::from_micros(micros)).await;
    }
}
