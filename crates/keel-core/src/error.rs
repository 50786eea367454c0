//! Domain error types.
//!
//! Every fallible operation in the runtime returns a [`DomainError`]. Callers
//! branch on its [`ErrorKind`] through [`DomainError::is`], which also looks
//! through wrapped causes, and print it for the human-readable chain.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// Boxed cause attached to a [`DomainError`].
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Classification of a [`DomainError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A command constructor rejected its arguments.
    InputInvalid,
    /// A command reached the pipeline in an uninitialized state.
    CommandInvalid,
    /// The aggregate rejected the command.
    DomainConstraintsViolation,
    /// An append collided with an existing stream version.
    ConcurrencyConflict,
    /// The pipeline gave up after repeated conflicts.
    MaxRetriesExceeded,
    /// The stream is empty or does not exist.
    NotFound,
    /// A stream (or registration) that must be unique already exists.
    Duplicate,
    /// An event could not be encoded.
    MarshalingFailed,
    /// An event could not be decoded.
    UnmarshalingFailed,
    /// Any other I/O, driver or transaction failure.
    Technical,
}

impl ErrorKind {
    /// Stable snake-case label, used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InputInvalid => "input_invalid",
            Self::CommandInvalid => "command_invalid",
            Self::DomainConstraintsViolation => "domain_constraints_violation",
            Self::ConcurrencyConflict => "concurrency_conflict",
            Self::MaxRetriesExceeded => "max_retries_exceeded",
            Self::NotFound => "not_found",
            Self::Duplicate => "duplicate",
            Self::MarshalingFailed => "marshaling_failed",
            Self::UnmarshalingFailed => "unmarshaling_failed",
            Self::Technical => "technical",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level domain error type.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct DomainError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl DomainError {
    /// Creates an error of the given kind without a cause.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error of the given kind wrapping `source`.
    pub fn wrap(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Shorthand for [`ErrorKind::InputInvalid`].
    pub fn input_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InputInvalid, message)
    }

    /// Shorthand for [`ErrorKind::CommandInvalid`].
    pub fn command_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CommandInvalid, message)
    }

    /// Shorthand for [`ErrorKind::DomainConstraintsViolation`].
    pub fn constraints_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DomainConstraintsViolation, message)
    }

    /// Shorthand for [`ErrorKind::ConcurrencyConflict`].
    pub fn concurrency_conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConcurrencyConflict, message)
    }

    /// Shorthand for [`ErrorKind::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Shorthand for [`ErrorKind::Duplicate`].
    pub fn duplicate(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Duplicate, message)
    }

    /// Shorthand for [`ErrorKind::Technical`].
    pub fn technical(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Technical, message)
    }

    /// The kind of this error, ignoring any wrapped cause.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The message of this error, without the kind prefix or causes.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns `true` if this error, or any [`DomainError`] in its cause
    /// chain, has the given kind.
    #[must_use]
    pub fn is(&self, kind: ErrorKind) -> bool {
        if self.kind == kind {
            return true;
        }
        let mut cause = self.source();
        while let Some(err) = cause {
            if let Some(domain) = err.downcast_ref::<DomainError>()
                && domain.kind == kind
            {
                return true;
            }
            cause = err.source();
        }
        false
    }

    /// Re-labels this error with a new kind and message, keeping it as the
    /// cause.
    #[must_use]
    pub fn reclassify(self, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::wrap(kind, message, self)
    }
}
