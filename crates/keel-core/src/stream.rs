//! Aggregate and stream identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Opaque aggregate identifier, unique within one aggregate kind.
///
/// The default value is the empty identifier, which is how an uninitialized
/// command is recognised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Wraps a non-empty identifier.
    ///
    /// # Errors
    ///
    /// Returns `InputInvalid` if `value` is blank.
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::input_invalid("identifier must not be empty"));
        }
        Ok(Self(value))
    }

    /// Returns `true` for the zero value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrows the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one event stream, conventionally `<kind>-<aggregate id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StreamId(String);

impl StreamId {
    /// Builds the stream id for an aggregate of the given kind.
    #[must_use]
    pub fn for_aggregate(kind: &str, id: &Identifier) -> Self {
        Self(format!("{kind}-{id}"))
    }

    /// Wraps an arbitrary non-empty stream id.
    ///
    /// # Errors
    ///
    /// Returns `InputInvalid` if `value` is empty.
    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.is_empty() {
            return Err(DomainError::input_invalid("stream id must not be empty"));
        }
        Ok(Self(value))
    }

    /// Borrows the stream id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for StreamId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<StreamId> for String {
    fn from(value: StreamId) -> Self {
        value.0
    }
}
