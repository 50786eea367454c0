//! Domain event abstractions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, ErrorKind};

/// Metadata attached to every domain event.
///
/// Serialized as the nested `meta` object of an event payload. The stream
/// version is not part of the payload: it lives in its own column and is
/// re-attached when the event is decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMeta {
    /// Stable name of the event type.
    pub event_name: String,
    /// Timestamp of event creation.
    #[serde(with = "rfc3339_nanos")]
    pub occurred_at: DateTime<Utc>,
    /// Position of the event within its stream, starting at 1.
    #[serde(skip)]
    pub stream_version: u64,
}

impl EventMeta {
    /// Creates metadata for a freshly recorded event.
    #[must_use]
    pub fn new(event_name: &str, occurred_at: DateTime<Utc>, stream_version: u64) -> Self {
        Self {
            event_name: event_name.to_owned(),
            occurred_at,
            stream_version,
        }
    }
}

/// Trait that all domain events implement.
pub trait DomainEvent: Clone + Send + Sync + fmt::Debug + 'static {
    /// Returns the metadata for this event.
    fn meta(&self) -> &EventMeta;

    /// Serializes the event payload, including its `meta` object.
    ///
    /// # Errors
    ///
    /// Returns `MarshalingFailed` if the payload cannot be serialized.
    fn encode(&self) -> Result<Vec<u8>, DomainError>;

    /// Returns the event name (used for decoder routing).
    fn event_name(&self) -> &str {
        &self.meta().event_name
    }

    /// Returns when the event was recorded.
    fn occurred_at(&self) -> DateTime<Utc> {
        self.meta().occurred_at
    }

    /// Returns the stream version of the event.
    fn stream_version(&self) -> u64 {
        self.meta().stream_version
    }
}

/// A single concrete event type with a fixed name.
///
/// Aggregates usually wrap several payload types in one enum that implements
/// [`DomainEvent`]; the payloads themselves implement this trait so they can
/// be encoded and decoded with [`encode_payload`] and [`decode_payload`].
pub trait EventPayload: Serialize + DeserializeOwned {
    /// The event name, part of the persisted format.
    const EVENT_NAME: &'static str;

    /// Returns the payload's metadata.
    fn meta(&self) -> &EventMeta;

    /// Returns the payload's metadata for in-place update.
    fn meta_mut(&mut self) -> &mut EventMeta;
}

/// Serializes a payload to JSON bytes.
///
/// # Errors
///
/// Returns `MarshalingFailed` if serialization fails.
pub fn encode_payload<P: EventPayload>(payload: &P) -> Result<Vec<u8>, DomainError> {
    serde_json::to_vec(payload).map_err(|e| {
        DomainError::wrap(
            ErrorKind::MarshalingFailed,
            format!("failed to encode {}", P::EVENT_NAME),
            e,
        )
    })
}

/// Deserializes a payload and re-attaches the stream version supplied
/// out-of-band.
///
/// # Errors
///
/// Returns `UnmarshalingFailed` if the bytes are not a valid payload, or if
/// the embedded event name disagrees with `P::EVENT_NAME`.
pub fn decode_payload<P: EventPayload>(bytes: &[u8], stream_version: u64) -> Result<P, DomainError> {
    let mut payload: P = serde_json::from_slice(bytes).map_err(|e| {
        DomainError::wrap(
            ErrorKind::UnmarshalingFailed,
            format!("failed to decode {}", P::EVENT_NAME),
            e,
        )
    })?;
    if payload.meta().event_name != P::EVENT_NAME {
        return Err(DomainError::new(
            ErrorKind::UnmarshalingFailed,
            format!(
                "payload names event {} but was decoded as {}",
                payload.meta().event_name,
                P::EVENT_NAME
            ),
        ));
    }
    payload.meta_mut().stream_version = stream_version;
    Ok(payload)
}

/// Formats a timestamp as RFC 3339 with nanosecond precision.
#[must_use]
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
}

/// Parses an RFC 3339 timestamp into UTC.
///
/// # Errors
///
/// Returns `UnmarshalingFailed` if `value` is not RFC 3339.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DomainError> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| {
            DomainError::wrap(
                ErrorKind::UnmarshalingFailed,
                format!("invalid timestamp {value:?}"),
                e,
            )
        })
}

/// Serde adapter for `DateTime<Utc>` in RFC 3339 nanosecond form.
pub mod rfc3339_nanos {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serializes a timestamp as an RFC 3339 nanosecond string.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(at))
    }

    /// Deserializes an RFC 3339 string into UTC.
    ///
    /// # Errors
    ///
    /// Fails if the string is not RFC 3339.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}
