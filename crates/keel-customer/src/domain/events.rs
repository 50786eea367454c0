//! Domain events for the Customer context.
//!
//! The event names and JSON field names below are persisted; renaming any
//! of them needs a data migration.

use std::sync::Arc;

use keel_core::error::{DomainError, ErrorKind};
use keel_core::event::{DomainEvent, EventMeta, EventPayload, decode_payload, encode_payload};
use keel_core::registry::EventRegistry;
use keel_core::stream::Identifier;
use serde::{Deserialize, Serialize};

use crate::domain::values::{ConfirmationHash, EmailAddress, PersonName};

/// Event name for [`CustomerRegistered`].
pub const CUSTOMER_REGISTERED_EVENT: &str = "CustomerRegistered";
/// Event name for [`CustomerEmailAddressConfirmed`].
pub const CUSTOMER_EMAIL_ADDRESS_CONFIRMED_EVENT: &str = "CustomerEmailAddressConfirmed";
/// Event name for [`CustomerEmailAddressConfirmationFailed`].
pub const CUSTOMER_EMAIL_ADDRESS_CONFIRMATION_FAILED_EVENT: &str =
    "CustomerEmailAddressConfirmationFailed";
/// Event name for [`CustomerEmailAddressChanged`].
pub const CUSTOMER_EMAIL_ADDRESS_CHANGED_EVENT: &str = "CustomerEmailAddressChanged";

/// Emitted when a customer registers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRegistered {
    /// The customer identifier.
    #[serde(rename = "customerID")]
    pub customer_id: Identifier,
    /// The address awaiting confirmation.
    pub email_address: EmailAddress,
    /// The hash the customer must present to confirm.
    pub confirmation_hash: ConfirmationHash,
    /// The customer's given name.
    pub person_given_name: String,
    /// The customer's family name.
    pub person_family_name: String,
    /// Event metadata.
    pub meta: EventMeta,
}

/// Emitted when a customer confirms their email address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerEmailAddressConfirmed {
    /// The customer identifier.
    #[serde(rename = "customerID")]
    pub customer_id: Identifier,
    /// The address that was confirmed.
    pub email_address: EmailAddress,
    /// Event metadata.
    pub meta: EventMeta,
}

/// Emitted when a confirmation attempt presents the wrong hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerEmailAddressConfirmationFailed {
    /// The customer identifier.
    #[serde(rename = "customerID")]
    pub customer_id: Identifier,
    /// The hash that was presented.
    pub confirmation_hash: ConfirmationHash,
    /// Event metadata.
    pub meta: EventMeta,
}

/// Emitted when a customer changes their email address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerEmailAddressChanged {
    /// The customer identifier.
    #[serde(rename = "customerID")]
    pub customer_id: Identifier,
    /// The new, unconfirmed address.
    pub email_address: EmailAddress,
    /// The hash that confirms the new address.
    pub confirmation_hash: ConfirmationHash,
    /// Event metadata.
    pub meta: EventMeta,
}

macro_rules! impl_event_payload {
    ($($payload:ty => $name:expr),+ $(,)?) => {
        $(
            impl EventPayload for $payload {
                const EVENT_NAME: &'static str = $name;

                fn meta(&self) -> &EventMeta {
                    &self.meta
                }

                fn meta_mut(&mut self) -> &mut EventMeta {
                    &mut self.meta
                }
            }
        )+
    };
}

impl_event_payload! {
    CustomerRegistered => CUSTOMER_REGISTERED_EVENT,
    CustomerEmailAddressConfirmed => CUSTOMER_EMAIL_ADDRESS_CONFIRMED_EVENT,
    CustomerEmailAddressConfirmationFailed => CUSTOMER_EMAIL_ADDRESS_CONFIRMATION_FAILED_EVENT,
    CustomerEmailAddressChanged => CUSTOMER_EMAIL_ADDRESS_CHANGED_EVENT,
}

/// Domain events of the Customer context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomerEvent {
    /// A customer has registered.
    Registered(CustomerRegistered),
    /// A customer has confirmed their email address.
    EmailAddressConfirmed(CustomerEmailAddressConfirmed),
    /// A confirmation attempt failed.
    EmailAddressConfirmationFailed(CustomerEmailAddressConfirmationFailed),
    /// A customer has changed their email address.
    EmailAddressChanged(CustomerEmailAddressChanged),
}

impl DomainEvent for CustomerEvent {
    fn meta(&self) -> &EventMeta {
        match self {
            Self::Registered(e) => &e.meta,
            Self::EmailAddressConfirmed(e) => &e.meta,
            Self::EmailAddressConfirmationFailed(e) => &e.meta,
            Self::EmailAddressChanged(e) => &e.meta,
        }
    }

    fn encode(&self) -> Result<Vec<u8>, DomainError> {
        match self {
            Self::Registered(e) => encode_payload(e),
            Self::EmailAddressConfirmed(e) => encode_payload(e),
            Self::EmailAddressConfirmationFailed(e) => encode_payload(e),
            Self::EmailAddressChanged(e) => encode_payload(e),
        }
    }
}

/// Builds the registry decoding every Customer event.
///
/// # Errors
///
/// Returns `Duplicate` if two payload types share an event name.
pub fn event_registry() -> Result<Arc<EventRegistry<CustomerEvent>>, DomainError> {
    let mut registry = EventRegistry::new();
    registry.register(CUSTOMER_REGISTERED_EVENT, |bytes, stream_version| {
        let registered: CustomerRegistered = decode_payload(bytes, stream_version)?;
        PersonName::new(&registered.person_given_name, &registered.person_family_name).map_err(
            |e| {
                DomainError::wrap(
                    ErrorKind::UnmarshalingFailed,
                    format!("{CUSTOMER_REGISTERED_EVENT} carries an invalid person name"),
                    e,
                )
            },
        )?;
        Ok(CustomerEvent::Registered(registered))
    })?;
    registry.register_payload(CustomerEvent::EmailAddressConfirmed)?;
    registry.register_payload(CustomerEvent::EmailAddressConfirmationFailed)?;
    registry.register_payload(CustomerEvent::EmailAddressChanged)?;
    Ok(Arc::new(registry))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;

    fn registered() -> CustomerEvent {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();
        CustomerEvent::Registered(CustomerRegistered {
            customer_id: Identifier::new("0b7f3c2e-4a51-4c1b-9d56-3f0f8a1e2b44").unwrap(),
            email_address: EmailAddress::new("fiona@gallagher.net").unwrap(),
            confirmation_hash: ConfirmationHash::new("abc123").unwrap(),
            person_given_name: "Fiona".to_owned(),
            person_family_name: "Gallagher".to_owned(),
            meta: EventMeta::new(CUSTOMER_REGISTERED_EVENT, at, 1),
        })
    }

    #[test]
    fn test_registered_payload_shape() {
        // Arrange
        let event = registered();

        // Act
        let value: serde_json::Value = serde_json::from_slice(&event.encode().unwrap()).unwrap();

        // Assert
        assert_eq!(
            value,
            json!({
                "customerID": "0b7f3c2e-4a51-4c1b-9d56-3f0f8a1e2b44",
                "emailAddress": "fiona@gallagher.net",
                "confirmationHash": "abc123",
                "personGivenName": "Fiona",
                "personFamilyName": "Gallagher",
                "meta": {
                    "eventName": "CustomerRegistered",
                    "occurredAt": "2024-03-01T08:30:00.000000000Z"
                }
            })
        );
    }

    #[test]
    fn test_registry_covers_every_event() {
        let registry = event_registry().unwrap();

        assert_eq!(
            registry.event_names(),
            vec![
                CUSTOMER_EMAIL_ADDRESS_CHANGED_EVENT,
                CUSTOMER_EMAIL_ADDRESS_CONFIRMATION_FAILED_EVENT,
                CUSTOMER_EMAIL_ADDRESS_CONFIRMED_EVENT,
                CUSTOMER_REGISTERED_EVENT,
            ]
        );
    }

    #[test]
    fn test_registry_decodes_with_column_version() {
        // Arrange
        let registry = event_registry().unwrap();
        let event = registered();
        let bytes = event.encode().unwrap();

        // Act
        let decoded = registry.decode(CUSTOMER_REGISTERED_EVENT, &bytes, 1).unwrap();

        // Assert
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_decoding_under_wrong_name_fails() {
        let registry = event_registry().unwrap();
        let bytes = registered().encode().unwrap();

        let err = registry
            .decode(CUSTOMER_EMAIL_ADDRESS_CHANGED_EVENT, &bytes, 1)
            .unwrap_err();

        assert!(err.is(ErrorKind::UnmarshalingFailed));
    }

    #[test]
    fn test_registered_with_blank_name_fails_to_unmarshal() {
        // Arrange
        let registry = event_registry().unwrap();
        let mut payload = serde_json::to_value(match registered() {
            CustomerEvent::Registered(e) => e,
            other => panic!("expected Registered, got {other:?}"),
        })
        .unwrap();
        payload["personGivenName"] = json!("  ");
        let bytes = serde_json::to_vec(&payload).unwrap();

        // Act
        let err = registry.decode(CUSTOMER_REGISTERED_EVENT, &bytes, 1).unwrap_err();

        // Assert
        assert_eq!(err.kind(), ErrorKind::UnmarshalingFailed);
        assert!(err.message().contains("person name"));
    }
}
