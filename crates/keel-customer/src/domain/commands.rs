//! Commands for the Customer context.
//!
//! Constructors validate their input and generate identifiers and
//! confirmation hashes up front, so aggregate handlers never need a source
//! of randomness.

use keel_core::command::Command;
use keel_core::error::DomainError;
use keel_core::stream::Identifier;
use uuid::Uuid;

use crate::domain::values::{ConfirmationHash, EmailAddress, PersonName};

/// Command to register a new customer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Register {
    /// The customer identifier, generated by [`Register::build`].
    pub customer_id: Identifier,
    /// The address to confirm.
    pub email_address: EmailAddress,
    /// The customer's name.
    pub name: PersonName,
    /// The hash the customer will be asked to present.
    pub confirmation_hash: ConfirmationHash,
}

impl Register {
    /// Builds a registration for a fresh customer id.
    ///
    /// # Errors
    ///
    /// Returns `InputInvalid` if the address or name is invalid.
    pub fn build(email_address: &str, given_name: &str, family_name: &str) -> Result<Self, DomainError> {
        Ok(Self {
            customer_id: Identifier::new(Uuid::new_v4().to_string())?,
            email_address: EmailAddress::new(email_address)?,
            name: PersonName::new(given_name, family_name)?,
            confirmation_hash: ConfirmationHash::generate(),
        })
    }
}

/// Command to confirm a customer's email address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfirmEmailAddress {
    /// The customer identifier.
    pub customer_id: Identifier,
    /// The hash presented by the customer.
    pub confirmation_hash: ConfirmationHash,
}

impl ConfirmEmailAddress {
    /// Builds a confirmation attempt.
    ///
    /// # Errors
    ///
    /// Returns `InputInvalid` if either argument is blank.
    pub fn build(customer_id: &str, confirmation_hash: &str) -> Result<Self, DomainError> {
        Ok(Self {
            customer_id: Identifier::new(customer_id)?,
            confirmation_hash: ConfirmationHash::new(confirmation_hash)?,
        })
    }
}

/// Command to change a customer's email address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeEmailAddress {
    /// The customer identifier.
    pub customer_id: Identifier,
    /// The new address.
    pub email_address: EmailAddress,
    /// The hash that will confirm the new address.
    pub confirmation_hash: ConfirmationHash,
}

impl ChangeEmailAddress {
    /// Builds an address change with a fresh confirmation hash.
    ///
    /// # Errors
    ///
    /// Returns `InputInvalid` if the id is blank or the address is invalid.
    pub fn build(customer_id: &str, email_address: &str) -> Result<Self, DomainError> {
        Ok(Self {
            customer_id: Identifier::new(customer_id)?,
            email_address: EmailAddress::new(email_address)?,
            confirmation_hash: ConfirmationHash::generate(),
        })
    }
}

/// Every command the Customer aggregate accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomerCommand {
    /// Register a new customer.
    Register(Register),
    /// Confirm the current email address.
    ConfirmEmailAddress(ConfirmEmailAddress),
    /// Change the email address.
    ChangeEmailAddress(ChangeEmailAddress),
}

impl Command for CustomerCommand {
    fn command_type(&self) -> &'static str {
        match self {
            Self::Register(_) => "Register",
            Self::ConfirmEmailAddress(_) => "ConfirmEmailAddress",
            Self::ChangeEmailAddress(_) => "ChangeEmailAddress",
        }
    }

    fn aggregate_id(&self) -> &Identifier {
        match self {
            Self::Register(c) => &c.customer_id,
            Self::ConfirmEmailAddress(c) => &c.customer_id,
            Self::ChangeEmailAddress(c) => &c.customer_id,
        }
    }

    fn is_creation(&self) -> bool {
        matches!(self, Self::Register(_))
    }
}

impl From<Register> for CustomerCommand {
    fn from(command: Register) -> Self {
        Self::Register(command)
    }
}

impl From<ConfirmEmailAddress> for CustomerCommand {
    fn from(command: ConfirmEmailAddress) -> Self {
        Self::ConfirmEmailAddress(command)
    }
}

impl From<ChangeEmailAddress> for CustomerCommand {
    fn from(command: ChangeEmailAddress) -> Self {
        Self::ChangeEmailAddress(command)
    }
}
