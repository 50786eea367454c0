//! Customer aggregate.

use keel_core::aggregate::{Aggregate, Outcome};
use keel_core::clock::Clock;
use keel_core::command::Command;
use keel_core::error::DomainError;
use keel_core::event::EventMeta;
use keel_core::stream::Identifier;

use crate::domain::commands::{ChangeEmailAddress, ConfirmEmailAddress, CustomerCommand, Register};
use crate::domain::events::{
    CUSTOMER_EMAIL_ADDRESS_CHANGED_EVENT, CUSTOMER_EMAIL_ADDRESS_CONFIRMATION_FAILED_EVENT,
    CUSTOMER_EMAIL_ADDRESS_CONFIRMED_EVENT, CUSTOMER_REGISTERED_EVENT, CustomerEmailAddressChanged,
    CustomerEmailAddressConfirmationFailed, CustomerEmailAddressConfirmed, CustomerEvent,
    CustomerRegistered,
};
use crate::domain::values::{ConfirmationHash, EmailAddress, PersonName};

/// Folded state of one customer.
///
/// A registered customer is unconfirmed until they present the current
/// confirmation hash. Changing the address issues a new hash and makes the
/// customer unconfirmed again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    /// The customer identifier.
    pub customer_id: Identifier,
    /// The current email address.
    pub email_address: EmailAddress,
    /// The hash that confirms the current address.
    pub confirmation_hash: ConfirmationHash,
    /// Whether the current address is confirmed.
    pub is_email_address_confirmed: bool,
    /// The customer's name.
    pub name: PersonName,
}

impl Customer {
    fn confirm_email_address(
        &self,
        version: u64,
        command: &ConfirmEmailAddress,
        clock: &dyn Clock,
    ) -> Outcome<CustomerEvent> {
        if self.is_email_address_confirmed {
            return Outcome::unchanged();
        }

        if command.confirmation_hash != self.confirmation_hash {
            let event = CustomerEvent::EmailAddressConfirmationFailed(
                CustomerEmailAddressConfirmationFailed {
                    customer_id: self.customer_id.clone(),
                    confirmation_hash: command.confirmation_hash.clone(),
                    meta: EventMeta::new(
                        CUSTOMER_EMAIL_ADDRESS_CONFIRMATION_FAILED_EVENT,
                        clock.now(),
                        version + 1,
                    ),
                },
            );
            return Outcome::Rejected {
                events: vec![event],
                reason: DomainError::constraints_violation(format!(
                    "confirmation hash does not match for customer {}",
                    self.customer_id
                )),
            };
        }

        Outcome::Accepted(vec![CustomerEvent::EmailAddressConfirmed(
            CustomerEmailAddressConfirmed {
                customer_id: self.customer_id.clone(),
                email_address: self.email_address.clone(),
                meta: EventMeta::new(CUSTOMER_EMAIL_ADDRESS_CONFIRMED_EVENT, clock.now(), version + 1),
            },
        )])
    }

    fn change_email_address(
        &self,
        version: u64,
        command: &ChangeEmailAddress,
        clock: &dyn Clock,
    ) -> Outcome<CustomerEvent> {
        if command.email_address == self.email_address {
            return Outcome::unchanged();
        }

        Outcome::Accepted(vec![CustomerEvent::EmailAddressChanged(
            CustomerEmailAddressChanged {
                customer_id: self.customer_id.clone(),
                email_address: command.email_address.clone(),
                confirmation_hash: command.confirmation_hash.clone(),
                meta: EventMeta::new(CUSTOMER_EMAIL_ADDRESS_CHANGED_EVENT, clock.now(), version + 1),
            },
        )])
    }
}

fn registered(command: &Register, clock: &dyn Clock) -> CustomerEvent {
    CustomerEvent::Registered(CustomerRegistered {
        customer_id: command.customer_id.clone(),
        email_address: command.email_address.clone(),
        confirmation_hash: command.confirmation_hash.clone(),
        person_given_name: command.name.given_name().to_owned(),
        person_family_name: command.name.family_name().to_owned(),
        meta: EventMeta::new(CUSTOMER_REGISTERED_EVENT, clock.now(), 1),
    })
}

impl Aggregate for Customer {
    type Event = CustomerEvent;
    type Command = CustomerCommand;

    const KIND: &'static str = "customer";

    fn genesis(event: &CustomerEvent) -> Option<Self> {
        match event {
            CustomerEvent::Registered(e) => Some(Self {
                customer_id: e.customer_id.clone(),
                email_address: e.email_address.clone(),
                confirmation_hash: e.confirmation_hash.clone(),
                is_email_address_confirmed: false,
                name: PersonName::restore(&e.person_given_name, &e.person_family_name),
            }),
            _ => None,
        }
    }

    fn evolve(self, event: &CustomerEvent) -> Self {
        match event {
            CustomerEvent::Registered(_) | CustomerEvent::EmailAddressConfirmationFailed(_) => self,
            CustomerEvent::EmailAddressConfirmed(_) => Self {
                is_email_address_confirmed: true,
                ..self
            },
            CustomerEvent::EmailAddressChanged(e) => Self {
                email_address: e.email_address.clone(),
                confirmation_hash: e.confirmation_hash.clone(),
                is_email_address_confirmed: false,
                ..self
            },
        }
    }

    fn create(command: &CustomerCommand, clock: &dyn Clock) -> Result<Vec<CustomerEvent>, DomainError> {
        match command {
            CustomerCommand::Register(c) => Ok(vec![registered(c, clock)]),
            other => Err(DomainError::command_invalid(format!(
                "{} cannot create a customer",
                other.command_type()
            ))),
        }
    }

    fn handle(
        &self,
        current_version: u64,
        command: &CustomerCommand,
        clock: &dyn Clock,
    ) -> Result<Outcome<CustomerEvent>, DomainError> {
        match command {
            CustomerCommand::Register(_) => Err(DomainError::command_invalid(format!(
                "customer {} is already registered",
                self.customer_id
            ))),
            CustomerCommand::ConfirmEmailAddress(c) => {
                Ok(self.confirm_email_address(current_version, c, clock))
            }
            CustomerCommand::ChangeEmailAddress(c) => {
                Ok(self.change_email_address(current_version, c, clock))
            }
        }
    }
}
