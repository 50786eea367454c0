//! Command handlers for the Customer context.
//!
//! Each handler lifts its command into [`CustomerCommand`] and runs it
//! through the pipeline, which loads the stream, lets the aggregate decide,
//! and commits the outcome in one transaction.

use keel_core::aggregate::{Aggregate, fold};
use keel_core::error::DomainError;
use keel_core::pipeline::CommandPipeline;
use keel_core::store::{ALL_EVENTS, EventStore};
use keel_core::stream::Identifier;
use tracing::debug;

use crate::domain::aggregates::Customer;
use crate::domain::commands::{ChangeEmailAddress, ConfirmEmailAddress, CustomerCommand, Register};
use crate::domain::events::CustomerEvent;

/// Pipeline executing Customer commands against store `S`.
pub type CustomerPipeline<S> = CommandPipeline<Customer, S>;

/// Result of a successfully handled command.
#[derive(Debug)]
pub struct CustomerCommandResult {
    /// The customer affected by the command.
    pub customer_id: Identifier,
    /// The events committed, empty for a no-op.
    pub events: Vec<CustomerEvent>,
}

async fn dispatch<S>(
    pipeline: &CustomerPipeline<S>,
    customer_id: &Identifier,
    command: CustomerCommand,
) -> Result<CustomerCommandResult, DomainError>
where
    S: EventStore<CustomerEvent>,
{
    let events = pipeline.execute(&command).await?;
    Ok(CustomerCommandResult {
        customer_id: customer_id.clone(),
        events,
    })
}

/// Handles the `Register` command: opens a new customer stream.
///
/// # Errors
///
/// Returns `Duplicate` if the customer already exists, or any store error.
pub async fn handle_register<S>(
    command: &Register,
    pipeline: &CustomerPipeline<S>,
) -> Result<CustomerCommandResult, DomainError>
where
    S: EventStore<CustomerEvent>,
{
    dispatch(pipeline, &command.customer_id, command.clone().into()).await
}

/// Handles the `ConfirmEmailAddress` command.
///
/// # Errors
///
/// Returns `NotFound` for an unknown customer and
/// `DomainConstraintsViolation` for a wrong hash (after the failed attempt
/// has been recorded).
pub async fn handle_confirm_email_address<S>(
    command: &ConfirmEmailAddress,
    pipeline: &CustomerPipeline<S>,
) -> Result<CustomerCommandResult, DomainError>
where
    S: EventStore<CustomerEvent>,
{
    dispatch(pipeline, &command.customer_id, command.clone().into()).await
}

/// Handles the `ChangeEmailAddress` command.
///
/// # Errors
///
/// Returns `NotFound` for an unknown customer, or `MaxRetriesExceeded` if
/// concurrent writers keep winning the race.
pub async fn handle_change_email_address<S>(
    command: &ChangeEmailAddress,
    pipeline: &CustomerPipeline<S>,
) -> Result<CustomerCommandResult, DomainError>
where
    S: EventStore<CustomerEvent>,
{
    dispatch(pipeline, &command.customer_id, command.clone().into()).await
}

/// Folds the committed history of a customer.
///
/// # Errors
///
/// Returns `NotFound` if the customer has no stream.
pub async fn load_customer<S>(store: &S, customer_id: &Identifier) -> Result<(Customer, u64), DomainError>
where
    S: EventStore<CustomerEvent>,
{
    let stream_id = Customer::stream_id(customer_id);
    let events = store.read_event_stream(&stream_id, 1, ALL_EVENTS).await?;
    if events.is_empty() {
        return Err(DomainError::not_found(format!("customer {customer_id} not found")));
    }
    debug!(stream_id = %stream_id, events = events.len(), "loaded customer");
    fold::<Customer>(&events)
}
