//! Command abstractions.

use std::fmt;

use crate::error::DomainError;
use crate::stream::Identifier;

/// Trait that all commands implement.
///
/// Commands are values validated by their constructors. Aggregates expose a
/// closed enum of commands; the pipeline dispatches on its variants.
pub trait Command: Send + Sync + fmt::Debug {
    /// The type name for this command (for logging).
    fn command_type(&self) -> &'static str;

    /// The aggregate this command targets.
    fn aggregate_id(&self) -> &Identifier;

    /// Returns `true` for commands that establish a new stream.
    fn is_creation(&self) -> bool;

    /// Rejects zero-value commands that bypassed their constructor.
    ///
    /// # Errors
    ///
    /// Returns `CommandInvalid` if the command targets no aggregate.
    fn validate(&self) -> Result<(), DomainError> {
        if self.aggregate_id().is_empty() {
            return Err(DomainError::command_invalid(format!(
                "{} was not initialized",
                self.command_type()
            )));
        }
        Ok(())
    }
}
