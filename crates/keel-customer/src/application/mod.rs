//! Application services for the Customer context.

pub mod command_handlers;
