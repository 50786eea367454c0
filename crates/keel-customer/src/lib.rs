//! Keel — Customer registration sample context.
//!
//! Customers register with an email address, confirm it with the hash they
//! were sent, and may change it later, which requires a new confirmation.

pub mod application;
pub mod domain;
