//! Keel command-line entry point.
//!
//! ```text
//! keel register <email> <given-name> <family-name>
//! keel confirm <customer-id> <confirmation-hash>
//! keel change-email <customer-id> <email>
//! ```

use std::error::Error;

use keel_app::config::Config;
use keel_app::{bootstrap, telemetry};
use keel_customer::application::command_handlers::{
    handle_change_email_address, handle_confirm_email_address, handle_register,
};
use keel_customer::domain::commands::{ChangeEmailAddress, ConfirmEmailAddress, Register};

const USAGE: &str = "usage: keel register <email> <given-name> <family-name>\n       \
                     keel confirm <customer-id> <confirmation-hash>\n       \
                     keel change-email <customer-id> <email>";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    telemetry::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    let config = Config::from_env()?;
    tracing::info!(?config, "starting keel");
    let state = bootstrap::start(&config).await?;
    let customers = state.customers.as_ref();

    match args.as_slice() {
        ["register", email, given_name, family_name] => {
            let command = Register::build(email, given_name, family_name)?;
            handle_register(&command, customers).await?;
            println!("customer_id={}", command.customer_id);
            println!("confirmation_hash={}", command.confirmation_hash);
        }
        ["confirm", customer_id, hash] => {
            let command = ConfirmEmailAddress::build(customer_id, hash)?;
            let result = handle_confirm_email_address(&command, customers).await?;
            println!("events={}", result.events.len());
        }
        ["change-email", customer_id, email] => {
            let command = ChangeEmailAddress::build(customer_id, email)?;
            let result = handle_change_email_address(&command, customers).await?;
            println!("events={}", result.events.len());
            println!("confirmation_hash={}", command.confirmation_hash);
        }
        _ => return Err(USAGE.into()),
    }

    state.db_pool.close().await;
    Ok(())
}
