//! Shared application state.

use std::sync::Arc;

use keel_customer::application::command_handlers::CustomerPipeline;
use keel_customer::domain::events::CustomerEvent;
use keel_event_store::PgEventStore;
use sqlx::PgPool;

/// Customer pipeline backed by `PostgreSQL`.
pub type PgCustomerPipeline = CustomerPipeline<PgEventStore<CustomerEvent>>;

/// Everything a command needs once start-up has finished.
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL connection pool.
    pub db_pool: PgPool,
    /// Executes Customer commands.
    pub customers: Arc<PgCustomerPipeline>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(db_pool: PgPool, customers: PgCustomerPipeline) -> Self {
        Self {
            db_pool,
            customers: Arc::new(customers),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("db_pool", &self.db_pool)
            .field("customers", &self.customers.config())
            .finish()
    }
}
