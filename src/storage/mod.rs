//! Database access for the fanout tables

pub mod models;
pub mod postgres;
pub mod store;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::core::config;
use crate::core::error::AppResult;

// Re-exports for convenience
pub use models::{Guide, NotificationKey, Request, RequestStatus, Response, ResponseStatus, SenderRole, ThreadMessage};
pub use postgres::PgStore;
pub use store::Store;

/// Create a new Postgres connection pool
///
/// # Arguments
///
/// * `database_url` - Postgres connection string
///
/// # Example
///
/// ```no_run
/// # async fn example() -> guidebot::core::AppResult<()> {
/// let pool = guidebot::storage::create_pool("postgres://localhost/guides").await?;
/// # Ok(())
/// # }
/// ```
pub async fn create_pool(database_url: &str) -> AppResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(*config::database::MAX_CONNECTIONS)
        .acquire_timeout(config::database::acquire_timeout())
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Apply the bundled migrations (tables, ledger, NOTIFY trigger)
pub async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
