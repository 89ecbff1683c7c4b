//! Database module
//!
//! Pool construction and schema verification. Schemas live as raw SQL
//! files in migrations/.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Tables the API server needs in the ledger database
pub const LEDGER_TABLES: &[&str] = &["accounts", "transactions"];

/// Tables the replicator needs in the history database
pub const HISTORY_TABLES: &[&str] = &["transaction_history"];

/// Open a pool; `acquire_timeout` bounds both connect and checkout
pub async fn connect(
    url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(url)
        .await
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool, required_tables: &[&str]) -> Result<bool, sqlx::Error> {
    for table in required_tables {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(*table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    Ok(true)
}
