//! bank_ledger - Account Ledger API
//!
//! Serves account creation, lookup and debit/credit requests against the
//! ledger database, publishing every committed transaction to NATS.

use std::net::SocketAddr;
use std::sync::Arc;

use bank_ledger::api::{self, AppState};
use bank_ledger::handlers::{AccountHandler, BalanceMutator};
use bank_ledger::queue::{EventPublisher, JetStreamPublisher};
use bank_ledger::store::{LedgerStore, PgLedgerStore};
use bank_ledger::{db, shutdown, telemetry, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    telemetry::init_tracing("bank_ledger=debug,tower_http=debug");

    let config = Config::from_env()?;
    let addr: SocketAddr = config.listen_addr().parse()?;

    tracing::info!(environment = %config.environment, "Starting bank_ledger server");
    tracing::info!("Connecting to database...");

    let pool = db::connect(
        &config.database_url,
        config.database_max_connections,
        config.store_timeout,
    )
    .await?;

    if !db::check_schema(&pool, db::LEDGER_TABLES).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }
    tracing::info!("Database connected successfully");

    let publisher: Arc<dyn EventPublisher> =
        Arc::new(JetStreamPublisher::connect(&config.queue).await?);
    let store: Arc<dyn LedgerStore> =
        Arc::new(PgLedgerStore::new(pool.clone(), config.store_timeout));

    let state = AppState {
        mutator: Arc::new(BalanceMutator::new(
            store.clone(),
            publisher.clone(),
            config.store_timeout,
        )),
        accounts: Arc::new(AccountHandler::new(store, publisher, config.store_timeout)),
    };
    let app = api::build_router(state);

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::shutdown_signal())
        .await?;

    // Cleanup
    tracing::info!("Server shutting down...");
    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}
