//! History Replicator
//!
//! Consumes committed transactions from NATS JetStream and mirrors them
//! into the history database until SIGINT/SIGTERM.
//!
//! Run with: cargo run --bin history_replicator

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tokio_util::sync::CancellationToken;

use bank_ledger::api::routes::{health_check, metrics_handler};
use bank_ledger::history::{HistoryReplicator, PgHistoryStore};
use bank_ledger::queue::JetStreamSource;
use bank_ledger::{db, shutdown, telemetry, ReplicatorConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    telemetry::init_tracing("bank_ledger=debug,history_replicator=debug");

    let config = ReplicatorConfig::from_env()?;

    tracing::info!("Connecting to history database...");
    let pool = db::connect(
        &config.history_database_url,
        config.history_max_connections,
        config.store_timeout,
    )
    .await?;

    if !db::check_schema(&pool, db::HISTORY_TABLES).await? {
        tracing::error!("History schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("History schema incomplete"));
    }

    let source = JetStreamSource::connect(&config).await?;
    let store = Arc::new(PgHistoryStore::new(pool.clone()));

    let shutdown = CancellationToken::new();

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown::shutdown_signal().await;
        signal_token.cancel();
    });

    let metrics_task = config
        .metrics_addr
        .map(|addr| tokio::spawn(serve_metrics(addr, shutdown.clone())));

    let report = HistoryReplicator::new(source, store)
        .with_persist_timeout(config.store_timeout)
        .run(shutdown.clone())
        .await;

    // The loop may also end because the stream closed
    shutdown.cancel();
    if let Some(task) = metrics_task {
        match task.await {
            Ok(Err(e)) => tracing::error!(error = %e, "Metrics listener failed"),
            Err(e) => tracing::error!(error = %e, "Metrics listener panicked"),
            Ok(Ok(())) => {}
        }
    }

    pool.close().await;
    tracing::info!(
        received = report.received,
        persisted = report.persisted,
        "History database connections closed. Goodbye!"
    );

    Ok(())
}

async fn serve_metrics(addr: SocketAddr, shutdown: CancellationToken) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler));

    tracing::info!("Metrics on http://{}/metrics", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
