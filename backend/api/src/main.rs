//! AnnSetu API: entry point.
//!
//! Serves the donation lifecycle over a small Axum REST API backed by
//! SQLite, and optionally runs a background sweeper that cancels donations
//! whose expiry has passed.

mod api;
mod config;
mod db;
mod errors;
mod events;
mod sweeper;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use annsetu_core::DonationService;
use config::Config;
use db::{SqliteEventSink, SqliteStorage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url, config.max_connections).await?;

    let service = DonationService::new(Arc::new(SqliteStorage::new(pool.clone())))
        .with_event_sink(Arc::new(SqliteEventSink::new(pool.clone())));

    let shutdown = CancellationToken::new();

    // ─── Background expiry sweep ──────────────────────────
    let sweeper = (config.expiry_sweep_secs > 0).then(|| {
        tokio::spawn(sweeper::run(
            service.clone(),
            Duration::from_secs(config.expiry_sweep_secs),
            shutdown.clone(),
        ))
    });

    // ─── REST API ─────────────────────────────────────────
    let app = api::router(Arc::new(api::ApiState { service, pool }));

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Some(handle) = sweeper {
        handle.await?;
    }

    Ok(())
}
