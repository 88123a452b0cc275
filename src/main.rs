//! Event relay service.
//!
//! Main entry point. Wires configuration, logging, the database pool, the
//! sweep scheduler and the HTTP trigger API, and coordinates graceful
//! shutdown.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use relay_api::{start_server, AppState, Config};
use relay_core::{storage::Storage, Clock, RealClock};
use relay_delivery::{
    storage::{PostgresRetryStore, PostgresSubscriberDirectory},
    Relay, SweepScheduler,
};
use sqlx::postgres::PgPoolOptions;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config.rust_log);

    info!(
        database_url = %config.database_url_masked(),
        event_table = %config.event_table,
        subs_table = %config.subs_table,
        expiry_hours = config.expiry_hours,
        sweep_interval_secs = config.sweep_interval_seconds,
        "Configuration loaded"
    );

    let db_pool = create_database_pool(&config).await?;
    info!("Database connection pool established");

    let storage = Storage::new(
        db_pool.clone(),
        config.event_table_name()?,
        config.subs_table_name()?,
        config.scan_page_size,
    );
    storage.ensure_schema().await.context("Failed to create relay tables")?;
    info!("Relay tables ready");

    let clock: Arc<dyn Clock> = Arc::new(RealClock::new());
    let relay = Arc::new(Relay::new(
        &config.to_relay_config(),
        Arc::new(PostgresSubscriberDirectory::new(storage.subscribers.clone())),
        Arc::new(PostgresRetryStore::new(storage.pending_deliveries.clone())),
        clock.clone(),
    )?);

    let shutdown = CancellationToken::new();

    let scheduler = SweepScheduler::new(
        relay.clone(),
        config.sweep_interval(),
        clock.clone(),
        shutdown.clone(),
    );
    let scheduler_handle = tokio::spawn(async move { scheduler.run().await });

    let tasks = TaskTracker::new();
    let state = AppState {
        relay,
        health: Arc::new(storage),
        clock,
        request_timeout: Duration::from_secs(config.request_timeout),
        tasks: tasks.clone(),
    };
    let addr = config.parse_server_addr()?;

    if let Err(e) = start_server(state, addr, shutdown.clone()).await {
        error!(error = %e, "Server failed");
        shutdown.cancel();
    }

    tasks.close();
    tasks.wait().await;
    info!("In-flight triggers drained");

    match scheduler_handle.await {
        Ok(ticks) => info!(ticks, "Sweep scheduler stopped"),
        Err(e) => error!(error = %e, "Sweep scheduler task failed"),
    }

    db_pool.close().await;
    info!("Relay shutdown complete");
    Ok(())
}

/// Initializes tracing, preferring `RUST_LOG` over the configured filter.
fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer().with_target(true).with_file(true).with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Creates the database connection pool with retry logic.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);
    let mut retries = 0;

    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .acquire_timeout(Duration::from_secs(config.database_connection_timeout))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => return Ok(pool),
            Err(e) if retries < MAX_RETRIES => {
                retries += 1;
                info!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    error = %e,
                    "Database connection failed, retrying"
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("Failed to create database connection pool after retries");
            },
        }
    }
}
