//! jobctl daemon - Main Entry Point
//!
//! Wires the job store, controller, signal dispatcher and HTTP gateway, then
//! serves until Ctrl+C.

mod config;
mod logging;

use anyhow::{Context, Result};
use crate::config::{DaemonConfig, StorageBackend};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use jobctl_api_http::{create_router, serve, AppState};
use jobctl_core::application::{shutdown_channel, JobController, SubmitService};
use jobctl_core::port::id_provider::UuidProvider;
use jobctl_core::port::job_store::memory::InMemoryJobStore;
use jobctl_core::port::time_provider::SystemTimeProvider;
use jobctl_core::port::{JobStore, TimeProvider};
use jobctl_infra_signal::{signal_channel, SignalDispatcher, SignalSink, TracingSink, WebhookSink};
use jobctl_infra_sqlite::{create_pool, run_migrations, SqliteJobStore};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DISPATCHER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration, then logging (the log setup itself is configurable)
    let config = DaemonConfig::load().context("Failed to load configuration")?;
    let _log_guard = logging::init_logging(&config.logging)?;

    info!("jobctl daemon v{} starting...", VERSION);

    // 2. Storage
    let store = open_store(&config).await?;

    // 3. Execution signal queue + dispatcher
    let (shutdown_tx, shutdown) = shutdown_channel();
    let (signal, signal_rx) = signal_channel(config.signal.queue_capacity);
    let dispatcher = SignalDispatcher::new(signal_rx, build_sink(&config)?, config.delivery_policy());
    let dispatcher_handle = tokio::spawn(dispatcher.run(shutdown.clone()));

    // 4. Use cases (DI wiring)
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let controller = Arc::new(JobController::new(
        store.clone(),
        Arc::new(signal),
        time_provider.clone(),
        config.controller_config(),
    ));
    let submit = Arc::new(SubmitService::new(
        store,
        Arc::new(UuidProvider),
        time_provider,
    ));

    // 5. HTTP gateway
    let router = create_router(AppState { controller, submit });
    let http_config = config.http_config();
    let mut server = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { serve(&http_config, router, shutdown).await }
    });

    info!("System ready. Press Ctrl+C to shutdown");

    // 6. Wait for Ctrl+C, or for the server to die on its own
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            info!("Shutdown signal received. Exiting gracefully...");
        }
        joined = &mut server => {
            shutdown_tx.shutdown();
            joined
                .context("HTTP server task panicked")?
                .context("HTTP server failed")?;
            anyhow::bail!("HTTP server exited unexpectedly");
        }
    }

    // 7. Graceful shutdown: stop accepting, finish in-flight requests, drain signals
    shutdown_tx.shutdown();
    server
        .await
        .context("HTTP server task panicked")?
        .context("HTTP server failed")?;
    if tokio::time::timeout(DISPATCHER_DRAIN_TIMEOUT, dispatcher_handle)
        .await
        .is_err()
    {
        warn!("Signal dispatcher did not drain in time; pending signals dropped");
    }

    info!("Shutdown complete.");
    Ok(())
}

async fn open_store(config: &DaemonConfig) -> Result<Arc<dyn JobStore>> {
    match config.storage.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory storage; job records are lost on exit");
            Ok(Arc::new(InMemoryJobStore::new()))
        }
        StorageBackend::Sqlite => {
            let db_path = config.database_path();
            if let Some(parent) = Path::new(&db_path)
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
            {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }

            info!(db_path = %db_path, "Initializing database...");
            let pool = create_pool(&db_path)
                .await
                .context("DB pool creation failed")?;
            run_migrations(&pool).await.context("Migration failed")?;
            Ok(Arc::new(SqliteJobStore::new(pool)))
        }
    }
}

fn build_sink(config: &DaemonConfig) -> Result<Arc<dyn SignalSink>> {
    match &config.signal.webhook_url {
        Some(url) => {
            info!(url = %url, "Delivering execution signals to executor webhook");
            let sink = WebhookSink::new(
                url.clone(),
                Duration::from_millis(config.signal.webhook_timeout_ms),
            )
            .context("Failed to build webhook sink")?;
            Ok(Arc::new(sink))
        }
        None => {
            info!("No executor webhook configured; execution signals are only logged");
            Ok(Arc::new(TracingSink))
        }
    }
}
