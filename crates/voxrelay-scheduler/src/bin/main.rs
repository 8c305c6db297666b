//! Composition root for the scheduler process: connect to the shared
//! reminder/event tables, install the graceful-shutdown signal handlers,
//! then run the poll loop until asked to stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use voxrelay_scheduler::config::SchedulerConfig;
use voxrelay_scheduler::db;
use voxrelay_scheduler::scheduler::SchedulerService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = SchedulerConfig::from_env()?;
    tracing::info!("starting voxrelay scheduler");

    let pool = db::connect(&config.database_url).await?;
    let shutdown = Arc::new(AtomicBool::new(false));

    spawn_shutdown_listener(shutdown.clone());

    let service = SchedulerService::new(config, pool, shutdown);
    service.run().await;

    Ok(())
}

/// Flips the shutdown flag on SIGINT/SIGTERM; the current poll iteration
/// finishes before `run()` observes the flag and exits.
fn spawn_shutdown_listener(shutdown: Arc<AtomicBool>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        tracing::warn!("shutdown signal received, finishing current poll iteration");
        shutdown.store(true, Ordering::SeqCst);
    });
}
