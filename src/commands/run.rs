use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::oneshot;

use newsletter::config::Config;
use newsletter::dispatch::DispatchStrategy;
use newsletter::metrics;
use newsletter::scheduler::{ContentDispatcher, PollTrigger, SchedulerStrategy};
use newsletter::server::MetricsServer;
use newsletter::storage::SqliteStore;

use super::open_store;

/// Build the dispatcher for the configured strategy
async fn build_dispatcher(config: &Config, store: &SqliteStore) -> Result<ContentDispatcher> {
    let strategy = DispatchStrategy::from_config(config, Arc::new(store.clone()))
        .await
        .context("Failed to build dispatch strategy")?;
    Ok(ContentDispatcher::new(Arc::new(store.clone()), strategy))
}

/// Wait for fan-out sends admitted by the last poll
async fn drain_sends(dispatcher: &ContentDispatcher) {
    if let DispatchStrategy::Direct { publisher, .. } = dispatcher.strategy() {
        publisher.pool().wait_idle().await;
    }
}

/// Run a single poll and exit
pub async fn poll(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let dispatcher = build_dispatcher(config, &store).await?;

    let report = dispatcher
        .check_and_dispatch()
        .await
        .context("Poll failed")?;
    drain_sends(&dispatcher).await;

    println!("Poll Complete");
    println!("=============");
    println!("Window: {} .. {}", report.window_start, report.window_end);
    println!("Found: {}", report.found);
    println!("Sent: {}", report.sent);
    println!("Failed: {}", report.failed);
    if report.skipped > 0 {
        println!("Skipped: {}", report.skipped);
    }
    if report.save_failures > 0 {
        println!("Save failures: {}", report.save_failures);
    }

    Ok(())
}

/// Run the trigger loop (and the metrics server) until Ctrl+C
pub async fn run(config: &Config) -> Result<()> {
    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics initialization failed, continuing without metrics");
    }

    let store = open_store(config)?;
    let dispatcher = Arc::new(build_dispatcher(config, &store).await?);
    let strategy =
        SchedulerStrategy::from_config(&config.scheduler).context("Invalid scheduler strategy")?;
    let trigger = Arc::new(PollTrigger::new(Arc::clone(&dispatcher), strategy));

    println!("Newsletter Scheduler");
    println!("====================");
    println!("  Dispatch: {}", dispatcher.strategy().kind().as_str());
    println!("  Schedule: {}", trigger.strategy());
    println!("  Database: {}", config.database.sqlite_path.display());

    let (server_stop, server_handle) = if config.metrics.enabled {
        let server = MetricsServer::new(&config.metrics, Some(Arc::clone(&trigger)))
            .context("Invalid metrics configuration")?;
        println!("  Metrics: http://{}/metrics", server.bind_address());

        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let shutdown = async move {
                let _ = rx.await;
            };
            if let Err(e) = server.start_with_shutdown(shutdown).await {
                tracing::error!(error = %e, "Metrics server failed");
            }
        });
        (Some(tx), Some(handle))
    } else {
        (None, None)
    };

    println!("\nPress Ctrl+C to stop.\n");

    let loop_trigger = Arc::clone(&trigger);
    let trigger_handle = tokio::spawn(async move { loop_trigger.start().await });

    match tokio::signal::ctrl_c().await {
        Ok(()) => println!("\nShutdown signal received, stopping..."),
        Err(e) => tracing::error!("Failed to wait for Ctrl+C: {}", e),
    }

    trigger.stop();
    match trigger_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Trigger loop ended with error"),
        Err(e) => tracing::error!(error = %e, "Trigger task panicked"),
    }

    trigger.wait_idle().await;
    drain_sends(&dispatcher).await;

    if let Some(tx) = server_stop {
        let _ = tx.send(());
    }
    if let Some(handle) = server_handle {
        let _ = handle.await;
    }

    println!("Scheduler stopped.");
    Ok(())
}
