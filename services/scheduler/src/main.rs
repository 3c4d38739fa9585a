//! hdfs-mesos scheduler entry point.
//!
//! Validates configuration, loads cluster state and runs the control loop.
//!
//! No master transport is linked into this binary, so nothing ever feeds the
//! event channel: no registration, offers or status updates arrive, and the
//! loop only ticks an idle reconciler until ctrl-c. It is a dry run that
//! checks configuration and storage and writes the snapshot back on exit.
//! A transport plugs in by holding the event sender and forwarding master
//! callbacks as `SchedulerEvent`s.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::info;

use hdfs_mesos_scheduler::config::{Defaults, DEFAULTS_FILE};
use hdfs_mesos_scheduler::worker::DEFAULT_TICK;
use hdfs_mesos_scheduler::{storage, telemetry};
use hdfs_mesos_scheduler::{RecordingDriver, Scheduler, SchedulerArgs, SchedulerWorker};

#[tokio::main]
async fn main() -> Result<()> {
    let defaults = Defaults::load(DEFAULTS_FILE)?;
    let config = SchedulerArgs::parse().resolve(&defaults)?;

    telemetry::init_tracing(config.debug).context("Failed to initialize tracing")?;

    info!("Starting hdfs-mesos scheduler");
    info!(
        api = %config.api,
        master = %config.master,
        storage = %config.storage,
        driver = %config.driver,
        framework_name = %config.framework_name,
        framework_role = %config.framework_role,
        framework_timeout = %config.framework_timeout,
        "Configuration loaded"
    );

    let storage = storage::open(&config.storage)
        .with_context(|| format!("Failed to open storage {}", config.storage))?;
    let scheduler = Scheduler::new(config.scheduler.clone(), RecordingDriver::new(), storage)
        .context("Failed to load scheduler state")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    // Unused sender; dropping it would end the loop at once.
    let (worker, _events) = SchedulerWorker::new(scheduler, DEFAULT_TICK, 1024);
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Received shutdown signal");

    let _ = shutdown_tx.send(true);
    let scheduler = worker_handle.await.context("Scheduler worker panicked")?;
    scheduler.persist();

    info!("Scheduler shutdown complete");
    Ok(())
}
