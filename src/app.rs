//! Agent assembly: readiness gate, adapter wiring, and the three poll cycles.
//!
//! The cycles run concurrently inside one process and are joined only at
//! shutdown. They share nothing mutable beyond the artifact cache (safe via
//! atomic renames) and the configuration snapshot (read-only after load).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;

use crate::application::services::poller::{self, CycleSettings};
use crate::infra::authority::HttpAuthority;
use crate::infra::cache::ArtifactCache;
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::config::{agent_dir, ConfigStore};
use crate::infra::fetcher::SourceDownloader;
use crate::infra::health::HealthProber;
use crate::infra::inspector::OsSystemInspector;
use crate::infra::privileges::OsPrivilegeProbe;
use crate::infra::reporter::TracingReporter;

/// Cadence of the readiness gate before a parseable config appears.
const READINESS_POLL: Duration = Duration::from_secs(5);

/// Run the agent until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if local setup (cache layout, HTTP clients) fails.
/// Task-level failures never propagate here; the poll cycles absorb them.
pub async fn run(config_override: Option<PathBuf>) -> Result<()> {
    let store = match config_override {
        Some(path) => ConfigStore::with_path(path),
        None => ConfigStore::new()?,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received; shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    let Some(config) = store
        .wait_until_registered(shutdown_rx.clone(), READINESS_POLL)
        .await
    else {
        return Ok(());
    };
    tracing::info!(
        node_id = %config.node_id,
        authority = %config.authority_url,
        "agent configured; starting poll cycles"
    );

    let cache_dir = match &config.cache.dir {
        Some(dir) => dir.clone(),
        None => agent_dir()?.join("cache"),
    };
    let service_dir = match &config.service_config_dir {
        Some(dir) => dir.clone(),
        None => agent_dir()?.join("services"),
    };

    let runner = TokioCommandRunner::default();
    let authority = HttpAuthority::new(&config).context("constructing authority client")?;
    let cache = ArtifactCache::open(cache_dir, config.cache.max_bytes)
        .context("opening artifact cache")?;
    let reporter = TracingReporter::default();
    let fetcher = SourceDownloader::new(reporter.clone(), shutdown_rx.clone())
        .context("constructing source downloader")?;
    let inspector = OsSystemInspector::new(runner);
    let privileges = OsPrivilegeProbe::new(runner);
    let health = HealthProber::new(runner).context("constructing health prober")?;
    let writer = crate::infra::config::LocalServiceConfigWriter::new(service_dir);

    let default_timeout = Duration::from_secs(config.command_timeout_secs);
    let max_backoff = Duration::from_secs(config.poll.max_backoff_secs);
    let drift_check_every = config.poll.drift_check_every;

    // Shadow the adapters as shared references so the cycle closures can be
    // `move` while the returned futures borrow the adapters themselves.
    let authority = &authority;
    let runner = &runner;
    let privileges = &privileges;
    let inspector = &inspector;
    let cache = &cache;
    let fetcher = &fetcher;
    let health = &health;
    let writer = &writer;
    let reporter = &reporter;
    let item_shutdown_rx = shutdown_rx.clone();
    let item_shutdown = &item_shutdown_rx;

    let jobs_cycle = poller::run_cycle(
        CycleSettings {
            name: "jobs",
            interval: Duration::from_secs(config.poll.jobs_interval_secs),
            max_backoff,
        },
        shutdown_rx.clone(),
        move |_tick| {
            poller::jobs_tick(
                authority,
                runner,
                privileges,
                reporter,
                item_shutdown,
                default_timeout,
            )
        },
    );

    let deployments_cycle = poller::run_cycle(
        CycleSettings {
            name: "deployments",
            interval: Duration::from_secs(config.poll.deployments_interval_secs),
            max_backoff,
        },
        shutdown_rx.clone(),
        move |_tick| {
            poller::deployments_tick(
                authority,
                inspector,
                cache,
                fetcher,
                runner,
                privileges,
                reporter,
                item_shutdown,
                default_timeout,
            )
        },
    );

    let assignments_cycle = poller::run_cycle(
        CycleSettings {
            name: "assignments",
            interval: Duration::from_secs(config.poll.assignments_interval_secs),
            max_backoff,
        },
        shutdown_rx.clone(),
        move |tick| {
            poller::assignments_tick(
                authority,
                inspector,
                cache,
                fetcher,
                runner,
                privileges,
                health,
                writer,
                reporter,
                item_shutdown,
                default_timeout,
                tick,
                drift_check_every,
            )
        },
    );

    tokio::join!(jobs_cycle, deployments_cycle, assignments_cycle);
    tracing::info!("all poll cycles stopped");
    Ok(())
}
