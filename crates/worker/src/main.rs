//! Reconciliation worker.
//!
//! Loads the directory (from `STRATUM_DIRECTORY_SEED` when set), builds the
//! permission engine and keeps snapshots reconciled on the configured cadence.
//! With `--once`, runs a single sweep, prints its report as JSON and exits.
//! Otherwise runs until SIGINT or SIGTERM, then stops the scheduler, which
//! interrupts a running sweep at the next tenant boundary.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use signal_hook::consts::{SIGINT, SIGTERM};

use stratum_infra::{
    EngineConfig, InMemoryDirectory, InMemorySnapshotCache, PermissionEngine, SchedulerHandle, SnapshotCache, Stores,
};

/// How often the worker logs scheduler stats while idle.
const STATS_INTERVAL: Duration = Duration::from_secs(300);
/// How often the main thread checks for a shutdown signal.
const SIGNAL_POLL: Duration = Duration::from_millis(250);

fn load_directory() -> anyhow::Result<InMemoryDirectory> {
    match std::env::var("STRATUM_DIRECTORY_SEED") {
        Ok(path) => {
            let json = std::fs::read_to_string(&path).with_context(|| format!("reading directory seed {path}"))?;
            let directory =
                InMemoryDirectory::from_json(&json).with_context(|| format!("loading directory seed {path}"))?;
            tracing::info!(path = %path, "directory seed loaded");
            Ok(directory)
        }
        Err(_) => {
            tracing::warn!("STRATUM_DIRECTORY_SEED not set; starting with an empty directory");
            Ok(InMemoryDirectory::new())
        }
    }
}

fn snapshot_cache(config: &EngineConfig) -> anyhow::Result<Arc<dyn SnapshotCache>> {
    match &config.redis_url {
        #[cfg(feature = "redis")]
        Some(url) => {
            let cache = stratum_infra::RedisSnapshotCache::new(url).context("opening redis snapshot cache")?;
            tracing::info!("using redis snapshot cache");
            Ok(Arc::new(cache))
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => {
            tracing::warn!("REDIS_URL set but built without the redis feature; using in-memory snapshot cache");
            Ok(Arc::new(InMemorySnapshotCache::new()))
        }
        None => Ok(Arc::new(InMemorySnapshotCache::new())),
    }
}

fn main() -> anyhow::Result<()> {
    stratum_observability::init();

    let config = EngineConfig::from_env().context("reading engine configuration")?;
    let directory = Arc::new(load_directory()?);
    let cache = snapshot_cache(&config)?;
    let engine = PermissionEngine::new(Stores::from_shared(directory), cache, config);

    if std::env::args().skip(1).any(|arg| arg == "--once") {
        let report = engine.trigger_reconciliation(None)?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let stop = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, stop.clone()).context("registering shutdown signal")?;
    }

    let scheduler = engine.spawn_scheduler().context("spawning reconciliation scheduler")?;
    supervise(scheduler, &stop);
    Ok(())
}

/// Log scheduler stats until `stop` is raised, then shut the scheduler down.
fn supervise(scheduler: SchedulerHandle, stop: &AtomicBool) {
    let mut next_stats = Instant::now() + STATS_INTERVAL;
    while !stop.load(Ordering::Acquire) {
        thread::sleep(SIGNAL_POLL);
        if Instant::now() < next_stats {
            continue;
        }
        next_stats = Instant::now() + STATS_INTERVAL;
        let stats = scheduler.stats();
        tracing::info!(
            runs_completed = stats.runs_completed,
            runs_failed = stats.runs_failed,
            runs_skipped = stats.runs_skipped,
            uptime_secs = stats.uptime_secs,
            "scheduler stats"
        );
    }

    tracing::info!("shutdown requested; stopping scheduler");
    scheduler.shutdown();
}
