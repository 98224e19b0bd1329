//! Background scheduler running the reconciliation sweep on a fixed cadence.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use stratum_core::TenantId;

use super::{ReconcileReport, Reconciler};
use crate::error::EngineError;

#[derive(Debug)]
enum Command {
    Trigger(Option<TenantId>),
    Shutdown,
}

/// Scheduler runtime statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStats {
    pub runs_completed: u64,
    pub runs_failed: u64,
    /// Runs skipped because another sweep held the reconciler.
    pub runs_skipped: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_report: Option<ReconcileReport>,
    pub uptime_secs: u64,
}

fn lock(stats: &Mutex<SchedulerStats>) -> MutexGuard<'_, SchedulerStats> {
    stats.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to control a running scheduler.
#[derive(Debug)]
pub struct SchedulerHandle {
    commands: mpsc::SyncSender<Command>,
    stop: Arc<AtomicBool>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<SchedulerStats>>,
    started: Instant,
}

impl SchedulerHandle {
    /// Queue an on-demand sweep. Returns false when the scheduler has stopped.
    ///
    /// Triggers are coalesced: at most one request waits behind the running
    /// sweep, and a trigger arriving while one is pending is dropped.
    pub fn trigger(&self, tenant_id: Option<TenantId>) -> bool {
        match self.commands.try_send(Command::Trigger(tenant_id)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(tenant_id = ?tenant_id, "sweep already pending; trigger coalesced");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        let mut stats = lock(&self.stats).clone();
        stats.uptime_secs = self.started.elapsed().as_secs();
        stats
    }

    /// Stop the scheduler, interrupting a running sweep at the next tenant
    /// boundary, and wait for the thread to exit.
    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::Release);
        // A full queue holds a pending trigger, which wakes the loop to see the
        // stop flag.
        let _ = self.commands.try_send(Command::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

#[derive(Debug)]
pub struct ReconcileScheduler {
    reconciler: Arc<Reconciler>,
    interval: Duration,
    run_on_start: bool,
}

impl ReconcileScheduler {
    pub fn new(reconciler: Arc<Reconciler>, interval: Duration) -> Self {
        Self {
            reconciler,
            interval,
            run_on_start: false,
        }
    }

    /// Run a full sweep as soon as the thread starts.
    pub fn with_run_on_start(mut self, run_on_start: bool) -> Self {
        self.run_on_start = run_on_start;
        self
    }

    /// Spawn the scheduler in a background thread.
    pub fn spawn(self) -> io::Result<SchedulerHandle> {
        let (commands, rx) = mpsc::sync_channel::<Command>(1);
        let stop = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(Mutex::new(SchedulerStats::default()));

        let thread_stop = stop.clone();
        let thread_stats = stats.clone();
        let join = thread::Builder::new()
            .name("reconcile-scheduler".to_string())
            .spawn(move || scheduler_loop(self, rx, thread_stop, thread_stats))?;

        Ok(SchedulerHandle {
            commands,
            stop,
            join: Some(join),
            stats,
            started: Instant::now(),
        })
    }
}

fn scheduler_loop(
    scheduler: ReconcileScheduler,
    rx: mpsc::Receiver<Command>,
    stop: Arc<AtomicBool>,
    stats: Arc<Mutex<SchedulerStats>>,
) {
    info!(interval_secs = scheduler.interval.as_secs(), "reconcile scheduler started");

    if scheduler.run_on_start {
        run_once(&scheduler.reconciler, None, &stop, &stats);
    }

    let mut next_due = Instant::now() + scheduler.interval;
    loop {
        let wait = next_due.saturating_duration_since(Instant::now());
        match rx.recv_timeout(wait) {
            Ok(Command::Trigger(tenant_id)) => {
                debug!(tenant_id = ?tenant_id, "manual reconciliation requested");
                run_once(&scheduler.reconciler, tenant_id, &stop, &stats);
            }
            Err(RecvTimeoutError::Timeout) => {
                run_once(&scheduler.reconciler, None, &stop, &stats);
                next_due = Instant::now() + scheduler.interval;
            }
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
        }
        if stop.load(Ordering::Acquire) {
            break;
        }
    }

    info!("reconcile scheduler stopped");
}

fn run_once(
    reconciler: &Reconciler,
    tenant_id: Option<TenantId>,
    stop: &AtomicBool,
    stats: &Mutex<SchedulerStats>,
) {
    if stop.load(Ordering::Acquire) {
        return;
    }
    let result = reconciler.run(tenant_id, stop);

    let mut s = lock(stats);
    match result {
        Ok(report) => {
            s.runs_completed += 1;
            s.last_run_at = Some(Utc::now());
            s.last_report = Some(report);
        }
        Err(EngineError::ReconciliationInProgress) => {
            debug!("sweep already running; skipped");
            s.runs_skipped += 1;
        }
        Err(error) => {
            warn!(error = %error, "reconciliation run failed");
            s.runs_failed += 1;
            s.last_run_at = Some(Utc::now());
        }
    }
}
