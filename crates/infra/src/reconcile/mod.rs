//! Reconciliation: the full sweep that repairs any snapshot the invalidation
//! hooks missed.
//!
//! For every tenant, every principal with an active assignment is refreshed and
//! every cached principal still without one when the purge runs is removed. Failures are counted and
//! logged, never fatal. The sweep checks its stop flag between tenants.

pub mod scheduler;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use stratum_core::{PrincipalId, TenantId};

use crate::error::{EngineError, EngineResult};
use crate::manager::SnapshotManager;

pub use scheduler::{ReconcileScheduler, SchedulerHandle, SchedulerStats};

/// Aggregate outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub tenants_processed: usize,
    pub tenants_failed: usize,
    pub principals_refreshed: usize,
    pub principals_failed: usize,
    /// Cached principals whose snapshots were removed because they no longer
    /// hold any active assignment.
    pub principals_purged: usize,
    /// Stopped before every tenant was visited.
    pub interrupted: bool,
    pub duration_ms: u64,
}

#[derive(Debug, Default)]
struct TenantOutcome {
    refreshed: usize,
    failed: usize,
    purged: usize,
}

/// Clears the running flag when a sweep ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
pub struct Reconciler {
    manager: Arc<SnapshotManager>,
    running: AtomicBool,
}

impl Reconciler {
    pub fn new(manager: Arc<SnapshotManager>) -> Self {
        Self {
            manager,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Sweep one tenant (`Some`) or every tenant (`None`).
    ///
    /// Returns [`EngineError::ReconciliationInProgress`] when another sweep is
    /// running, and a store error only when the tenant list itself cannot be
    /// read.
    #[instrument(skip(self, stop), fields(tenant_filter = ?tenant_filter), err)]
    pub fn run(&self, tenant_filter: Option<TenantId>, stop: &AtomicBool) -> EngineResult<ReconcileReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EngineError::ReconciliationInProgress);
        }
        let _guard = RunningGuard(&self.running);
        let started = Instant::now();

        let tenants = match tenant_filter {
            Some(tenant_id) => vec![tenant_id],
            None => self.manager.stores().tenants.tenants()?,
        };

        let mut report = ReconcileReport::default();
        for tenant_id in tenants {
            if stop.load(Ordering::Acquire) {
                report.interrupted = true;
                break;
            }
            match self.reconcile_tenant(tenant_id) {
                Ok(outcome) => {
                    report.tenants_processed += 1;
                    report.principals_refreshed += outcome.refreshed;
                    report.principals_failed += outcome.failed;
                    report.principals_purged += outcome.purged;
                }
                Err(error) => {
                    warn!(tenant_id = %tenant_id, error = %error, "tenant reconciliation failed");
                    report.tenants_failed += 1;
                }
            }
        }

        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            tenants_processed = report.tenants_processed,
            tenants_failed = report.tenants_failed,
            principals_refreshed = report.principals_refreshed,
            principals_failed = report.principals_failed,
            principals_purged = report.principals_purged,
            interrupted = report.interrupted,
            duration_ms = report.duration_ms,
            "reconciliation finished"
        );
        Ok(report)
    }

    fn reconcile_tenant(&self, tenant_id: TenantId) -> EngineResult<TenantOutcome> {
        let active = self
            .manager
            .stores()
            .assignments
            .principals_with_assignments(tenant_id, Utc::now())?;
        let fan_out = self.manager.refresh_principals(tenant_id, &active);

        let mut outcome = TenantOutcome {
            refreshed: fan_out.refreshed,
            failed: fan_out.failed,
            purged: 0,
        };

        let active: BTreeSet<PrincipalId> = active.into_iter().collect();
        let cached = match self.manager.cache().cached_principals(tenant_id) {
            Ok(cached) => cached,
            Err(error) => {
                warn!(tenant_id = %tenant_id, error = %error, "orphan scan failed; skipping purge");
                return Ok(outcome);
            }
        };
        for principal_id in cached.into_iter().filter(|p| !active.contains(p)) {
            if !self.still_orphaned(tenant_id, principal_id) {
                continue;
            }
            match self.manager.delete_all_for_principal(tenant_id, principal_id) {
                Ok(_) => outcome.purged += 1,
                Err(error) => {
                    warn!(
                        tenant_id = %tenant_id,
                        principal_id = %principal_id,
                        error = %error,
                        "orphan purge failed"
                    );
                }
            }
        }
        Ok(outcome)
    }

    /// Re-read a purge candidate's assignments; a principal assigned after the
    /// active list was taken is kept.
    fn still_orphaned(&self, tenant_id: TenantId, principal_id: PrincipalId) -> bool {
        match self
            .manager
            .stores()
            .assignments
            .active_assignments(tenant_id, principal_id, Utc::now())
        {
            Ok(assignments) if assignments.is_empty() => true,
            Ok(_) => {
                debug!(tenant_id = %tenant_id, principal_id = %principal_id, "assigned since listing; purge skipped");
                false
            }
            Err(error) => {
                warn!(
                    tenant_id = %tenant_id,
                    principal_id = %principal_id,
                    error = %error,
                    "orphan recheck failed; purge skipped"
                );
                false
            }
        }
    }
}
