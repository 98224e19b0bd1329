//! `PermissionEngine`: the surface exposed to guards and administrative flows.
//!
//! - `check` / `explain_check` / `effective_permissions`: cache reads only.
//! - `on_*` hooks: called synchronously after a collaborator write commits.
//! - `trigger_reconciliation` / `spawn_scheduler`: the self-healing backstop.

use std::io;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tracing::info;

use stratum_auth::{CheckExplanation, Role, Snapshot};
use stratum_core::{PrincipalId, Scope, TenantId};

use crate::check::PermissionChecker;
use crate::config::EngineConfig;
use crate::directory::Stores;
use crate::error::EngineResult;
use crate::manager::{FanOutReport, PrincipalRefresh, SnapshotManager};
use crate::reconcile::{ReconcileReport, ReconcileScheduler, Reconciler, SchedulerHandle};
use crate::snapshot_cache::SnapshotCache;

#[derive(Debug)]
pub struct PermissionEngine {
    manager: Arc<SnapshotManager>,
    checker: PermissionChecker,
    reconciler: Arc<Reconciler>,
    config: EngineConfig,
}

impl PermissionEngine {
    pub fn new(stores: Stores, cache: Arc<dyn SnapshotCache>, config: EngineConfig) -> Self {
        let manager = Arc::new(SnapshotManager::new(stores, cache.clone(), config.snapshot_ttl));
        Self {
            checker: PermissionChecker::new(cache),
            reconciler: Arc::new(Reconciler::new(manager.clone())),
            manager,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn manager(&self) -> &SnapshotManager {
        &self.manager
    }

    /// Whether `principal_id` may perform `action` on `resource` at `scope`
    /// (tenant scope when `None`). Never fails; cache trouble denies.
    pub fn check(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        resource: &str,
        action: &str,
        scope: Option<Scope>,
    ) -> bool {
        self.checker
            .check(tenant_id, principal_id, resource, action, scope.unwrap_or_default())
    }

    pub fn explain_check(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        resource: &str,
        action: &str,
        scope: Option<Scope>,
    ) -> EngineResult<CheckExplanation> {
        self.checker
            .explain(tenant_id, principal_id, resource, action, scope.unwrap_or_default())
    }

    pub fn effective_permissions(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        scope: Option<Scope>,
    ) -> EngineResult<Snapshot> {
        self.checker
            .effective_permissions(tenant_id, principal_id, scope.unwrap_or_default())
    }

    /// A principal's assignments were added, removed or edited.
    pub fn on_assignment_changed(&self, tenant_id: TenantId, principal_id: PrincipalId) -> EngineResult<PrincipalRefresh> {
        self.manager.refresh_for_principal(tenant_id, principal_id)
    }

    /// A role's permission entries were edited or the role was (de)activated.
    pub fn on_role_permissions_changed(&self, tenant_id: TenantId, role: &Role) -> EngineResult<FanOutReport> {
        self.manager.refresh_for_role(tenant_id, role)
    }

    /// A principal was deactivated or lost every role.
    pub fn on_principal_removed(&self, tenant_id: TenantId, principal_id: PrincipalId) -> EngineResult<usize> {
        self.manager.delete_all_for_principal(tenant_id, principal_id)
    }

    /// A subsidiary or talent was created, moved or removed.
    pub fn on_scope_changed(&self, tenant_id: TenantId) -> EngineResult<FanOutReport> {
        self.manager.refresh_for_tenant(tenant_id)
    }

    /// Run a sweep on the calling thread.
    pub fn trigger_reconciliation(&self, tenant_id: Option<TenantId>) -> EngineResult<ReconcileReport> {
        self.reconciler.run(tenant_id, &AtomicBool::new(false))
    }

    /// Start the periodic sweep with the configured cadence.
    pub fn spawn_scheduler(&self) -> io::Result<SchedulerHandle> {
        info!(
            interval_secs = self.config.reconcile_interval.as_secs(),
            run_on_start = self.config.reconcile_on_start,
            "starting reconciliation scheduler"
        );
        ReconcileScheduler::new(self.reconciler.clone(), self.config.reconcile_interval)
            .with_run_on_start(self.config.reconcile_on_start)
            .spawn()
    }
}
