//! Snapshot Manager: recomputes snapshots and writes them to the cache.
//!
//! A principal's snapshots occupy one slot per target:
//! - the tenant root
//! - every scope at which the principal holds an assignment
//! - every descendant of a scope where the principal holds an inheriting assignment
//! - the inherited slot, read for any other scope
//!
//! Writes replace a slot whole. An empty result leaves no entry.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use stratum_auth::{Role, RoleAssignment, RolePermission, ScopeChain, Snapshot, applicable_roles, calculate};
use stratum_core::{PrincipalId, Scope, TenantId};

use crate::directory::Stores;
use crate::error::{EngineError, EngineResult};
use crate::resolver::ScopeResolver;
use crate::snapshot_cache::{SnapshotCache, SnapshotKey, SnapshotSlot};

/// Outcome of refreshing a single principal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PrincipalRefresh {
    /// Slots written with a non-empty snapshot.
    pub slots_written: usize,
    /// Slots whose result was empty and now hold no entry.
    pub slots_empty: usize,
    /// Cached slots that were no longer targets and got removed.
    pub slots_removed: usize,
}

/// Aggregate outcome of a multi-principal refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanOutReport {
    pub refreshed: usize,
    pub failed: usize,
}

pub struct SnapshotManager {
    stores: Stores,
    resolver: ScopeResolver,
    cache: Arc<dyn SnapshotCache>,
    ttl: Duration,
}

impl SnapshotManager {
    pub fn new(stores: Stores, cache: Arc<dyn SnapshotCache>, ttl: Duration) -> Self {
        Self {
            resolver: ScopeResolver::new(stores.scopes.clone()),
            stores,
            cache,
            ttl,
        }
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn resolver(&self) -> &ScopeResolver {
        &self.resolver
    }

    pub fn cache(&self) -> &Arc<dyn SnapshotCache> {
        &self.cache
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Active permission entries for every distinct role in `roles`.
    fn load_permissions<'a>(
        &self,
        tenant_id: TenantId,
        roles: impl IntoIterator<Item = &'a Role>,
    ) -> EngineResult<HashMap<Role, Vec<RolePermission>>> {
        let mut permissions = HashMap::new();
        for role in roles {
            if permissions.contains_key(role) {
                continue;
            }
            let entries = self.stores.permissions.active_permissions(tenant_id, role)?;
            permissions.insert(role.clone(), entries);
        }
        Ok(permissions)
    }

    /// Replace the slot at `key` with `snapshot`, or clear it when empty.
    /// Returns whether an entry was written.
    fn store(&self, key: &SnapshotKey, snapshot: &Snapshot) -> EngineResult<bool> {
        if snapshot.is_empty() {
            self.cache.delete(key)?;
            debug!(key = %key, "snapshot empty, slot cleared");
            return Ok(false);
        }
        self.cache.put(key, snapshot, self.ttl)?;
        debug!(key = %key, entries = snapshot.len(), "snapshot written");
        Ok(true)
    }

    /// Recompute the snapshot at one scope and store it.
    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id, principal_id = %principal_id, scope = %scope),
        err
    )]
    pub fn recompute_and_store(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        scope: Scope,
    ) -> EngineResult<Snapshot> {
        let now = Utc::now();
        let chain = self.resolver.resolve_chain(tenant_id, &scope)?;
        let assignments = self.stores.assignments.active_assignments(tenant_id, principal_id, now)?;
        let roles = applicable_roles(&assignments, &chain, now);
        let permissions = self.load_permissions(tenant_id, &roles)?;

        let snapshot = calculate(&assignments, &chain, now, &permissions);
        self.store(&SnapshotKey::for_scope(tenant_id, principal_id, scope), &snapshot)?;
        Ok(snapshot)
    }

    /// Every scope slot the principal's assignments call for, with its chain.
    ///
    /// A scope that no longer resolves is left out and its error returned
    /// alongside the targets that did resolve.
    fn scope_targets(
        &self,
        tenant_id: TenantId,
        assignments: &[RoleAssignment],
    ) -> (BTreeMap<SnapshotSlot, ScopeChain>, Option<EngineError>) {
        let mut first_error = None;
        let mut note = |error: EngineError| {
            warn!(tenant_id = %tenant_id, error = %error, "scope skipped during refresh");
            first_error.get_or_insert(error);
        };

        let mut scopes: BTreeSet<Scope> = assignments
            .iter()
            .map(|a| a.scope)
            .filter(|s| !s.is_tenant())
            .collect();
        let inheriting: BTreeSet<Scope> = assignments
            .iter()
            .filter(|a| a.inherit && !a.scope.is_tenant())
            .map(|a| a.scope)
            .collect();
        for scope in &inheriting {
            match self.resolver.descendants(tenant_id, scope) {
                Ok(descendants) => scopes.extend(descendants),
                Err(error) => note(error),
            }
        }

        let mut targets = BTreeMap::new();
        for scope in scopes {
            match self.resolver.resolve_chain(tenant_id, &scope) {
                Ok(chain) => {
                    targets.insert(SnapshotSlot::Scope(scope), chain);
                }
                Err(error) => note(error),
            }
        }
        (targets, first_error)
    }

    /// Recompute every slot of a principal and drop slots that are no longer
    /// targets.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, principal_id = %principal_id), err)]
    pub fn refresh_for_principal(&self, tenant_id: TenantId, principal_id: PrincipalId) -> EngineResult<PrincipalRefresh> {
        self.refresh_at(tenant_id, principal_id, Utc::now())
    }

    fn refresh_at(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        now: DateTime<Utc>,
    ) -> EngineResult<PrincipalRefresh> {
        let assignments = self.stores.assignments.active_assignments(tenant_id, principal_id, now)?;
        let permissions = self.load_permissions(tenant_id, assignments.iter().map(|a| &a.role))?;

        // The tenant root and inherited slots do not depend on the scope tree
        // and are written even when a scope fails to resolve.
        let mut targets = BTreeMap::new();
        targets.insert(SnapshotSlot::TenantRoot, ScopeChain::tenant());
        targets.insert(SnapshotSlot::Inherited, ScopeChain::inherited());
        let (scoped, unresolved) = self.scope_targets(tenant_id, &assignments);
        targets.extend(scoped);

        let mut outcome = PrincipalRefresh::default();
        for (slot, chain) in &targets {
            let snapshot = calculate(&assignments, chain, now, &permissions);
            let key = SnapshotKey::new(tenant_id, principal_id, *slot);
            if self.store(&key, &snapshot)? {
                outcome.slots_written += 1;
            } else {
                outcome.slots_empty += 1;
            }
        }

        for key in self.cache.suffixed_keys(tenant_id, principal_id)? {
            if !targets.contains_key(&key.slot) && self.cache.delete(&key)? {
                debug!(key = %key, "stale slot removed");
                outcome.slots_removed += 1;
            }
        }

        if let Some(error) = unresolved {
            return Err(error);
        }

        debug!(
            slots_written = outcome.slots_written,
            slots_empty = outcome.slots_empty,
            slots_removed = outcome.slots_removed,
            "principal refreshed"
        );
        Ok(outcome)
    }

    /// Refresh each principal, logging and counting failures instead of
    /// aborting.
    pub fn refresh_principals(&self, tenant_id: TenantId, principals: &[PrincipalId]) -> FanOutReport {
        let mut report = FanOutReport::default();
        for &principal_id in principals {
            match self.refresh_for_principal(tenant_id, principal_id) {
                Ok(_) => report.refreshed += 1,
                Err(error) => {
                    warn!(
                        tenant_id = %tenant_id,
                        principal_id = %principal_id,
                        error = %error,
                        "principal refresh failed; left for reconciliation"
                    );
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Refresh every principal holding `role` anywhere in the tenant.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, role = %role), err)]
    pub fn refresh_for_role(&self, tenant_id: TenantId, role: &Role) -> EngineResult<FanOutReport> {
        let principals = self.stores.assignments.principals_for_role(tenant_id, role)?;
        let report = self.refresh_principals(tenant_id, &principals);
        info!(refreshed = report.refreshed, failed = report.failed, "role fan-out complete");
        Ok(report)
    }

    /// Refresh every principal with an active assignment in the tenant.
    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    pub fn refresh_for_tenant(&self, tenant_id: TenantId) -> EngineResult<FanOutReport> {
        let principals = self.stores.assignments.principals_with_assignments(tenant_id, Utc::now())?;
        let report = self.refresh_principals(tenant_id, &principals);
        info!(refreshed = report.refreshed, failed = report.failed, "tenant fan-out complete");
        Ok(report)
    }

    /// Delete every slot of a principal, including the bare tenant-root key.
    /// Returns how many entries existed.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, principal_id = %principal_id), err)]
    pub fn delete_all_for_principal(&self, tenant_id: TenantId, principal_id: PrincipalId) -> EngineResult<usize> {
        let mut removed = 0;
        for key in self.cache.suffixed_keys(tenant_id, principal_id)? {
            if self.cache.delete(&key)? {
                removed += 1;
            }
        }
        if self.cache.delete(&SnapshotKey::tenant_root(tenant_id, principal_id))? {
            removed += 1;
        }
        debug!(removed, "principal snapshots deleted");
        Ok(removed)
    }
}

impl core::fmt::Debug for SnapshotManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SnapshotManager")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
