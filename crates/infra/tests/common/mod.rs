#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use stratum_auth::{Effect, PermissionKey, Role, RoleAssignment, RolePermission, Snapshot};
use stratum_core::{PrincipalId, Scope, TenantId};
use stratum_infra::{
    AssignmentStore, CacheError, EngineConfig, InMemoryDirectory, InMemorySnapshotCache, PermissionEngine,
    ScopeAncestry, ScopeDirectory, SnapshotCache, SnapshotKey, StoreError, Stores, SubsidiaryNode,
};

/// Assignment store that fails reads for selected principals.
pub struct FlakyAssignments {
    inner: Arc<InMemoryDirectory>,
    failing: Mutex<HashSet<PrincipalId>>,
}

impl FlakyAssignments {
    pub fn new(inner: Arc<InMemoryDirectory>) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_for(&self, principal_id: PrincipalId) {
        self.failing.lock().unwrap().insert(principal_id);
    }
}

impl AssignmentStore for FlakyAssignments {
    fn active_assignments(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RoleAssignment>, StoreError> {
        if self.failing.lock().unwrap().contains(&principal_id) {
            return Err(StoreError::unavailable("connection reset"));
        }
        self.inner.active_assignments(tenant_id, principal_id, now)
    }

    fn principals_for_role(&self, tenant_id: TenantId, role: &Role) -> Result<Vec<PrincipalId>, StoreError> {
        self.inner.principals_for_role(tenant_id, role)
    }

    fn principals_with_assignments(
        &self,
        tenant_id: TenantId,
        now: DateTime<Utc>,
    ) -> Result<Vec<PrincipalId>, StoreError> {
        self.inner.principals_with_assignments(tenant_id, now)
    }
}

/// Scope directory that reports selected scopes as missing.
pub struct VanishingScopes {
    inner: Arc<InMemoryDirectory>,
    missing: Mutex<HashSet<Scope>>,
}

impl VanishingScopes {
    pub fn new(inner: Arc<InMemoryDirectory>) -> Self {
        Self {
            inner,
            missing: Mutex::new(HashSet::new()),
        }
    }

    pub fn hide(&self, scope: Scope) {
        self.missing.lock().unwrap().insert(scope);
    }
}

impl ScopeDirectory for VanishingScopes {
    fn scope_ancestry(&self, tenant_id: TenantId, scope: &Scope) -> Result<Option<ScopeAncestry>, StoreError> {
        if self.missing.lock().unwrap().contains(scope) {
            return Ok(None);
        }
        self.inner.scope_ancestry(tenant_id, scope)
    }

    fn subsidiaries_enclosing(&self, tenant_id: TenantId, path: &str) -> Result<Vec<SubsidiaryNode>, StoreError> {
        self.inner.subsidiaries_enclosing(tenant_id, path)
    }

    fn scopes_within(&self, tenant_id: TenantId, path: &str) -> Result<Vec<Scope>, StoreError> {
        self.inner.scopes_within(tenant_id, path)
    }
}

type Interleaving = Box<dyn FnOnce() + Send>;

/// Assignment store that runs a one-shot action right after the tenant's
/// active principal list has been read.
pub struct InterleavedAssignments {
    inner: Arc<InMemoryDirectory>,
    after_listing: Mutex<Option<Interleaving>>,
}

impl InterleavedAssignments {
    pub fn new(inner: Arc<InMemoryDirectory>) -> Self {
        Self {
            inner,
            after_listing: Mutex::new(None),
        }
    }

    pub fn after_listing(&self, action: impl FnOnce() + Send + 'static) {
        *self.after_listing.lock().unwrap() = Some(Box::new(action));
    }
}

impl AssignmentStore for InterleavedAssignments {
    fn active_assignments(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RoleAssignment>, StoreError> {
        self.inner.active_assignments(tenant_id, principal_id, now)
    }

    fn principals_for_role(&self, tenant_id: TenantId, role: &Role) -> Result<Vec<PrincipalId>, StoreError> {
        self.inner.principals_for_role(tenant_id, role)
    }

    fn principals_with_assignments(
        &self,
        tenant_id: TenantId,
        now: DateTime<Utc>,
    ) -> Result<Vec<PrincipalId>, StoreError> {
        let listed = self.inner.principals_with_assignments(tenant_id, now)?;
        let action = self.after_listing.lock().unwrap().take();
        if let Some(action) = action {
            action();
        }
        Ok(listed)
    }
}

/// Snapshot cache whose every call fails.
pub struct DownCache;

fn down<T>() -> Result<T, CacheError> {
    Err(CacheError::Unavailable("connection refused".to_string()))
}

impl SnapshotCache for DownCache {
    fn get_fields(&self, _: &SnapshotKey, _: &[PermissionKey]) -> Result<Option<Vec<Option<Effect>>>, CacheError> {
        down()
    }

    fn get(&self, _: &SnapshotKey) -> Result<Option<Snapshot>, CacheError> {
        down()
    }

    fn put(&self, _: &SnapshotKey, _: &Snapshot, _: Duration) -> Result<(), CacheError> {
        down()
    }

    fn delete(&self, _: &SnapshotKey) -> Result<bool, CacheError> {
        down()
    }

    fn suffixed_keys(&self, _: TenantId, _: PrincipalId) -> Result<Vec<SnapshotKey>, CacheError> {
        down()
    }

    fn cached_principals(&self, _: TenantId) -> Result<Vec<PrincipalId>, CacheError> {
        down()
    }
}

pub struct Harness {
    pub dir: Arc<InMemoryDirectory>,
    pub cache: Arc<InMemorySnapshotCache>,
    pub engine: PermissionEngine,
    pub tenant: TenantId,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_stores(|_, _| {})
    }

    /// Build a harness whose stores can be swapped before the engine is made.
    pub fn with_stores(customize: impl FnOnce(&Arc<InMemoryDirectory>, &mut Stores)) -> Self {
        let dir = Arc::new(InMemoryDirectory::new());
        let cache = Arc::new(InMemorySnapshotCache::new());
        let tenant = TenantId::new();
        dir.add_tenant(tenant).unwrap();

        let mut stores = Stores::from_shared(dir.clone());
        customize(&dir, &mut stores);

        let engine = PermissionEngine::new(stores, cache.clone(), EngineConfig::default());
        Self {
            dir,
            cache,
            engine,
            tenant,
        }
    }

    pub fn with_flaky_assignments() -> (Self, Arc<FlakyAssignments>) {
        let mut flaky = None;
        let h = Self::with_stores(|dir, stores| {
            let wrapper = Arc::new(FlakyAssignments::new(dir.clone()));
            stores.assignments = wrapper.clone();
            flaky = Some(wrapper);
        });
        (h, flaky.unwrap())
    }

    pub fn with_vanishing_scopes() -> (Self, Arc<VanishingScopes>) {
        let mut scopes = None;
        let h = Self::with_stores(|dir, stores| {
            let wrapper = Arc::new(VanishingScopes::new(dir.clone()));
            stores.scopes = wrapper.clone();
            scopes = Some(wrapper);
        });
        (h, scopes.unwrap())
    }

    pub fn with_interleaved_assignments() -> (Self, Arc<InterleavedAssignments>) {
        let mut assignments = None;
        let h = Self::with_stores(|dir, stores| {
            let wrapper = Arc::new(InterleavedAssignments::new(dir.clone()));
            stores.assignments = wrapper.clone();
            assignments = Some(wrapper);
        });
        (h, assignments.unwrap())
    }

    /// A second engine over the same directory and cache, standing in for
    /// another process handling hooks concurrently.
    pub fn peer_engine(&self) -> PermissionEngine {
        PermissionEngine::new(
            Stores::from_shared(self.dir.clone()),
            self.cache.clone(),
            EngineConfig::default(),
        )
    }

    pub fn role(&self, name: &'static str, permissions: Vec<RolePermission>) -> Role {
        let role = Role::new(name);
        self.dir.define_role(self.tenant, role.clone(), permissions).unwrap();
        role
    }
}
