//! Collaborator store contracts.
//!
//! The engine only reads through these traits; every write to roles, role
//! permissions and assignments happens outside the engine. Each method takes the
//! tenant as an explicit argument and implementations select the tenant's data
//! partition from it.

pub mod memory;
pub mod seed;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use stratum_auth::{Role, RoleAssignment, RolePermission};
use stratum_core::{PrincipalId, Scope, SubsidiaryId, TenantId};

pub use memory::InMemoryDirectory;
pub use seed::{DirectorySeed, SeedError};

/// Collaborator store error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("{principal_id} already holds {role} at {scope}")]
    DuplicateAssignment {
        principal_id: PrincipalId,
        role: Role,
        scope: Scope,
    },

    #[error("role {role} already declares {resource}:{action}")]
    DuplicatePermission {
        role: Role,
        resource: String,
        action: String,
    },

    #[error("unknown scope: {0}")]
    UnknownScope(Scope),

    #[error("unknown role: {0}")]
    UnknownRole(Role),
}

impl StoreError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}

/// Materialized ancestry of a subsidiary or talent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeAncestry {
    /// `/`-delimited path with a trailing slash, e.g. `/A/B/`.
    pub path: String,
    /// Parent subsidiary (for a subsidiary) or owning subsidiary (for a talent).
    pub parent_id: Option<SubsidiaryId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsidiaryNode {
    pub id: SubsidiaryId,
    pub path: String,
}

/// Scope tree lookups.
pub trait ScopeDirectory: Send + Sync {
    /// Ancestry of a subsidiary or talent; `None` when it does not exist.
    fn scope_ancestry(&self, tenant_id: TenantId, scope: &Scope) -> Result<Option<ScopeAncestry>, StoreError>;

    /// Subsidiaries whose path strictly prefixes `path`.
    fn subsidiaries_enclosing(&self, tenant_id: TenantId, path: &str) -> Result<Vec<SubsidiaryNode>, StoreError>;

    /// Subsidiaries and talents whose path is strictly prefixed by `path`.
    fn scopes_within(&self, tenant_id: TenantId, path: &str) -> Result<Vec<Scope>, StoreError>;
}

/// Role assignment reads.
pub trait AssignmentStore: Send + Sync {
    /// Assignments of `principal_id` that have not expired at `now`.
    fn active_assignments(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RoleAssignment>, StoreError>;

    /// Distinct principals holding `role` at any scope.
    fn principals_for_role(&self, tenant_id: TenantId, role: &Role) -> Result<Vec<PrincipalId>, StoreError>;

    /// Distinct principals with at least one assignment not expired at `now`.
    fn principals_with_assignments(
        &self,
        tenant_id: TenantId,
        now: DateTime<Utc>,
    ) -> Result<Vec<PrincipalId>, StoreError>;
}

/// Role permission reads.
pub trait RolePermissionStore: Send + Sync {
    /// Entries of `role`; empty when the role is inactive or unknown.
    fn active_permissions(&self, tenant_id: TenantId, role: &Role) -> Result<Vec<RolePermission>, StoreError>;
}

/// Tenant enumeration for the reconciliation sweep.
pub trait TenantDirectory: Send + Sync {
    fn tenants(&self) -> Result<Vec<TenantId>, StoreError>;
}

/// Handles to every collaborator the engine reads from.
#[derive(Clone)]
pub struct Stores {
    pub scopes: Arc<dyn ScopeDirectory>,
    pub assignments: Arc<dyn AssignmentStore>,
    pub permissions: Arc<dyn RolePermissionStore>,
    pub tenants: Arc<dyn TenantDirectory>,
}

impl Stores {
    /// Use one backend for every collaborator role.
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: ScopeDirectory + AssignmentStore + RolePermissionStore + TenantDirectory + 'static,
    {
        Self {
            scopes: store.clone(),
            assignments: store.clone(),
            permissions: store.clone(),
            tenants: store,
        }
    }
}

impl core::fmt::Debug for Stores {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}
