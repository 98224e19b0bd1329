//! In-memory collaborator stores for tests/dev.

use std::collections::{BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use stratum_auth::{Role, RoleAssignment, RolePermission, is_ancestor_path};
use stratum_core::{PrincipalId, Scope, SubsidiaryId, TalentId, TenantId};

use super::{
    AssignmentStore, RolePermissionStore, ScopeAncestry, ScopeDirectory, StoreError, SubsidiaryNode,
    TenantDirectory,
};

#[derive(Debug, Clone)]
struct SubsidiaryRecord {
    parent: Option<SubsidiaryId>,
    path: String,
}

#[derive(Debug, Clone)]
struct TalentRecord {
    subsidiary: Option<SubsidiaryId>,
    path: String,
}

#[derive(Debug, Clone)]
struct RoleRecord {
    active: bool,
    permissions: Vec<RolePermission>,
}

#[derive(Debug, Default)]
struct TenantData {
    subsidiaries: HashMap<SubsidiaryId, SubsidiaryRecord>,
    talents: HashMap<TalentId, TalentRecord>,
    roles: HashMap<Role, RoleRecord>,
    assignments: Vec<RoleAssignment>,
}

impl TenantData {
    fn scope_exists(&self, scope: &Scope) -> bool {
        match scope {
            Scope::Tenant => true,
            Scope::Subsidiary(id) => self.subsidiaries.contains_key(id),
            Scope::Talent(id) => self.talents.contains_key(id),
        }
    }

    fn subsidiary_path(&self, id: SubsidiaryId) -> Result<&str, StoreError> {
        self.subsidiaries
            .get(&id)
            .map(|s| s.path.as_str())
            .ok_or(StoreError::UnknownScope(Scope::Subsidiary(id)))
    }
}

/// In-memory tenant-partitioned directory implementing every collaborator store.
///
/// The write side enforces the data-model invariants: one assignment per
/// `(principal, role, scope)`, one entry per `(role, resource, action)`, and
/// assignments only at scopes that exist.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    inner: RwLock<HashMap<TenantId, TenantData>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<TenantId, TenantData>>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::unavailable("directory lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<TenantId, TenantData>>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::unavailable("directory lock poisoned"))
    }

    /// Register a tenant with an empty scope tree.
    pub fn add_tenant(&self, tenant_id: TenantId) -> Result<(), StoreError> {
        self.write()?.entry(tenant_id).or_default();
        Ok(())
    }

    /// Create a subsidiary under `parent` (or directly under the tenant) and
    /// return its materialized path.
    pub fn add_subsidiary(
        &self,
        tenant_id: TenantId,
        id: SubsidiaryId,
        parent: Option<SubsidiaryId>,
    ) -> Result<String, StoreError> {
        let mut map = self.write()?;
        let tenant = map.entry(tenant_id).or_default();

        let base = match parent {
            Some(parent) => tenant.subsidiary_path(parent)?.to_string(),
            None => "/".to_string(),
        };
        let path = format!("{base}{id}/");

        tenant.subsidiaries.insert(
            id,
            SubsidiaryRecord {
                parent,
                path: path.clone(),
            },
        );
        Ok(path)
    }

    /// Create a talent owned by `subsidiary` (or directly by the tenant) and
    /// return its materialized path.
    pub fn add_talent(
        &self,
        tenant_id: TenantId,
        id: TalentId,
        subsidiary: Option<SubsidiaryId>,
    ) -> Result<String, StoreError> {
        let mut map = self.write()?;
        let tenant = map.entry(tenant_id).or_default();

        let base = match subsidiary {
            Some(sub) => tenant.subsidiary_path(sub)?.to_string(),
            None => "/".to_string(),
        };
        let path = format!("{base}{id}/");

        tenant.talents.insert(
            id,
            TalentRecord {
                subsidiary,
                path: path.clone(),
            },
        );
        Ok(path)
    }

    /// Create or replace a role's permission set. The role starts active.
    pub fn define_role(
        &self,
        tenant_id: TenantId,
        role: Role,
        permissions: Vec<RolePermission>,
    ) -> Result<(), StoreError> {
        let mut seen = BTreeSet::new();
        for entry in &permissions {
            if !seen.insert((entry.resource.as_str(), entry.action.as_str())) {
                return Err(StoreError::DuplicatePermission {
                    role,
                    resource: entry.resource.clone(),
                    action: entry.action.clone(),
                });
            }
        }

        let mut map = self.write()?;
        let tenant = map.entry(tenant_id).or_default();
        let active = tenant.roles.get(&role).is_none_or(|r| r.active);
        tenant.roles.insert(role, RoleRecord { active, permissions });
        Ok(())
    }

    pub fn set_role_active(&self, tenant_id: TenantId, role: &Role, active: bool) -> Result<(), StoreError> {
        let mut map = self.write()?;
        let record = map
            .get_mut(&tenant_id)
            .and_then(|t| t.roles.get_mut(role))
            .ok_or_else(|| StoreError::UnknownRole(role.clone()))?;
        record.active = active;
        Ok(())
    }

    /// Record an assignment, rejecting duplicates and unknown scopes.
    pub fn assign(&self, tenant_id: TenantId, assignment: RoleAssignment) -> Result<(), StoreError> {
        let mut map = self.write()?;
        let tenant = map.entry(tenant_id).or_default();

        if !tenant.scope_exists(&assignment.scope) {
            return Err(StoreError::UnknownScope(assignment.scope));
        }

        let duplicate = tenant.assignments.iter().any(|a| {
            a.principal_id == assignment.principal_id && a.role == assignment.role && a.scope == assignment.scope
        });
        if duplicate {
            return Err(StoreError::DuplicateAssignment {
                principal_id: assignment.principal_id,
                role: assignment.role,
                scope: assignment.scope,
            });
        }

        tenant.assignments.push(assignment);
        Ok(())
    }

    /// Remove one assignment. Returns whether it existed.
    pub fn revoke(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        role: &Role,
        scope: Scope,
    ) -> Result<bool, StoreError> {
        let mut map = self.write()?;
        let Some(tenant) = map.get_mut(&tenant_id) else {
            return Ok(false);
        };
        let before = tenant.assignments.len();
        tenant
            .assignments
            .retain(|a| !(a.principal_id == principal_id && &a.role == role && a.scope == scope));
        Ok(tenant.assignments.len() != before)
    }

    /// Remove every assignment of a principal. Returns how many were removed.
    pub fn revoke_all(&self, tenant_id: TenantId, principal_id: PrincipalId) -> Result<usize, StoreError> {
        let mut map = self.write()?;
        let Some(tenant) = map.get_mut(&tenant_id) else {
            return Ok(0);
        };
        let before = tenant.assignments.len();
        tenant.assignments.retain(|a| a.principal_id != principal_id);
        Ok(before - tenant.assignments.len())
    }
}

impl ScopeDirectory for InMemoryDirectory {
    fn scope_ancestry(&self, tenant_id: TenantId, scope: &Scope) -> Result<Option<ScopeAncestry>, StoreError> {
        let map = self.read()?;
        let Some(tenant) = map.get(&tenant_id) else {
            return Ok(None);
        };

        let ancestry = match scope {
            Scope::Tenant => Some(ScopeAncestry {
                path: "/".to_string(),
                parent_id: None,
            }),
            Scope::Subsidiary(id) => tenant.subsidiaries.get(id).map(|s| ScopeAncestry {
                path: s.path.clone(),
                parent_id: s.parent,
            }),
            Scope::Talent(id) => tenant.talents.get(id).map(|t| ScopeAncestry {
                path: t.path.clone(),
                parent_id: t.subsidiary,
            }),
        };
        Ok(ancestry)
    }

    fn subsidiaries_enclosing(&self, tenant_id: TenantId, path: &str) -> Result<Vec<SubsidiaryNode>, StoreError> {
        let map = self.read()?;
        let Some(tenant) = map.get(&tenant_id) else {
            return Ok(Vec::new());
        };

        Ok(tenant
            .subsidiaries
            .iter()
            .filter(|(_, s)| is_ancestor_path(&s.path, path))
            .map(|(id, s)| SubsidiaryNode {
                id: *id,
                path: s.path.clone(),
            })
            .collect())
    }

    fn scopes_within(&self, tenant_id: TenantId, path: &str) -> Result<Vec<Scope>, StoreError> {
        let map = self.read()?;
        let Some(tenant) = map.get(&tenant_id) else {
            return Ok(Vec::new());
        };

        let subsidiaries = tenant
            .subsidiaries
            .iter()
            .filter(|(_, s)| is_ancestor_path(path, &s.path))
            .map(|(id, _)| Scope::Subsidiary(*id));
        let talents = tenant
            .talents
            .iter()
            .filter(|(_, t)| is_ancestor_path(path, &t.path))
            .map(|(id, _)| Scope::Talent(*id));

        let mut scopes: Vec<Scope> = subsidiaries.chain(talents).collect();
        scopes.sort();
        Ok(scopes)
    }
}

impl AssignmentStore for InMemoryDirectory {
    fn active_assignments(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RoleAssignment>, StoreError> {
        let map = self.read()?;
        Ok(map
            .get(&tenant_id)
            .map(|t| {
                t.assignments
                    .iter()
                    .filter(|a| a.principal_id == principal_id && a.is_active_at(now))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn principals_for_role(&self, tenant_id: TenantId, role: &Role) -> Result<Vec<PrincipalId>, StoreError> {
        let map = self.read()?;
        let principals: BTreeSet<PrincipalId> = map
            .get(&tenant_id)
            .into_iter()
            .flat_map(|t| t.assignments.iter())
            .filter(|a| &a.role == role)
            .map(|a| a.principal_id)
            .collect();
        Ok(principals.into_iter().collect())
    }

    fn principals_with_assignments(
        &self,
        tenant_id: TenantId,
        now: DateTime<Utc>,
    ) -> Result<Vec<PrincipalId>, StoreError> {
        let map = self.read()?;
        let principals: BTreeSet<PrincipalId> = map
            .get(&tenant_id)
            .into_iter()
            .flat_map(|t| t.assignments.iter())
            .filter(|a| a.is_active_at(now))
            .map(|a| a.principal_id)
            .collect();
        Ok(principals.into_iter().collect())
    }
}

impl RolePermissionStore for InMemoryDirectory {
    fn active_permissions(&self, tenant_id: TenantId, role: &Role) -> Result<Vec<RolePermission>, StoreError> {
        let map = self.read()?;
        Ok(map
            .get(&tenant_id)
            .and_then(|t| t.roles.get(role))
            .filter(|r| r.active)
            .map(|r| r.permissions.clone())
            .unwrap_or_default())
    }
}

impl TenantDirectory for InMemoryDirectory {
    fn tenants(&self) -> Result<Vec<TenantId>, StoreError> {
        let map = self.read()?;
        let mut tenants: Vec<TenantId> = map.keys().copied().collect();
        tenants.sort();
        Ok(tenants)
    }
}
