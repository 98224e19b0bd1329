//! JSON seed for the in-memory directory (dev/worker bootstrap).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stratum_auth::{Role, RoleAssignment, RolePermission};
use stratum_core::{SubsidiaryId, TalentId, TenantId};

use super::{InMemoryDirectory, StoreError};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("invalid seed document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("seed rejected by directory: {0}")]
    Store(#[from] StoreError),
}

/// Whole-directory seed. Subsidiaries must be listed parents first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub tenants: Vec<TenantSeed>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantSeed {
    pub id: TenantId,
    #[serde(default)]
    pub subsidiaries: Vec<SubsidiarySeed>,
    #[serde(default)]
    pub talents: Vec<TalentSeed>,
    #[serde(default)]
    pub roles: Vec<RoleSeed>,
    #[serde(default)]
    pub assignments: Vec<RoleAssignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsidiarySeed {
    pub id: SubsidiaryId,
    #[serde(default)]
    pub parent: Option<SubsidiaryId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TalentSeed {
    pub id: TalentId,
    #[serde(default)]
    pub subsidiary: Option<SubsidiaryId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleSeed {
    pub name: Role,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub permissions: Vec<RolePermission>,
}

fn default_active() -> bool {
    true
}

impl InMemoryDirectory {
    /// Build a directory from a seed, applying the same invariants as the
    /// write methods.
    pub fn from_seed(seed: &DirectorySeed) -> Result<Self, StoreError> {
        let dir = Self::new();

        for tenant in &seed.tenants {
            dir.add_tenant(tenant.id)?;
            for sub in &tenant.subsidiaries {
                dir.add_subsidiary(tenant.id, sub.id, sub.parent)?;
            }
            for talent in &tenant.talents {
                dir.add_talent(tenant.id, talent.id, talent.subsidiary)?;
            }
            for role in &tenant.roles {
                dir.define_role(tenant.id, role.name.clone(), role.permissions.clone())?;
                if !role.active {
                    dir.set_role_active(tenant.id, &role.name, false)?;
                }
            }
            for assignment in &tenant.assignments {
                dir.assign(tenant.id, assignment.clone())?;
            }
        }

        Ok(dir)
    }

    pub fn from_json(json: &str) -> Result<Self, SeedError> {
        let seed: DirectorySeed = serde_json::from_str(json)?;
        Ok(Self::from_seed(&seed)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stratum_core::{PrincipalId, Scope};

    use crate::directory::{AssignmentStore, RolePermissionStore, ScopeDirectory};

    #[test]
    fn seed_document_populates_directory() {
        let tenant = TenantId::new();
        let sub = SubsidiaryId::new();
        let talent = TalentId::new();
        let principal = PrincipalId::new();

        let json = serde_json::json!({
            "tenants": [{
                "id": tenant,
                "subsidiaries": [{ "id": sub }],
                "talents": [{ "id": talent, "subsidiary": sub }],
                "roles": [
                    { "name": "viewer", "permissions": [
                        { "resource": "customer.profile", "action": "read", "effect": "grant" }
                    ]},
                    { "name": "retired", "active": false }
                ],
                "assignments": [
                    { "principal_id": principal, "role": "viewer", "scope": { "type": "subsidiary", "id": sub } }
                ]
            }]
        })
        .to_string();

        let dir = InMemoryDirectory::from_json(&json).unwrap();

        let assignments = dir.active_assignments(tenant, principal, Utc::now()).unwrap();
        assert_eq!(assignments.len(), 1);
        assert!(assignments[0].inherit);
        assert_eq!(assignments[0].scope, Scope::Subsidiary(sub));
        assert_eq!(dir.active_permissions(tenant, &Role::new("viewer")).unwrap().len(), 1);
        assert!(
            dir.scope_ancestry(tenant, &Scope::Talent(talent))
                .unwrap()
                .is_some_and(|a| a.parent_id == Some(sub))
        );
    }

    #[test]
    fn children_before_parents_are_rejected() {
        let parent = SubsidiaryId::new();
        let seed = DirectorySeed {
            tenants: vec![TenantSeed {
                id: TenantId::new(),
                subsidiaries: vec![
                    SubsidiarySeed {
                        id: SubsidiaryId::new(),
                        parent: Some(parent),
                    },
                    SubsidiarySeed { id: parent, parent: None },
                ],
                talents: vec![],
                roles: vec![],
                assignments: vec![],
            }],
        };

        assert!(matches!(InMemoryDirectory::from_seed(&seed), Err(StoreError::UnknownScope(_))));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(InMemoryDirectory::from_json("{"), Err(SeedError::Parse(_))));
    }
}
