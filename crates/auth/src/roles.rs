use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stratum_core::{PrincipalId, Scope};

/// Role identifier used for RBAC.
///
/// Roles are opaque strings at this layer; what a role permits is supplied by
/// the role permission store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A principal holding a role at a scope.
///
/// # Invariants
/// - At most one assignment per `(principal, role, scope)` (enforced by the store).
/// - An assignment whose `expires_at` has passed is inert.
/// - `inherit = false` limits the role to its exact scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub principal_id: PrincipalId,
    pub role: Role,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default = "default_inherit")]
    pub inherit: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_inherit() -> bool {
    true
}

impl RoleAssignment {
    /// An inheriting, non-expiring assignment.
    pub fn new(principal_id: PrincipalId, role: Role, scope: Scope) -> Self {
        Self {
            principal_id,
            role,
            scope,
            inherit: true,
            expires_at: None,
        }
    }

    pub fn with_inherit(mut self, inherit: bool) -> Self {
        self.inherit = inherit;
        self
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}
