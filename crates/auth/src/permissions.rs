use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Action that implies every action on its resource.
pub const ADMIN_ACTION: &str = "admin";

/// Resource that, paired with [`ADMIN_ACTION`], implies everything.
pub const WILDCARD_RESOURCE: &str = "*";

/// Effect of a permission entry.
///
/// The third state ("unset") is never represented: an unmentioned key is simply
/// absent from a snapshot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Grant,
    Deny,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Grant => "grant",
            Effect::Deny => "deny",
        }
    }

    pub fn is_grant(&self) -> bool {
        matches!(self, Effect::Grant)
    }
}

impl core::fmt::Display for Effect {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown effect '{0}'")]
pub struct ParseEffectError(String);

impl FromStr for Effect {
    type Err = ParseEffectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grant" => Ok(Effect::Grant),
            "deny" => Ok(Effect::Deny),
            other => Err(ParseEffectError(other.to_string())),
        }
    }
}

/// Permission key: `resource:action`.
///
/// Resources and actions are opaque strings. `resource:admin` and `*:admin` are
/// ordinary keys; they are consulted as fallbacks at check time and never
/// expanded when a snapshot is written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionKey(String);

impl PermissionKey {
    pub fn new(resource: &str, action: &str) -> Self {
        Self(format!("{resource}:{action}"))
    }

    pub fn resource_admin(resource: &str) -> Self {
        Self::new(resource, ADMIN_ACTION)
    }

    pub fn global_admin() -> Self {
        Self::new(WILDCARD_RESOURCE, ADMIN_ACTION)
    }

    /// Wrap an already-joined key (e.g. a hash field read back from the cache).
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of a role's permission set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RolePermission {
    pub resource: String,
    pub action: String,
    pub effect: Effect,
}

impl RolePermission {
    pub fn new(resource: impl Into<String>, action: impl Into<String>, effect: Effect) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
            effect,
        }
    }

    pub fn grant(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self::new(resource, action, Effect::Grant)
    }

    pub fn deny(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self::new(resource, action, Effect::Deny)
    }

    pub fn key(&self) -> PermissionKey {
        PermissionKey::new(&self.resource, &self.action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_keys_are_plain_keys() {
        assert_eq!(PermissionKey::resource_admin("customer.profile").as_str(), "customer.profile:admin");
        assert_eq!(PermissionKey::global_admin().as_str(), "*:admin");
    }

    #[test]
    fn effect_uses_lowercase_wire_names() {
        assert_eq!(serde_json::to_string(&Effect::Deny).unwrap(), r#""deny""#);
        assert_eq!("grant".parse::<Effect>().unwrap(), Effect::Grant);
        assert!("allow".parse::<Effect>().is_err());
    }
}
