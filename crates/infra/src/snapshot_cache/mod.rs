//! Snapshot Cache: hash-per-key storage of materialized snapshots.
//!
//! ## Key format
//!
//! - `perm:{tenant}:{principal}`: tenant-root snapshot
//! - `perm:{tenant}:{principal}:{scopeType}:{scopeId}`: snapshot at a subsidiary or talent
//! - `perm:{tenant}:{principal}:inherited`: snapshot for any descendant scope that
//!   receives only tenant-level inheritance
//!
//! The tenant is always the first segment after the prefix, so tenants never
//! collide. Each hash field is a permission key and each value is `grant` or `deny`.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

use core::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use stratum_auth::{Effect, PermissionKey, Snapshot};
use stratum_core::{PrincipalId, Scope, TenantId};

pub use memory::InMemorySnapshotCache;
#[cfg(feature = "redis")]
pub use self::redis::RedisSnapshotCache;

pub const KEY_PREFIX: &str = "perm";
const INHERITED_SEGMENT: &str = "inherited";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("malformed cache entry '{key}': {reason}")]
    Malformed { key: String, reason: String },
}

/// Which snapshot of a principal a key addresses.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SnapshotSlot {
    TenantRoot,
    /// A subsidiary or talent (never [`Scope::Tenant`]).
    Scope(Scope),
    Inherited,
}

impl SnapshotSlot {
    pub fn for_scope(scope: Scope) -> Self {
        match scope {
            Scope::Tenant => SnapshotSlot::TenantRoot,
            other => SnapshotSlot::Scope(other),
        }
    }
}

/// Fully-qualified cache key of one snapshot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotKey {
    pub tenant_id: TenantId,
    pub principal_id: PrincipalId,
    pub slot: SnapshotSlot,
}

impl SnapshotKey {
    pub fn new(tenant_id: TenantId, principal_id: PrincipalId, slot: SnapshotSlot) -> Self {
        Self {
            tenant_id,
            principal_id,
            slot,
        }
    }

    pub fn for_scope(tenant_id: TenantId, principal_id: PrincipalId, scope: Scope) -> Self {
        Self::new(tenant_id, principal_id, SnapshotSlot::for_scope(scope))
    }

    pub fn tenant_root(tenant_id: TenantId, principal_id: PrincipalId) -> Self {
        Self::new(tenant_id, principal_id, SnapshotSlot::TenantRoot)
    }

    pub fn inherited(tenant_id: TenantId, principal_id: PrincipalId) -> Self {
        Self::new(tenant_id, principal_id, SnapshotSlot::Inherited)
    }

    /// Glob matching every suffixed key of a principal (not the bare root key).
    pub fn principal_pattern(tenant_id: TenantId, principal_id: PrincipalId) -> String {
        format!("{KEY_PREFIX}:{tenant_id}:{principal_id}:*")
    }

    /// Glob matching every key of a tenant.
    pub fn tenant_pattern(tenant_id: TenantId) -> String {
        format!("{KEY_PREFIX}:{tenant_id}:*")
    }
}

impl core::fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{KEY_PREFIX}:{}:{}", self.tenant_id, self.principal_id)?;
        match &self.slot {
            SnapshotSlot::TenantRoot => Ok(()),
            SnapshotSlot::Inherited => write!(f, ":{INHERITED_SEGMENT}"),
            SnapshotSlot::Scope(scope) => match scope.id_string() {
                Some(id) => write!(f, ":{}:{id}", scope.kind()),
                None => Ok(()),
            },
        }
    }
}

impl FromStr for SnapshotKey {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| CacheError::Malformed {
            key: s.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = s.split(':').collect();
        if parts.first() != Some(&KEY_PREFIX) || parts.len() < 3 {
            return Err(malformed("not a snapshot key"));
        }

        let tenant_id: TenantId = parts[1].parse().map_err(|_| malformed("bad tenant id"))?;
        let principal_id: PrincipalId = parts[2].parse().map_err(|_| malformed("bad principal id"))?;

        let slot = match &parts[3..] {
            [] => SnapshotSlot::TenantRoot,
            [segment] if *segment == INHERITED_SEGMENT => SnapshotSlot::Inherited,
            [kind, id] if *kind != "tenant" => {
                let scope = Scope::from_parts(Some(*kind), Some(*id)).map_err(|e| malformed(&e.to_string()))?;
                SnapshotSlot::Scope(scope)
            }
            _ => return Err(malformed("unexpected suffix")),
        };

        Ok(Self::new(tenant_id, principal_id, slot))
    }
}

/// Snapshot storage backend.
///
/// Reads on the check path must be a constant number of round trips.
pub trait SnapshotCache: Send + Sync {
    /// Read `fields` of `key` in one round trip, in order. `None` when the key
    /// does not exist.
    fn get_fields(&self, key: &SnapshotKey, fields: &[PermissionKey]) -> Result<Option<Vec<Option<Effect>>>, CacheError>;

    /// Read a whole snapshot. `None` when the key does not exist.
    fn get(&self, key: &SnapshotKey) -> Result<Option<Snapshot>, CacheError>;

    /// Write a snapshot with an expiry. Callers never pass an empty snapshot.
    fn put(&self, key: &SnapshotKey, snapshot: &Snapshot, ttl: Duration) -> Result<(), CacheError>;

    /// Delete one key. Returns whether it existed.
    fn delete(&self, key: &SnapshotKey) -> Result<bool, CacheError>;

    /// Keys matching [`SnapshotKey::principal_pattern`] (every slot except the
    /// bare tenant-root key).
    fn suffixed_keys(&self, tenant_id: TenantId, principal_id: PrincipalId) -> Result<Vec<SnapshotKey>, CacheError>;

    /// Distinct principals with at least one snapshot in the tenant.
    fn cached_principals(&self, tenant_id: TenantId) -> Result<Vec<PrincipalId>, CacheError>;
}

#[cfg(feature = "redis")]
pub(crate) fn decode_effect(key: &str, value: &str) -> Result<Effect, CacheError> {
    value.parse::<Effect>().map_err(|e| CacheError::Malformed {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
