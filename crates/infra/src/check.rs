//! Authorization check: the per-request hot path.
//!
//! A pure cache read. The snapshot slot for the requested scope is read first;
//! a non-tenant scope without its own slot falls back to the principal's
//! inherited slot. At most two pipelined reads, never a store access, never a
//! computation. Cache failures deny.

use std::sync::Arc;

use tracing::{debug, warn};

use stratum_auth::{CheckExplanation, Decision, Effect, PermissionKey, Snapshot, decide, explain, lookup_keys};
use stratum_core::{PrincipalId, Scope, TenantId};

use crate::error::EngineResult;
use crate::snapshot_cache::{CacheError, SnapshotCache, SnapshotKey};

#[derive(Clone)]
pub struct PermissionChecker {
    cache: Arc<dyn SnapshotCache>,
}

fn to_levels(effects: Vec<Option<Effect>>) -> [Option<Effect>; 3] {
    let mut levels = [None; 3];
    for (level, effect) in levels.iter_mut().zip(effects) {
        *level = effect;
    }
    levels
}

impl PermissionChecker {
    pub fn new(cache: Arc<dyn SnapshotCache>) -> Self {
        Self { cache }
    }

    /// Read the lookup keys from the slot that serves `scope`.
    fn read(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        scope: Scope,
        keys: &[PermissionKey; 3],
    ) -> Result<Option<(SnapshotKey, [Option<Effect>; 3])>, CacheError> {
        let primary = SnapshotKey::for_scope(tenant_id, principal_id, scope);
        if let Some(effects) = self.cache.get_fields(&primary, keys)? {
            return Ok(Some((primary, to_levels(effects))));
        }
        if scope.is_tenant() {
            return Ok(None);
        }

        let fallback = SnapshotKey::inherited(tenant_id, principal_id);
        Ok(self
            .cache
            .get_fields(&fallback, keys)?
            .map(|effects| (fallback, to_levels(effects))))
    }

    /// Full decision for `resource`/`action`. Never fails: any cache error is
    /// logged and denies.
    pub fn decide(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        resource: &str,
        action: &str,
        scope: Scope,
    ) -> Decision {
        let keys = lookup_keys(resource, action);
        match self.read(tenant_id, principal_id, scope, &keys) {
            Ok(Some((key, effects))) => {
                let decision = decide(effects);
                debug!(
                    key = %key,
                    permission = %keys[0],
                    allowed = decision.allowed,
                    level = ?decision.level,
                    "check"
                );
                decision
            }
            Ok(None) => Decision::no_match(),
            Err(error) => {
                warn!(
                    tenant_id = %tenant_id,
                    principal_id = %principal_id,
                    scope = %scope,
                    permission = %keys[0],
                    error = %error,
                    "snapshot cache unavailable; denying"
                );
                Decision::no_match()
            }
        }
    }

    pub fn check(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        resource: &str,
        action: &str,
        scope: Scope,
    ) -> bool {
        self.decide(tenant_id, principal_id, resource, action, scope).allowed
    }

    /// Audit variant of [`check`](Self::check). Unlike the check itself, cache
    /// failures are returned.
    pub fn explain(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        resource: &str,
        action: &str,
        scope: Scope,
    ) -> EngineResult<CheckExplanation> {
        let keys = lookup_keys(resource, action);
        let explanation = match self.read(tenant_id, principal_id, scope, &keys)? {
            Some((key, effects)) => explain(resource, action, effects, Some(key.to_string())),
            None => explain(resource, action, [None; 3], None),
        };
        Ok(explanation)
    }

    /// The snapshot that serves `scope`; empty when nothing is cached.
    pub fn effective_permissions(
        &self,
        tenant_id: TenantId,
        principal_id: PrincipalId,
        scope: Scope,
    ) -> EngineResult<Snapshot> {
        if let Some(snapshot) = self.cache.get(&SnapshotKey::for_scope(tenant_id, principal_id, scope))? {
            return Ok(snapshot);
        }
        if scope.is_tenant() {
            return Ok(Snapshot::new());
        }
        Ok(self
            .cache
            .get(&SnapshotKey::inherited(tenant_id, principal_id))?
            .unwrap_or_default())
    }
}

impl core::fmt::Debug for PermissionChecker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PermissionChecker").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::snapshot_cache::InMemorySnapshotCache;
    use stratum_auth::MatchLevel;
    use stratum_core::{SubsidiaryId, TalentId};

    const TTL: Duration = Duration::from_secs(60);

    fn snapshot(entries: &[(&str, Effect)]) -> Snapshot {
        entries
            .iter()
            .map(|(k, e)| (PermissionKey::from_raw(*k), *e))
            .collect()
    }

    struct Down;

    impl SnapshotCache for Down {
        fn get_fields(&self, _: &SnapshotKey, _: &[PermissionKey]) -> Result<Option<Vec<Option<Effect>>>, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        fn get(&self, _: &SnapshotKey) -> Result<Option<Snapshot>, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        fn put(&self, _: &SnapshotKey, _: &Snapshot, _: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        fn delete(&self, _: &SnapshotKey) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        fn suffixed_keys(&self, _: TenantId, _: PrincipalId) -> Result<Vec<SnapshotKey>, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        fn cached_principals(&self, _: TenantId) -> Result<Vec<PrincipalId>, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
    }

    #[test]
    fn admin_levels_resolve_in_order() {
        let cache = Arc::new(InMemorySnapshotCache::new());
        let checker = PermissionChecker::new(cache.clone());
        let t = TenantId::new();
        let p = PrincipalId::new();
        let key = SnapshotKey::tenant_root(t, p);

        cache.put(&key, &snapshot(&[("x:admin", Effect::Grant)]), TTL).unwrap();
        assert!(checker.check(t, p, "x", "write", Scope::Tenant));

        cache
            .put(&key, &snapshot(&[("x:admin", Effect::Deny), ("x:write", Effect::Grant)]), TTL)
            .unwrap();
        let decision = checker.decide(t, p, "x", "write", Scope::Tenant);
        assert!(!decision.allowed);
        assert_eq!(decision.level, Some(MatchLevel::ResourceAdmin));

        cache.put(&key, &snapshot(&[("x:write", Effect::Grant)]), TTL).unwrap();
        assert_eq!(
            checker.decide(t, p, "x", "write", Scope::Tenant).level,
            Some(MatchLevel::Exact)
        );

        cache.put(&key, &snapshot(&[("*:admin", Effect::Grant)]), TTL).unwrap();
        assert!(checker.check(t, p, "anything", "delete", Scope::Tenant));
    }

    #[test]
    fn missing_scope_slot_falls_back_to_inherited() {
        let cache = Arc::new(InMemorySnapshotCache::new());
        let checker = PermissionChecker::new(cache.clone());
        let t = TenantId::new();
        let p = PrincipalId::new();
        let sub = Scope::Subsidiary(SubsidiaryId::new());
        let talent = Scope::Talent(TalentId::new());

        cache
            .put(&SnapshotKey::inherited(t, p), &snapshot(&[("doc:read", Effect::Grant)]), TTL)
            .unwrap();
        cache
            .put(&SnapshotKey::for_scope(t, p, talent), &snapshot(&[("doc:read", Effect::Deny)]), TTL)
            .unwrap();

        assert!(checker.check(t, p, "doc", "read", sub));
        assert!(!checker.check(t, p, "doc", "read", talent));
        // The tenant root never falls back.
        assert!(!checker.check(t, p, "doc", "read", Scope::Tenant));

        let explanation = checker.explain(t, p, "doc", "read", sub).unwrap();
        assert!(explanation.granted);
        assert_eq!(explanation.snapshot_key, Some(SnapshotKey::inherited(t, p).to_string()));
    }

    #[test]
    fn cache_failure_denies() {
        let checker = PermissionChecker::new(Arc::new(Down));
        let t = TenantId::new();
        let p = PrincipalId::new();

        assert!(!checker.check(t, p, "doc", "read", Scope::Tenant));
        assert!(checker.explain(t, p, "doc", "read", Scope::Tenant).is_err());
        assert!(checker.effective_permissions(t, p, Scope::Tenant).is_err());
    }

    #[test]
    fn effective_permissions_of_unknown_principal_are_empty() {
        let checker = PermissionChecker::new(Arc::new(InMemorySnapshotCache::new()));
        let snapshot = checker
            .effective_permissions(TenantId::new(), PrincipalId::new(), Scope::Subsidiary(SubsidiaryId::new()))
            .unwrap();
        assert!(snapshot.is_empty());
    }
}
