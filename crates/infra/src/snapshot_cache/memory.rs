//! In-memory snapshot cache for tests/dev.

use std::collections::{BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use stratum_auth::{Effect, PermissionKey, Snapshot};
use stratum_core::{PrincipalId, TenantId};

use super::{CacheError, SnapshotCache, SnapshotKey, SnapshotSlot};

#[derive(Debug, Clone)]
struct Entry {
    snapshot: Snapshot,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Snapshot cache backed by a `RwLock<HashMap>`. Expired entries read as absent.
#[derive(Debug, Default)]
pub struct InMemorySnapshotCache {
    entries: RwLock<HashMap<SnapshotKey, Entry>>,
}

impl InMemorySnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<SnapshotKey, Entry>>, CacheError> {
        self.entries
            .read()
            .map_err(|_| CacheError::Unavailable("snapshot cache lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<SnapshotKey, Entry>>, CacheError> {
        self.entries
            .write()
            .map_err(|_| CacheError::Unavailable("snapshot cache lock poisoned".to_string()))
    }

    /// Time left before `key` expires; `None` when absent or expired.
    pub fn ttl_remaining(&self, key: &SnapshotKey) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.read().ok()?;
        entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.expires_at.saturating_duration_since(now))
    }

    /// Number of live snapshots across every tenant.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.read()
            .map(|entries| entries.values().filter(|e| e.is_live(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live(&self, key: &SnapshotKey) -> Result<Option<Snapshot>, CacheError> {
        let now = Instant::now();
        let entries = self.read()?;
        Ok(entries.get(key).filter(|e| e.is_live(now)).map(|e| e.snapshot.clone()))
    }
}

impl SnapshotCache for InMemorySnapshotCache {
    fn get_fields(&self, key: &SnapshotKey, fields: &[PermissionKey]) -> Result<Option<Vec<Option<Effect>>>, CacheError> {
        Ok(self
            .live(key)?
            .map(|snapshot| fields.iter().map(|f| snapshot.get(f)).collect()))
    }

    fn get(&self, key: &SnapshotKey) -> Result<Option<Snapshot>, CacheError> {
        self.live(key)
    }

    fn put(&self, key: &SnapshotKey, snapshot: &Snapshot, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.write()?;
        entries.insert(
            *key,
            Entry {
                snapshot: snapshot.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &SnapshotKey) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut entries = self.write()?;
        Ok(entries.remove(key).is_some_and(|e| e.is_live(now)))
    }

    fn suffixed_keys(&self, tenant_id: TenantId, principal_id: PrincipalId) -> Result<Vec<SnapshotKey>, CacheError> {
        let now = Instant::now();
        let entries = self.read()?;
        let mut keys: Vec<SnapshotKey> = entries
            .iter()
            .filter(|(k, e)| {
                k.tenant_id == tenant_id
                    && k.principal_id == principal_id
                    && k.slot != SnapshotSlot::TenantRoot
                    && e.is_live(now)
            })
            .map(|(k, _)| *k)
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn cached_principals(&self, tenant_id: TenantId) -> Result<Vec<PrincipalId>, CacheError> {
        let now = Instant::now();
        let entries = self.read()?;
        let principals: BTreeSet<PrincipalId> = entries
            .iter()
            .filter(|(k, e)| k.tenant_id == tenant_id && e.is_live(now))
            .map(|(k, _)| k.principal_id)
            .collect();
        Ok(principals.into_iter().collect())
    }
}
