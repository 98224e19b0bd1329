//! Redis-backed snapshot cache.
//!
//! Each snapshot is one hash. Writes replace the whole hash and set its expiry
//! inside a MULTI block; reads on the check path are a single pipelined
//! round trip (`EXISTS` + `HMGET`).

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};

use stratum_auth::{Effect, PermissionKey, Snapshot};
use stratum_core::{PrincipalId, TenantId};

use super::{CacheError, SnapshotCache, SnapshotKey, SnapshotSlot, decode_effect};

/// Keys requested per `SCAN` page.
const SCAN_BATCH: usize = 500;

#[derive(Debug, Clone)]
pub struct RedisSnapshotCache {
    client: Arc<redis::Client>,
}

impl RedisSnapshotCache {
    /// Create a cache over `redis_url` (e.g. `redis://localhost:6379`).
    ///
    /// No connection is made until the first command.
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url.as_ref()).map_err(|e| CacheError::Unavailable(e.to_string()))?;
        Ok(Self {
            client: Arc::new(client),
        })
    }

    fn connection(&self) -> Result<redis::Connection, CacheError> {
        self.client
            .get_connection()
            .map_err(|e| CacheError::Unavailable(format!("connect failed: {e}")))
    }

    fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.connection()?;
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query(&mut conn)
                .map_err(|e| command_error("SCAN", e))?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }

    fn scan_keys(&self, pattern: &str) -> Result<Vec<SnapshotKey>, CacheError> {
        Ok(self
            .scan(pattern)?
            .into_iter()
            .filter_map(|raw| match raw.parse::<SnapshotKey>() {
                Ok(key) => Some(key),
                Err(e) => {
                    debug!(key = %raw, error = %e, "skipping foreign key under snapshot prefix");
                    None
                }
            })
            .collect())
    }
}

fn command_error(command: &str, e: redis::RedisError) -> CacheError {
    CacheError::Unavailable(format!("{command} failed: {e}"))
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

impl SnapshotCache for RedisSnapshotCache {
    #[instrument(skip(self, fields), fields(key = %key), err)]
    fn get_fields(&self, key: &SnapshotKey, fields: &[PermissionKey]) -> Result<Option<Vec<Option<Effect>>>, CacheError> {
        let key_str = key.to_string();
        let mut conn = self.connection()?;

        if fields.is_empty() {
            let exists: bool = redis::cmd("EXISTS")
                .arg(&key_str)
                .query(&mut conn)
                .map_err(|e| command_error("EXISTS", e))?;
            return Ok(exists.then(Vec::new));
        }

        let names: Vec<&str> = fields.iter().map(PermissionKey::as_str).collect();
        let (exists, values): (bool, Vec<Option<String>>) = redis::pipe()
            .cmd("EXISTS")
            .arg(&key_str)
            .cmd("HMGET")
            .arg(&key_str)
            .arg(&names[..])
            .query(&mut conn)
            .map_err(|e| command_error("EXISTS/HMGET", e))?;

        if !exists {
            return Ok(None);
        }

        values
            .into_iter()
            .map(|v| v.map(|raw| decode_effect(&key_str, &raw)).transpose())
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    #[instrument(skip(self), fields(key = %key), err)]
    fn get(&self, key: &SnapshotKey) -> Result<Option<Snapshot>, CacheError> {
        let key_str = key.to_string();
        let mut conn = self.connection()?;

        let raw: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(&key_str)
            .query(&mut conn)
            .map_err(|e| command_error("HGETALL", e))?;

        if raw.is_empty() {
            return Ok(None);
        }

        raw.into_iter()
            .map(|(field, value)| Ok((PermissionKey::from_raw(field), decode_effect(&key_str, &value)?)))
            .collect::<Result<Snapshot, CacheError>>()
            .map(Some)
    }

    #[instrument(skip(self, snapshot), fields(key = %key, entries = snapshot.len()), err)]
    fn put(&self, key: &SnapshotKey, snapshot: &Snapshot, ttl: Duration) -> Result<(), CacheError> {
        if snapshot.is_empty() {
            return Ok(());
        }

        let key_str = key.to_string();
        let pairs: Vec<(&str, &str)> = snapshot.iter().map(|(k, e)| (k.as_str(), e.as_str())).collect();
        let mut conn = self.connection()?;

        let _: () = redis::pipe()
            .atomic()
            .cmd("DEL")
            .arg(&key_str)
            .ignore()
            .cmd("HSET")
            .arg(&key_str)
            .arg(pairs)
            .ignore()
            .cmd("PEXPIRE")
            .arg(&key_str)
            .arg(ttl_millis(ttl))
            .ignore()
            .query(&mut conn)
            .map_err(|e| command_error("DEL/HSET/PEXPIRE", e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(key = %key), err)]
    fn delete(&self, key: &SnapshotKey) -> Result<bool, CacheError> {
        let mut conn = self.connection()?;
        let removed: u64 = redis::cmd("DEL")
            .arg(key.to_string())
            .query(&mut conn)
            .map_err(|e| command_error("DEL", e))?;
        Ok(removed > 0)
    }

    fn suffixed_keys(&self, tenant_id: TenantId, principal_id: PrincipalId) -> Result<Vec<SnapshotKey>, CacheError> {
        let pattern = SnapshotKey::principal_pattern(tenant_id, principal_id);
        let mut keys: Vec<SnapshotKey> = self
            .scan_keys(&pattern)?
            .into_iter()
            .filter(|k| k.slot != SnapshotSlot::TenantRoot)
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    fn cached_principals(&self, tenant_id: TenantId) -> Result<Vec<PrincipalId>, CacheError> {
        let principals: BTreeSet<PrincipalId> = self
            .scan_keys(&SnapshotKey::tenant_pattern(tenant_id))?
            .into_iter()
            .filter(|k| k.tenant_id == tenant_id)
            .map(|k| k.principal_id)
            .collect();
        Ok(principals.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_is_never_zero() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_secs(86_400)), 86_400_000);
    }

    #[test]
    fn client_construction_rejects_bad_urls() {
        assert!(RedisSnapshotCache::new("not a url").is_err());
        assert!(RedisSnapshotCache::new("redis://127.0.0.1:6379").is_ok());
    }
}
