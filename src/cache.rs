use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Entry stored in the local DashMap with an expiry timestamp.
#[derive(Clone)]
pub(crate) struct CacheEntry {
    value: String,
    pub(crate) expires_at: Instant,
}

/// Two-tier read cache: in-memory DashMap (tier 1) backed by Redis (tier 2).
///
/// Parcel snapshots from the registry contract and traits/creative documents
/// fetched from the IPFS gateway are cached here so the serve path does not
/// hit the RPC node and the gateway on every impression. Entries are
/// checked on read and evicted lazily; the cleanup job sweeps the local
/// tier with `evict_expired()`.
#[derive(Clone)]
pub struct TieredCache {
    pub(crate) local: Arc<DashMap<String, CacheEntry>>,
    redis: ConnectionManager,
}

impl TieredCache {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            local: Arc::new(DashMap::new()),
            redis,
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        // tier 1: in-memory (with TTL check)
        if let Some(entry) = self.local.get(key) {
            if Instant::now() < entry.expires_at {
                return serde_json::from_str(&entry.value).ok();
            }
            // expired — drop the ref before removing
            drop(entry);
            self.local.remove(key);
        }

        // tier 2: redis
        let mut conn = self.redis.clone();
        if let Ok(Some(v)) = conn.get::<_, Option<String>>(key).await {
            // Re-use the Redis TTL for the local entry.
            // Default to 60s if we can't query it.
            let ttl_secs: i64 = conn.ttl(key).await.unwrap_or(60);
            let ttl = if ttl_secs > 0 {
                Duration::from_secs(ttl_secs as u64)
            } else {
                Duration::from_secs(60)
            };
            self.local.insert(
                key.to_string(),
                CacheEntry {
                    value: v.clone(),
                    expires_at: Instant::now() + ttl,
                },
            );
            return serde_json::from_str(&v).ok();
        }

        None
    }

    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> anyhow::Result<()> {
        let json = serde_json::to_string(value)?;
        self.local.insert(
            key.to_string(),
            CacheEntry {
                value: json.clone(),
                expires_at: Instant::now() + Duration::from_secs(ttl_secs),
            },
        );

        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(key, json, ttl_secs).await?;
        Ok(())
    }

    /// Drop a key from both tiers. Used when a chain write invalidates a
    /// cached parcel snapshot.
    pub async fn invalidate(&self, key: &str) {
        self.local.remove(key);
        let mut conn = self.redis.clone();
        let _: Result<(), _> = conn.del(key).await;
    }

    /// Remove all locally-expired entries. Called from the cleanup job to
    /// bound memory usage.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.local.len();
        self.local.retain(|_, entry| entry.expires_at > now);
        before - self.local.len()
    }
}

/// Cache key for a parcel snapshot.
pub fn parcel_key(parcel_id: u64) -> String {
    format!("parcel:{}", parcel_id)
}

/// Cache key for an IPFS document.
pub fn ipfs_key(hash: &str) -> String {
    format!("ipfs:{}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_keys_are_namespaced() {
        assert_eq!(parcel_key(7), "parcel:7");
        assert_eq!(ipfs_key("Qmabc"), "ipfs:Qmabc");
    }
}
