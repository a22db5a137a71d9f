//! Two-tier cache: a fast in-process tier plus an optional remote tier,
//! TTL expiry, bounded capacity, periodic sweep, atomic hit/miss counters
//! (spec.md §4.4).
//!
//! This is the one component where the teacher's existing cache (`FsCache`,
//! an on-disk, unbounded, TTL-on-read cache) does not match the required
//! shape, so it is restructured rather than reused -- grounded on the
//! teacher's *idiom* (`sha2`+`hex` key derivation as in `FsCache::key_for_fetch_v2`,
//! state behind a concurrent map) rather than its on-disk design.

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Deterministic cache key: `"<ns>:" + lowercase_hex(sha256(parts joined by '|'))[:24]`.
pub fn cache_key(ns: &str, parts: &[&str]) -> String {
    let mut h = Sha256::new();
    h.update(parts.join("|").as_bytes());
    let digest = h.finalize();
    let hex = hex::encode(&digest[..12]);
    format!("{ns}:{hex}")
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: Vec<u8>,
    pub expires_at: Instant,
}

#[async_trait::async_trait]
pub trait RemoteCacheTier: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<u8>>;
    async fn set(&self, key: &str, payload: &[u8], ttl: Duration);
    async fn ping(&self, timeout: Duration) -> bool;
}

#[cfg(feature = "redis-tier")]
pub struct RedisTier {
    manager: redis::aio::ConnectionManager,
}

#[cfg(feature = "redis-tier")]
impl RedisTier {
    pub async fn connect(url: &str, ping_timeout: Duration) -> Option<Self> {
        let client = redis::Client::open(url).ok()?;
        let manager = tokio::time::timeout(ping_timeout, client.get_connection_manager())
            .await
            .ok()?
            .ok()?;
        let tier = Self { manager };
        if tier.ping(ping_timeout).await {
            Some(tier)
        } else {
            None
        }
    }
}

#[cfg(feature = "redis-tier")]
#[async_trait::async_trait]
impl RemoteCacheTier for RedisTier {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        use redis::AsyncCommands;
        let mut conn = self.manager.clone();
        conn.get::<_, Option<Vec<u8>>>(key).await.ok().flatten()
    }

    async fn set(&self, key: &str, payload: &[u8], ttl: Duration) {
        use redis::AsyncCommands;
        let mut conn = self.manager.clone();
        let secs = ttl.as_secs().max(1);
        let _: Result<(), _> = conn.set_ex(key, payload, secs).await;
    }

    async fn ping(&self, timeout: Duration) -> bool {
        use redis::AsyncCommands;
        let mut conn = self.manager.clone();
        tokio::time::timeout(timeout, conn.get::<_, Option<Vec<u8>>>("__websynth_ping__"))
            .await
            .is_ok()
    }
}

pub struct TieredCache {
    fast: DashMap<String, CacheEntry>,
    remote: Option<Arc<dyn RemoteCacheTier>>,
    max_entries: usize,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TieredCache {
    pub fn new(max_entries: usize, ttl: Duration, remote: Option<Arc<dyn RemoteCacheTier>>) -> Self {
        Self {
            fast: DashMap::new(),
            remote,
            max_entries: max_entries.max(1),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.fast.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fast.is_empty()
    }

    /// `get(key) -> (payload, hit?)`. Consults the fast tier first, then the
    /// remote tier (populating the fast tier on a remote hit), per spec.md §4.4.
    pub async fn get(&self, key: &str) -> (Option<Vec<u8>>, bool) {
        if let Some(entry) = self.fast.get(key) {
            if Instant::now() < entry.expires_at {
                self.hits.fetch_add(1, Ordering::Relaxed);
                crate::metrics::global().incr("cache_hits_total");
                return (Some(entry.payload.clone()), true);
            }
            drop(entry);
            self.fast.remove(key);
        }

        if let Some(remote) = &self.remote {
            if let Some(payload) = remote.get(key).await {
                self.fast.insert(
                    key.to_string(),
                    CacheEntry {
                        payload: payload.clone(),
                        expires_at: Instant::now() + self.ttl,
                    },
                );
                self.hits.fetch_add(1, Ordering::Relaxed);
                crate::metrics::global().incr("cache_hits_total");
                return (Some(payload), true);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        crate::metrics::global().incr("cache_misses_total");
        (None, false)
    }

    /// `set(key, payload)`. Runs eviction before inserting, then writes the
    /// fast tier and best-effort writes the remote tier.
    pub async fn set(&self, key: &str, payload: Vec<u8>) {
        self.evict();
        self.fast.insert(
            key.to_string(),
            CacheEntry {
                payload: payload.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        if let Some(remote) = &self.remote {
            remote.set(key, &payload, self.ttl).await;
        }
    }

    /// Eviction per spec.md §4.4: pass 1 deletes expired entries (aborting
    /// early once under the cap); pass 2 repeatedly deletes the
    /// earliest-`expires_at` entry until under the cap.
    fn evict(&self) {
        if self.fast.len() < self.max_entries {
            return;
        }
        let now = Instant::now();
        let expired: Vec<String> = self
            .fast
            .iter()
            .filter(|e| e.expires_at <= now)
            .map(|e| e.key().clone())
            .collect();
        for k in expired {
            self.fast.remove(&k);
            if self.fast.len() < self.max_entries {
                return;
            }
        }

        while self.fast.len() >= self.max_entries {
            let oldest = self
                .fast
                .iter()
                .min_by_key(|e| e.expires_at)
                .map(|e| e.key().clone());
            match oldest {
                Some(k) => {
                    self.fast.remove(&k);
                }
                None => break,
            }
        }
    }

    /// Spawns the background sweep task (spec.md §4.4: one task, loops on a
    /// configurable interval, deletes expired entries once per tick).
    pub fn spawn_sweep(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let expired: Vec<String> = cache
                    .fast
                    .iter()
                    .filter(|e| e.expires_at <= now)
                    .map(|e| e.key().clone())
                    .collect();
                for k in expired {
                    cache.fast.remove(&k);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn roundtrip_hit_then_miss_after_ttl() {
        let cache = TieredCache::new(100, Duration::from_millis(50), None);
        let key = cache_key("smart_search", &["golang context"]);
        let (v, hit) = cache.get(&key).await;
        assert!(!hit);
        assert!(v.is_none());

        cache.set(&key, b"hello".to_vec()).await;
        let (v, hit) = cache.get(&key).await;
        assert!(hit);
        assert_eq!(v.unwrap(), b"hello");

        tokio::time::sleep(Duration::from_millis(80)).await;
        let (_, hit) = cache.get(&key).await;
        assert!(!hit);
    }

    #[tokio::test]
    async fn eviction_keeps_count_under_max() {
        let cache = TieredCache::new(3, Duration::from_secs(60), None);
        for i in 0..5 {
            let k = cache_key("ns", &[&i.to_string()]);
            cache.set(&k, vec![i as u8]).await;
            assert!(cache.len() <= 3);
        }
        assert!(cache.len() <= 3);
    }

    #[tokio::test]
    async fn hit_miss_counters_are_monotonic() {
        let cache = TieredCache::new(100, Duration::from_secs(60), None);
        let key = cache_key("ns", &["q"]);
        let _ = cache.get(&key).await;
        cache.set(&key, b"x".to_vec()).await;
        let _ = cache.get(&key).await;
        let _ = cache.get(&key).await;
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.hits(), 2);
    }

    #[test]
    fn cache_key_is_deterministic_and_namespaced() {
        let a = cache_key("gs", &["golang", "context"]);
        let b = cache_key("gs", &["golang", "context"]);
        let c = cache_key("gs", &["golang", "different"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("gs:"));
        assert_eq!(a.len(), "gs:".len() + 24);
    }

    proptest! {
        #[test]
        fn cache_key_never_panics_and_is_hex(
            ns in "[a-z]{1,8}",
            parts in prop::collection::vec(any::<String>(), 0..10),
        ) {
            let refs: Vec<&str> = parts.iter().map(|s| s.as_str()).collect();
            let k = cache_key(&ns, &refs);
            let hex_part = &k[ns.len() + 1..];
            prop_assert_eq!(hex_part.len(), 24);
            prop_assert!(hex_part.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        }
    }
}
