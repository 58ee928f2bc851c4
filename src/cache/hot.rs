//! In-process hot cache tier (Component D): a `DashMap` guarding
//! `(value, expires_at)` pairs, standing in for an external cache like
//! Redis behind the same [`HotCache`] port so a real one can be swapped in
//! without touching callers. A small `lru::LruCache` tracks insertion order
//! so the process can't grow this tier unbounded when a zone/method fan-out
//! produces more live keys than expected.

use crate::error::EngineError;
use crate::repo::HotCache;
use async_trait::async_trait;
use dashmap::DashMap;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_MAX_ENTRIES: usize = 200_000;

struct Entry {
    value: String,
    expires_at: Instant,
}

pub struct InMemoryHotCache {
    entries: DashMap<String, Entry>,
    order: Mutex<LruCache<String, ()>>,
}

impl InMemoryHotCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(max_entries: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::new(1).unwrap());
        InMemoryHotCache {
            entries: DashMap::new(),
            order: Mutex::new(LruCache::new(cap)),
        }
    }

    fn is_live(entry: &Entry) -> bool {
        entry.expires_at > Instant::now()
    }

    fn touch(&self, key: &str) {
        let mut order = self.order.lock().expect("lru order lock poisoned");
        if let Some(evicted) = order.push(key.to_string(), ()) {
            if evicted.0 != key {
                self.entries.remove(&evicted.0);
            }
        }
    }
}

impl Default for InMemoryHotCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HotCache for InMemoryHotCache {
    async fn get(&self, key: &str) -> Result<Option<String>, EngineError> {
        let was_present = self.entries.contains_key(key);
        let live_value = self
            .entries
            .get(key)
            .and_then(|entry| Self::is_live(&entry).then(|| entry.value.clone()));
        if was_present && live_value.is_none() {
            self.entries.remove(key);
        }
        Ok(live_value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), EngineError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        self.touch(key);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, EngineError> {
        let now = Instant::now();
        let mut claimed = false;
        self.entries
            .entry(key.to_string())
            .and_modify(|entry| {
                if entry.expires_at <= now {
                    entry.expires_at = now + ttl;
                    entry.value = "locked".to_string();
                    claimed = true;
                }
            })
            .or_insert_with(|| {
                claimed = true;
                Entry {
                    value: "locked".to_string(),
                    expires_at: now + ttl,
                }
            });
        self.touch(key);
        Ok(claimed)
    }

    async fn delete(&self, key: &str) -> Result<(), EngineError> {
        self.entries.remove(key);
        self.order.lock().expect("lru order lock poisoned").pop(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = InMemoryHotCache::new();
        cache.set("k", "v".into(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn expired_entries_are_absent() {
        let cache = InMemoryHotCache::new();
        cache.set("k", "v".into(), Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_if_absent_is_single_flight() {
        let cache = InMemoryHotCache::new();
        assert!(cache.set_if_absent("lock", Duration::from_secs(60)).await.unwrap());
        assert!(!cache.set_if_absent("lock", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn lock_can_be_reclaimed_after_lease_expiry() {
        let cache = InMemoryHotCache::new();
        assert!(cache.set_if_absent("lock", Duration::from_millis(1)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.set_if_absent("lock", Duration::from_secs(60)).await.unwrap());
    }
}
