use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use apigw_core::GatewayError;

use crate::SharedStore;

struct Entry {
    /// Ordered-set members keyed by score, values are the member tag.
    zset: BTreeMap<i64, Vec<String>>,
    /// String value, if this key is a string rather than a zset.
    string: Option<String>,
    expires_at_ms: Option<i64>,
}

impl Entry {
    fn empty() -> Self {
        Self {
            zset: BTreeMap::new(),
            string: None,
            expires_at_ms: None,
        }
    }

    fn is_expired(&self, now_ms: i64) -> bool {
        matches!(self.expires_at_ms, Some(t) if now_ms >= t)
    }
}

/// `tokio::sync::Mutex`-free in-memory double for unit/integration tests —
/// no live Redis required. Mirrors the teacher's `ConfigCache` idiom of a
/// single process-wide map guarded by a lock, scaled down from `DashMap`
/// to a plain `Mutex<HashMap>` since this store's access pattern is
/// read-modify-write per key rather than independent reads.
pub struct InMemoryStore {
    data: Mutex<std::collections::HashMap<String, Entry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(std::collections::HashMap::new()),
        }
    }

    fn now_ms() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_millis() as i64
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedStore for InMemoryStore {
    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), GatewayError> {
        let mut guard = self.data.lock().expect("in-memory store mutex poisoned");
        let entry = guard.entry(key.to_string()).or_insert_with(Entry::empty);
        entry.zset.entry(score).or_default().push(member.to_string());
        Ok(())
    }

    async fn zremrangebyscore_le(&self, key: &str, max_score: i64) -> Result<(), GatewayError> {
        let mut guard = self.data.lock().expect("in-memory store mutex poisoned");
        if let Some(entry) = guard.get_mut(key) {
            entry.zset.retain(|score, _| *score > max_score);
        }
        Ok(())
    }

    async fn zcount(&self, key: &str, min_score: i64, max_score: i64) -> Result<i64, GatewayError> {
        let guard = self.data.lock().expect("in-memory store mutex poisoned");
        let count = guard
            .get(key)
            .map(|e| {
                e.zset
                    .range(min_score..=max_score)
                    .map(|(_, members)| members.len() as i64)
                    .sum()
            })
            .unwrap_or(0);
        Ok(count)
    }

    async fn expire_ms(&self, key: &str, ttl_ms: i64) -> Result<(), GatewayError> {
        let mut guard = self.data.lock().expect("in-memory store mutex poisoned");
        if let Some(entry) = guard.get_mut(key) {
            entry.expires_at_ms = Some(Self::now_ms() + ttl_ms);
        }
        Ok(())
    }

    async fn set_if_absent_px(&self, key: &str, value: &str, ttl_ms: i64) -> Result<bool, GatewayError> {
        let mut guard = self.data.lock().expect("in-memory store mutex poisoned");
        let now = Self::now_ms();
        if let Some(entry) = guard.get(key)
            && !entry.is_expired(now) && entry.string.is_some() {
                return Ok(false);
            }
        guard.insert(
            key.to_string(),
            Entry {
                zset: BTreeMap::new(),
                string: Some(value.to_string()),
                expires_at_ms: Some(now + ttl_ms),
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, GatewayError> {
        let guard = self.data.lock().expect("in-memory store mutex poisoned");
        let now = Self::now_ms();
        Ok(guard
            .get(key)
            .filter(|e| !e.is_expired(now))
            .and_then(|e| e.string.clone()))
    }

    async fn set_px(&self, key: &str, value: &str, ttl_ms: i64) -> Result<(), GatewayError> {
        let mut guard = self.data.lock().expect("in-memory store mutex poisoned");
        let now = Self::now_ms();
        guard.insert(
            key.to_string(),
            Entry {
                zset: BTreeMap::new(),
                string: Some(value.to_string()),
                expires_at_ms: Some(now + ttl_ms),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), GatewayError> {
        let mut guard = self.data.lock().expect("in-memory store mutex poisoned");
        guard.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zadd_and_zcount_roundtrip() {
        let s = InMemoryStore::new();
        s.zadd("k", "a", 100).await.unwrap();
        s.zadd("k", "b", 200).await.unwrap();
        assert_eq!(s.zcount("k", 0, 300).await.unwrap(), 2);
        assert_eq!(s.zcount("k", 150, 300).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn zremrangebyscore_evicts_old_entries() {
        let s = InMemoryStore::new();
        s.zadd("k", "a", 100).await.unwrap();
        s.zadd("k", "b", 200).await.unwrap();
        s.zremrangebyscore_le("k", 100).await.unwrap();
        assert_eq!(s.zcount("k", 0, 300).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn set_if_absent_is_single_flight() {
        let s = InMemoryStore::new();
        assert!(s.set_if_absent_px("tok", "v1", 1000).await.unwrap());
        assert!(!s.set_if_absent_px("tok", "v2", 1000).await.unwrap());
        assert_eq!(s.get("tok").await.unwrap().as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn del_clears_key() {
        let s = InMemoryStore::new();
        s.set_px("k", "v", 1000).await.unwrap();
        s.del("k").await.unwrap();
        assert_eq!(s.get("k").await.unwrap(), None);
    }
}
