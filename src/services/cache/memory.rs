use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::services::cache::client::{CacheClient, CacheResult};

#[derive(Debug, Default)]
struct Entry {
    members: HashSet<String>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// In-process cache client, used when no Valkey URL is configured and in tests.
///
/// Expired keys are dropped lazily on access.
#[derive(Clone, Debug, Default)]
pub struct MemoryCacheClient {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryCacheClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, e| e.live(now));
        entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn live_entry<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    let now = Instant::now();
    if entries.get(key).is_some_and(|e| !e.live(now)) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

#[async_trait]
impl CacheClient for MemoryCacheClient {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn set_add(&self, key: &str, members: &[String]) -> CacheResult<u64> {
        let mut entries = self.entries.lock().await;
        if live_entry(&mut entries, key).is_none() && members.is_empty() {
            return Ok(0);
        }
        let entry = entries.entry(key.to_string()).or_default();
        let added = members
            .iter()
            .filter(|m| entry.members.insert((*m).clone()))
            .count();
        Ok(added as u64)
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> CacheResult<u64> {
        let mut entries = self.entries.lock().await;
        let Some(entry) = live_entry(&mut entries, key) else {
            return Ok(0);
        };
        let removed = members.iter().filter(|m| entry.members.remove(*m)).count();
        if entry.members.is_empty() {
            entries.remove(key);
        }
        Ok(removed as u64)
    }

    async fn set_is_member(&self, key: &str, member: &str) -> CacheResult<bool> {
        let mut entries = self.entries.lock().await;
        Ok(live_entry(&mut entries, key).is_some_and(|e| e.members.contains(member)))
    }

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>> {
        let mut entries = self.entries.lock().await;
        Ok(live_entry(&mut entries, key)
            .map(|e| e.members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        let mut entries = self.entries.lock().await;
        match live_entry(&mut entries, key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn del(&self, keys: &[String]) -> CacheResult<u64> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let removed = keys
            .iter()
            .filter_map(|k| entries.remove(k))
            .filter(|e| e.live(now))
            .count();
        Ok(removed as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn set_operations() {
        let cache = MemoryCacheClient::new();
        assert_eq!(cache.set_add("k", &members(&["a", "b"])).await.unwrap(), 2);
        assert_eq!(cache.set_add("k", &members(&["b", "c"])).await.unwrap(), 1);
        assert!(cache.set_is_member("k", "c").await.unwrap());

        assert_eq!(cache.set_remove("k", &members(&["a", "z"])).await.unwrap(), 1);
        let mut all = cache.set_members("k").await.unwrap();
        all.sort();
        assert_eq!(all, members(&["b", "c"]));

        assert_eq!(cache.del(&members(&["k", "missing"])).await.unwrap(), 1);
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_expire() {
        let cache = MemoryCacheClient::new();
        cache.set_add("k", &members(&["a"])).await.unwrap();
        assert!(cache.expire("k", Duration::from_secs(5)).await.unwrap());
        assert!(!cache.expire("missing", Duration::from_secs(5)).await.unwrap());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!cache.set_is_member("k", "a").await.unwrap());
        assert!(cache.is_empty().await);
    }
}
