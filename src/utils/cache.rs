use crate::error::{Error, Result};
use async_trait::async_trait;
use log::{debug, warn};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Key-value store holding serialized values with a per-entry time-to-live.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<bool>;
    /// Deletes every key matching a glob pattern where `*` matches any run of characters.
    async fn delete_pattern(&self, pattern: &str) -> Result<usize>;
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>>;
    async fn mset(&self, entries: Vec<(String, String)>, ttl: Duration) -> Result<()>;
    /// Increments a counter, starting a fresh one with `ttl` when absent or expired.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Expired entries are swept from the whole map at most this often, on write.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Entries {
    map: HashMap<String, Entry>,
    last_sweep: Instant,
}

impl Default for Entries {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
            last_sweep: Instant::now(),
        }
    }
}

impl Entries {
    fn live_value(&mut self, key: &str, now: Instant) -> Option<String> {
        match self.map.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                self.map.remove(key);
                None
            }
            None => None,
        }
    }

    fn sweep_if_due(&mut self, now: Instant) {
        if now.duration_since(self.last_sweep) < SWEEP_INTERVAL {
            return;
        }
        let before = self.map.len();
        self.map.retain(|_, entry| entry.is_live(now));
        self.last_sweep = now;
        let swept = before - self.map.len();
        if swept > 0 {
            debug!("Swept {} expired cache entries", swept);
        }
    }
}

/// Process-local store. Expired entries are dropped on access and swept
/// periodically on write, so keys that are never read again do not pile up.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<Entries>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let data = self.data.lock().await;
        data.map.values().filter(|entry| entry.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Entries physically held, expired or not.
    #[cfg(test)]
    async fn held(&self) -> usize {
        self.data.lock().await.map.len()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut data = self.data.lock().await;
        Ok(data.live_value(key, Instant::now()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut data = self.data.lock().await;
        let now = Instant::now();
        data.sweep_if_due(now);
        data.map.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut data = self.data.lock().await;
        let now = Instant::now();
        Ok(data.map.remove(key).map_or(false, |entry| entry.is_live(now)))
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
        let mut data = self.data.lock().await;
        let now = Instant::now();
        let mut removed = 0;
        data.map.retain(|key, entry| {
            if !entry.is_live(now) {
                return false;
            }
            if glob_match(pattern, key) {
                removed += 1;
                return false;
            }
            true
        });
        data.last_sweep = now;
        Ok(removed)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        let mut data = self.data.lock().await;
        let now = Instant::now();
        Ok(keys.iter().map(|key| data.live_value(key, now)).collect())
    }

    async fn mset(&self, entries: Vec<(String, String)>, ttl: Duration) -> Result<()> {
        let mut data = self.data.lock().await;
        let now = Instant::now();
        data.sweep_if_due(now);
        let expires_at = now + ttl;
        for (key, value) in entries {
            data.map.insert(key, Entry { value, expires_at });
        }
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64> {
        let mut data = self.data.lock().await;
        let now = Instant::now();
        data.sweep_if_due(now);
        match data.map.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                let current: i64 = entry.value.parse().map_err(|_| {
                    Error::CacheError(format!("value at {} is not an integer", key))
                })?;
                let next = current + 1;
                entry.value = next.to_string();
                Ok(next)
            }
            _ => {
                data.map.insert(
                    key.to_string(),
                    Entry {
                        value: "1".to_string(),
                        expires_at: now + ttl,
                    },
                );
                Ok(1)
            }
        }
    }
}

/// Glob match supporting `*` only.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }

    let mut rest = key;
    for (i, part) in parts.iter().enumerate() {
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(stripped) => rest = stripped,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else if let Some(pos) = rest.find(part) {
            rest = &rest[pos + part.len()..];
        } else {
            return false;
        }
    }
    true
}

/// Namespaced, JSON-typed view over a [`CacheStore`].
///
/// The cache is advisory: read failures and malformed entries are misses,
/// write failures are logged and dropped. Callers never see a cache error.
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
    namespace: String,
    ttl: Duration,
}

impl Cache {
    pub fn new(store: Arc<dyn CacheStore>, namespace: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            ttl,
        }
    }

    pub fn key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let full_key = self.key(key);
        match self.store.get(&full_key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Discarding malformed cache entry {}: {}", full_key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Cache read failed for {}: {}", full_key, e);
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) {
        let full_key = self.key(key);
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to serialize cache entry {}: {}", full_key, e);
                return;
            }
        };
        if let Err(e) = self.store.set(&full_key, raw, self.ttl).await {
            warn!("Cache write failed for {}: {}", full_key, e);
        }
    }

    /// Drops every entry in this namespace and returns how many went away.
    pub async fn clear(&self) -> usize {
        let pattern = format!("{}:*", self.namespace);
        match self.store.delete_pattern(&pattern).await {
            Ok(removed) => {
                debug!("Cleared {} cache entries under {}", removed, pattern);
                removed
            }
            Err(e) => {
                warn!("Cache pattern delete failed for {}: {}", pattern, e);
                0
            }
        }
    }

    /// Counter increment; `None` when the store is unavailable.
    pub async fn incr(&self, key: &str, ttl: Duration) -> Option<i64> {
        match self.store.incr(&self.key(key), ttl).await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!("Cache increment failed for {}: {}", key, e);
                None
            }
        }
    }
}
