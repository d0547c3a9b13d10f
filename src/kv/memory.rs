//! In-process embedded KV backend, backed by `dashmap` for lock-free
//! concurrent access. Used by the test suite and by single-node
//! deployments that don't need a shared Redis instance.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{KvError, KvResult, KvStore, StreamEntry};

struct StreamState {
    entries: Vec<StreamEntry>,
}

/// In-memory implementation of [`KvStore`].
///
/// Expiry is tracked in one map shared across key types (mirroring Redis,
/// where `EXPIRE`/`PERSIST`/`TTL` apply uniformly to strings, hashes, and
/// sets rather than being a string-only concept) so `write_both`'s
/// `expire`/`persist` calls on `hash:<family>:<id>` keys behave the same
/// whether this backend or `RedisStore` is in front of them.
pub struct MemoryStore {
    strings: DashMap<String, String>,
    hashes: DashMap<String, HashMap<String, String>>,
    sets: DashMap<String, Vec<String>>,
    streams: DashMap<String, StreamState>,
    expires_at: DashMap<String, Instant>,
    next_stream_id: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            strings: DashMap::new(),
            hashes: DashMap::new(),
            sets: DashMap::new(),
            streams: DashMap::new(),
            expires_at: DashMap::new(),
            next_stream_id: AtomicU64::new(1),
        }
    }

    /// Whether `key` has expired, evicting it from every key-type map if so.
    fn evict_if_expired(&self, key: &str) -> bool {
        let Some(at) = self.expires_at.get(key).map(|e| *e) else {
            return false;
        };
        if at > Instant::now() {
            return false;
        }
        self.strings.remove(key);
        self.hashes.remove(key);
        self.sets.remove(key);
        self.expires_at.remove(key);
        true
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        self.evict_if_expired(key);
        Ok(self.strings.get(key).map(|e| e.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> KvResult<()> {
        self.strings.insert(key.to_string(), value.to_string());
        match ttl {
            Some(ttl) => {
                self.expires_at.insert(key.to_string(), Instant::now() + ttl);
            }
            None => {
                self.expires_at.remove(key);
            }
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> KvResult<()> {
        self.strings.remove(key);
        self.hashes.remove(key);
        self.sets.remove(key);
        self.expires_at.remove(key);
        Ok(())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> KvResult<()> {
        self.evict_if_expired(key);
        self.hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> KvResult<HashMap<String, String>> {
        self.evict_if_expired(key);
        Ok(self.hashes.get(key).map(|e| e.clone()).unwrap_or_default())
    }

    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> KvResult<i64> {
        self.evict_if_expired(key);
        let mut entry = self.hashes.entry(key.to_string()).or_default();
        let current: i64 = entry
            .get(field)
            .map(|v| v.parse().unwrap_or(0))
            .unwrap_or(0);
        let updated = current + delta;
        entry.insert(field.to_string(), updated.to_string());
        Ok(updated)
    }

    async fn sadd(&self, key: &str, member: &str) -> KvResult<()> {
        let mut set = self.sets.entry(key.to_string()).or_default();
        if !set.iter().any(|m| m == member) {
            set.push(member.to_string());
        }
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> KvResult<()> {
        if let Some(mut set) = self.sets.get_mut(key) {
            set.retain(|m| m != member);
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> KvResult<Vec<String>> {
        Ok(self.sets.get(key).map(|s| s.clone()).unwrap_or_default())
    }

    async fn xadd(&self, stream: &str, fields: HashMap<String, String>) -> KvResult<u64> {
        let id = self.next_stream_id.fetch_add(1, Ordering::SeqCst);
        self.streams
            .entry(stream.to_string())
            .or_insert_with(|| StreamState { entries: Vec::new() })
            .entries
            .push(StreamEntry { id, fields });
        Ok(id)
    }

    async fn xread(&self, stream: &str, from_id: u64, count: usize) -> KvResult<Vec<StreamEntry>> {
        Ok(self
            .streams
            .get(stream)
            .map(|s| {
                s.entries
                    .iter()
                    .filter(|e| e.id > from_id)
                    .take(count)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> KvResult<()> {
        if !self.key_exists(key) {
            return Err(KvError::NotFound(key.to_string()));
        }
        self.expires_at.insert(key.to_string(), Instant::now() + ttl);
        Ok(())
    }

    async fn persist(&self, key: &str) -> KvResult<()> {
        if !self.key_exists(key) {
            return Err(KvError::NotFound(key.to_string()));
        }
        self.expires_at.remove(key);
        Ok(())
    }
}

impl MemoryStore {
    fn key_exists(&self, key: &str) -> bool {
        self.evict_if_expired(key);
        self.strings.contains_key(key) || self.hashes.contains_key(key) || self.sets.contains_key(key)
    }
}
