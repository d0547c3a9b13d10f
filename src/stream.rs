//! # Stream Manager
//!
//! Append-only change log per family (`<family>_changes`). Wraps the raw
//! `xadd`/`xread` primitives with the fixed field schema the rest of the
//! core and every client depend on: `entity_type`, `entity_id`, `data_hash`,
//! `version`, `idempotency_key`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::Family;
use crate::kv::{KvResult, KvStore};

/// A decoded stream entry, independent of the KV backend's wire format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeEntry {
    pub stream_id: u64,
    pub entity_type: String,
    pub entity_id: String,
    pub data_hash: String,
    pub version: u64,
    pub idempotency_key: String,
}

pub struct StreamManager<'a> {
    kv: &'a dyn KvStore,
}

impl<'a> StreamManager<'a> {
    pub fn new(kv: &'a dyn KvStore) -> Self {
        Self { kv }
    }

    /// Append a change. Attaches a random idempotency key and returns the
    /// assigned monotonic stream id.
    pub async fn append(&self, family: Family, entity_id: &str, data_hash: &str, version: u64) -> KvResult<u64> {
        let mut fields = HashMap::new();
        fields.insert("entity_type".to_string(), family.as_str().to_string());
        fields.insert("entity_id".to_string(), entity_id.to_string());
        fields.insert("data_hash".to_string(), data_hash.to_string());
        fields.insert("version".to_string(), version.to_string());
        fields.insert("idempotency_key".to_string(), Uuid::new_v4().to_string());

        self.kv.xadd(&family.stream_name(), fields).await
    }

    /// Read forward from `from_id`, up to `count` entries, ascending order.
    pub async fn read(&self, family: Family, from_id: u64, count: usize) -> KvResult<Vec<ChangeEntry>> {
        let raw = self.kv.xread(&family.stream_name(), from_id, count).await?;
        Ok(raw
            .into_iter()
            .map(|entry| ChangeEntry {
                stream_id: entry.id,
                entity_type: entry.fields.get("entity_type").cloned().unwrap_or_default(),
                entity_id: entry.fields.get("entity_id").cloned().unwrap_or_default(),
                data_hash: entry.fields.get("data_hash").cloned().unwrap_or_default(),
                version: entry
                    .fields
                    .get("version")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0),
                idempotency_key: entry
                    .fields
                    .get("idempotency_key")
                    .cloned()
                    .unwrap_or_default(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryStore;

    #[tokio::test]
    async fn append_assigns_monotonic_ids() {
        let kv = MemoryStore::new();
        let mgr = StreamManager::new(&kv);
        let id1 = mgr.append(Family::Product, "A", "hash1", 1).await.unwrap();
        let id2 = mgr.append(Family::Product, "B", "hash2", 1).await.unwrap();
        assert!(id2 > id1);
    }

    #[tokio::test]
    async fn from_zero_returns_every_entry() {
        let kv = MemoryStore::new();
        let mgr = StreamManager::new(&kv);
        mgr.append(Family::Product, "A", "h1", 1).await.unwrap();
        mgr.append(Family::Product, "B", "h2", 1).await.unwrap();
        let all = mgr.read(Family::Product, 0, 100).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].entity_id, "A");
        assert_eq!(all[1].entity_id, "B");
    }

    #[tokio::test]
    async fn each_append_gets_distinct_idempotency_key() {
        let kv = MemoryStore::new();
        let mgr = StreamManager::new(&kv);
        mgr.append(Family::Product, "A", "h1", 1).await.unwrap();
        mgr.append(Family::Product, "A", "h1", 1).await.unwrap();
        let entries = mgr.read(Family::Product, 0, 10).await.unwrap();
        assert_ne!(entries[0].idempotency_key, entries[1].idempotency_key);
    }

    #[tokio::test]
    async fn families_have_independent_streams() {
        let kv = MemoryStore::new();
        let mgr = StreamManager::new(&kv);
        mgr.append(Family::Product, "A", "h1", 1).await.unwrap();
        let price_entries = mgr.read(Family::Price, 0, 10).await.unwrap();
        assert!(price_entries.is_empty());
    }
}
