//! # Cache Layer
//!
//! Two coexisting views per `(family, id)`:
//! - a **hash entry** (`hash:<family>:<id>`) — `{data, data_hash, updated_at,
//!   version}`, the authoritative record consulted by change detection;
//! - a **simple key** (`<family>:<id>`) — the raw app-facing value, used by
//!   legacy reads and as the drift-detection witness.
//!
//! The ordering discipline in [`CacheStore::write_both`] (hash entry first,
//! then simple key) is what makes a crash mid-write recoverable without
//! multi-key transactions.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hash::content_hash;
use crate::kv::{KvError, KvResult, KvStore};

/// Entity family. A sum type in place of the source's `entity_type` string
/// branches — the change-detection pipeline is generic over this, not
/// dispatched by string comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Product,
    Price,
    Stock,
    Hero,
    Bundle,
    Home,
    Message,
}

impl Family {
    pub fn as_str(self) -> &'static str {
        match self {
            Family::Product => "product",
            Family::Price => "price",
            Family::Stock => "stock",
            Family::Hero => "hero",
            Family::Bundle => "bundle",
            Family::Home => "home",
            Family::Message => "message",
        }
    }

    /// Families whose entity id is a fixed singleton rather than an
    /// ERP-assigned code: these take no id and use `entity_id == family`.
    pub fn is_singleton(self) -> bool {
        matches!(self, Family::Hero | Family::Bundle | Family::Home)
    }

    pub fn stream_name(self) -> String {
        format!("{}_changes", self.as_str())
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The hash-entry record: `data` plus the metadata change detection and the
/// sync protocol depend on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HashEntry {
    pub data: Value,
    pub data_hash: String,
    pub updated_at: String,
    pub version: u64,
}

fn hash_key(family: Family, id: &str) -> String {
    format!("hash:{}:{}", family.as_str(), id)
}

fn simple_key(family: Family, id: &str) -> String {
    match family {
        Family::Price => format!("price:{}", id),
        Family::Stock => format!("availability:{}", id),
        other => format!("{}:{}", other.as_str(), id),
    }
}

fn now_epoch_ms() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .to_string()
}

/// The cache layer: reads/writes both coexisting key shapes for a family.
pub struct CacheStore<'a> {
    kv: &'a dyn KvStore,
}

impl<'a> CacheStore<'a> {
    pub fn new(kv: &'a dyn KvStore) -> Self {
        Self { kv }
    }

    /// Read the hash entry for `(family, id)`, if any.
    pub async fn read_hash(&self, family: Family, id: &str) -> KvResult<Option<HashEntry>> {
        let fields = self.kv.hgetall(&hash_key(family, id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        decode_hash_entry(&fields).map(Some)
    }

    /// Read the simple key for `(family, id)`, if any. Parsed as JSON; a raw
    /// string that isn't valid JSON is returned as a JSON string value,
    /// matching how the simple key has historically stored plain scalars.
    pub async fn read_simple(&self, family: Family, id: &str) -> KvResult<Option<Value>> {
        match self.kv.get(&simple_key(family, id)).await? {
            None => Ok(None),
            Some(raw) => Ok(Some(
                serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
            )),
        }
    }

    /// Write both the hash entry and the simple key for `(family, id)`.
    /// Hash entry first, then simple key — see module docs.
    pub async fn write_both(
        &self,
        family: Family,
        id: &str,
        value: &Value,
        data_hash: &str,
        version: u64,
        ttl: Option<std::time::Duration>,
    ) -> KvResult<()> {
        let hkey = hash_key(family, id);
        let updated_at = now_epoch_ms();

        self.kv.hset(&hkey, "data", &value.to_string()).await?;
        self.kv.hset(&hkey, "data_hash", data_hash).await?;
        self.kv.hset(&hkey, "updated_at", &updated_at).await?;
        self.kv.hset(&hkey, "version", &version.to_string()).await?;
        if let Some(ttl) = ttl {
            self.kv.expire(&hkey, ttl).await?;
        } else {
            self.kv.persist(&hkey).await.or_else(|e| match e {
                // Nothing to clear on a brand-new key is not an error.
                KvError::NotFound(_) => Ok(()),
                other => Err(other),
            })?;
        }

        let skey = simple_key(family, id);
        let serialized = value.to_string();
        match ttl {
            Some(ttl) => self.kv.set(&skey, &serialized, Some(ttl)).await?,
            None => self.kv.set(&skey, &serialized, None).await?,
        }

        Ok(())
    }

    /// Remove both views for `(family, id)` entirely (used by hard catalog
    /// deletion; messages use a soft `deleted: true` marker instead — see
    /// `users::messages`).
    pub async fn delete_both(&self, family: Family, id: &str) -> KvResult<()> {
        self.kv.del(&hash_key(family, id)).await?;
        self.kv.del(&simple_key(family, id)).await?;
        Ok(())
    }

    /// Atomically bump the version counter for `(family, id)`, returning the
    /// new version. Falls back to `existing_version + 1` if the hash entry
    /// vanished between read and increment.
    pub async fn bump_version(&self, family: Family, id: &str, existing: Option<&HashEntry>) -> KvResult<u64> {
        let hkey = hash_key(family, id);
        let new_version = self.kv.hincrby(&hkey, "version", 1).await?;
        if new_version < 1 {
            // The field was freshly created by hincrby starting from 0;
            // reconcile against the last-known version we read before the
            // race, per the adapter's documented fallback.
            let fallback = existing.map(|e| e.version + 1).unwrap_or(1);
            self.kv
                .hset(&hkey, "version", &fallback.to_string())
                .await?;
            return Ok(fallback);
        }
        Ok(new_version as u64)
    }
}

fn decode_hash_entry(fields: &HashMap<String, String>) -> KvResult<HashEntry> {
    let data_raw = fields
        .get("data")
        .ok_or_else(|| KvError::Serialization("hash entry missing `data`".to_string()))?;
    let data: Value = serde_json::from_str(data_raw)
        .map_err(|e| KvError::Serialization(e.to_string()))?;
    let data_hash = fields
        .get("data_hash")
        .cloned()
        .unwrap_or_default();
    let updated_at = fields.get("updated_at").cloned().unwrap_or_default();
    let version = fields
        .get("version")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    Ok(HashEntry {
        data,
        data_hash,
        updated_at,
        version,
    })
}

/// Key holding the ordered warehouse reference list that every stock
/// availability vector is positioned against.
pub const WAREHOUSE_REFERENCE_KEY: &str = "warehouses:reference";

/// Read the warehouse reference as a flat list of names, accepting either
/// plain-string entries or `{name, lat, lng}` objects.
pub async fn read_warehouse_reference(kv: &dyn KvStore) -> KvResult<Vec<String>> {
    let raw = match kv.get(WAREHOUSE_REFERENCE_KEY).await? {
        None => return Ok(Vec::new()),
        Some(raw) => raw,
    };
    let value: Value =
        serde_json::from_str(&raw).map_err(|e| KvError::Serialization(e.to_string()))?;
    Ok(value
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| match entry {
                    Value::String(name) => Some(name.clone()),
                    Value::Object(map) => map.get("name").and_then(Value::as_str).map(str::to_string),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default())
}

/// Snapshot the warehouse reference list unchanged, as supplied by the ERP.
pub async fn write_warehouse_reference(kv: &dyn KvStore, descriptors: &Value) -> KvResult<()> {
    kv.set(WAREHOUSE_REFERENCE_KEY, &descriptors.to_string(), None)
        .await
}

/// Recompute and verify a hash entry's `data_hash` matches `H(normalize(data))`.
pub fn verify_hash_faithfulness(entry: &HashEntry) -> bool {
    content_hash(&entry.data) == entry.data_hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn write_both_round_trips() {
        let kv = MemoryStore::new();
        let cache = CacheStore::new(&kv);
        let value = json!({"name": "widget", "price": 10});
        let data_hash = content_hash(&value);

        cache
            .write_both(Family::Product, "WEB-1", &value, &data_hash, 1, None)
            .await
            .unwrap();

        let hash_entry = cache.read_hash(Family::Product, "WEB-1").await.unwrap().unwrap();
        assert_eq!(hash_entry.data, value);
        assert_eq!(hash_entry.data_hash, data_hash);
        assert_eq!(hash_entry.version, 1);
        assert!(verify_hash_faithfulness(&hash_entry));

        let simple = cache.read_simple(Family::Product, "WEB-1").await.unwrap().unwrap();
        assert_eq!(simple, value);
    }

    #[tokio::test]
    async fn bump_version_is_monotonic() {
        let kv = MemoryStore::new();
        let cache = CacheStore::new(&kv);
        let v1 = cache.bump_version(Family::Product, "X", None).await.unwrap();
        let v2 = cache.bump_version(Family::Product, "X", None).await.unwrap();
        assert_eq!(v1, 1);
        assert_eq!(v2, 2);
    }

    #[tokio::test]
    async fn delete_both_clears_both_views() {
        let kv = MemoryStore::new();
        let cache = CacheStore::new(&kv);
        let value = json!({"a": 1});
        cache
            .write_both(Family::Message, "M1", &value, &content_hash(&value), 1, None)
            .await
            .unwrap();
        cache.delete_both(Family::Message, "M1").await.unwrap();
        assert!(cache.read_hash(Family::Message, "M1").await.unwrap().is_none());
        assert!(cache.read_simple(Family::Message, "M1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn price_and_stock_use_legacy_simple_key_names() {
        let kv = MemoryStore::new();
        let cache = CacheStore::new(&kv);
        let value = json!([10, 8]);
        cache
            .write_both(Family::Price, "ITM-1", &value, &content_hash(&value), 1, None)
            .await
            .unwrap();
        assert_eq!(kv.get("price:ITM-1").await.unwrap(), Some(value.to_string()));
    }

    #[tokio::test]
    async fn warehouse_reference_accepts_plain_and_object_entries() {
        let kv = MemoryStore::new();
        write_warehouse_reference(
            &kv,
            &json!(["Idlib", {"name": "Homs", "lat": 34.7, "lng": 36.7}]),
        )
        .await
        .unwrap();
        let names = read_warehouse_reference(&kv).await.unwrap();
        assert_eq!(names, vec!["Idlib".to_string(), "Homs".to_string()]);
    }

    #[tokio::test]
    async fn missing_warehouse_reference_is_empty() {
        let kv = MemoryStore::new();
        assert_eq!(read_warehouse_reference(&kv).await.unwrap(), Vec::<String>::new());
    }
}
