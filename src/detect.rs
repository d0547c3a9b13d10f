//! # Change Detector
//!
//! Classifies a proposed new value against the stored hash entry. This is
//! the pure decision function at the center of the pipeline; it depends only
//! on [`crate::cache::CacheStore`] reads, never on the ERP fetcher or
//! transformer.

use serde::Serialize;
use serde_json::Value;

use crate::cache::{CacheStore, Family, HashEntry};
use crate::hash::{content_hash, hashes_equal};
use crate::kv::KvResult;

/// Outcome of comparing a candidate value against the current cache state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// No hash entry exists yet; this is the entity's first write.
    Create,
    /// The data actually changed.
    Mismatch,
    /// The hash entry matches the candidate's hash, but the simple key has
    /// drifted out from under it (manual edit). Rare; forces reconvergence.
    SilentDrift,
    /// Nothing to do.
    NoChange,
}

impl Outcome {
    /// Whether this outcome should run the write-and-append pipeline.
    pub fn triggers_commit(&self) -> bool {
        !matches!(self, Outcome::NoChange)
    }
}

/// Classify `candidate` against the current hash entry for `(family, id)`.
pub async fn classify(
    cache: &CacheStore<'_>,
    family: Family,
    id: &str,
    candidate: &Value,
) -> KvResult<(Outcome, String, Option<HashEntry>)> {
    let existing = cache.read_hash(family, id).await?;
    let new_hash = content_hash(candidate);

    let Some(entry) = existing else {
        return Ok((Outcome::Create, new_hash, None));
    };

    if hashes_equal(&entry.data_hash, &new_hash) {
        let simple = cache.read_simple(family, id).await?;
        let drifted = match &simple {
            None => true,
            Some(simple_value) => simple_value != candidate,
        };
        if drifted {
            return Ok((Outcome::SilentDrift, new_hash, Some(entry)));
        }
        return Ok((Outcome::NoChange, new_hash, Some(entry)));
    }

    Ok((Outcome::Mismatch, new_hash, Some(entry)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn first_write_is_create() {
        let kv = MemoryStore::new();
        let cache = CacheStore::new(&kv);
        let (outcome, _, existing) =
            classify(&cache, Family::Product, "A", &json!({"x": 1})).await.unwrap();
        assert_eq!(outcome, Outcome::Create);
        assert!(existing.is_none());
    }

    #[tokio::test]
    async fn identical_replay_is_no_change() {
        let kv = MemoryStore::new();
        let cache = CacheStore::new(&kv);
        let value = json!({"x": 1});
        let h = content_hash(&value);
        cache
            .write_both(Family::Product, "A", &value, &h, 1, None)
            .await
            .unwrap();

        let (outcome, _, _) = classify(&cache, Family::Product, "A", &value).await.unwrap();
        assert_eq!(outcome, Outcome::NoChange);
    }

    #[tokio::test]
    async fn changed_value_is_mismatch() {
        let kv = MemoryStore::new();
        let cache = CacheStore::new(&kv);
        let v1 = json!({"x": 1});
        cache
            .write_both(Family::Product, "A", &v1, &content_hash(&v1), 1, None)
            .await
            .unwrap();

        let v2 = json!({"x": 2});
        let (outcome, _, _) = classify(&cache, Family::Product, "A", &v2).await.unwrap();
        assert_eq!(outcome, Outcome::Mismatch);
    }

    #[tokio::test]
    async fn manually_rewritten_simple_key_triggers_silent_drift() {
        let kv = MemoryStore::new();
        let cache = CacheStore::new(&kv);
        let value = json!({"x": 1});
        let h = content_hash(&value);
        cache
            .write_both(Family::Product, "A", &value, &h, 1, None)
            .await
            .unwrap();

        // Operator hand-edits the simple key directly; the hash entry is
        // untouched.
        kv.set("product:A", &json!({"x": 99}).to_string(), None)
            .await
            .unwrap();

        let (outcome, new_hash, existing) =
            classify(&cache, Family::Product, "A", &value).await.unwrap();
        assert_eq!(outcome, Outcome::SilentDrift);
        assert_eq!(new_hash, h);
        assert_eq!(existing.unwrap().data_hash, h);
    }

    #[tokio::test]
    async fn missing_simple_key_with_matching_hash_is_silent_drift() {
        let kv = MemoryStore::new();
        let cache = CacheStore::new(&kv);
        let value = json!({"x": 1});
        let h = content_hash(&value);
        cache
            .write_both(Family::Product, "A", &value, &h, 1, None)
            .await
            .unwrap();
        kv.del("product:A").await.unwrap();

        let (outcome, ..) = classify(&cache, Family::Product, "A", &value).await.unwrap();
        assert_eq!(outcome, Outcome::SilentDrift);
    }
}
