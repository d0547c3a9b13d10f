//! # Detect-and-Commit Pipeline
//!
//! The single routine both the webhook handler and full refresh drive: run
//! change detection, and if it triggers a commit, bump the version, write
//! both cache views, and append a stream entry. Extracted once so the two
//! callers can never drift on ordering or on what counts as "changed".

use serde::Serialize;
use serde_json::Value;

use crate::cache::{CacheStore, Family};
use crate::detect::{classify, Outcome};
use crate::kv::KvResult;
use crate::stream::StreamManager;

/// Result of running the pipeline for one `(family, id)` candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitResult {
    pub changed: bool,
    pub outcome: Outcome,
    pub version: u64,
    pub stream_id: Option<u64>,
}

/// Run detection against `candidate` and, if it calls for a commit, write
/// both cache views and append a stream entry. `ttl` is the per-family TTL
/// resolved by the caller from configuration.
pub async fn detect_and_commit(
    kv: &dyn crate::kv::KvStore,
    family: Family,
    id: &str,
    candidate: &Value,
    ttl: Option<std::time::Duration>,
) -> KvResult<CommitResult> {
    let cache = CacheStore::new(kv);
    let streams = StreamManager::new(kv);

    let (outcome, new_hash, existing) = classify(&cache, family, id, candidate).await?;

    if !outcome.triggers_commit() {
        let version = existing.map(|e| e.version).unwrap_or(0);
        return Ok(CommitResult {
            changed: false,
            outcome,
            version,
            stream_id: None,
        });
    }

    let version = cache.bump_version(family, id, existing.as_ref()).await?;
    cache
        .write_both(family, id, candidate, &new_hash, version, ttl)
        .await?;

    let stream_id = Some(streams.append(family, id, &new_hash, version).await?);

    Ok(CommitResult {
        changed: true,
        outcome,
        version,
        stream_id,
    })
}
