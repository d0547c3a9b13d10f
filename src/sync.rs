//! # Sync Protocol
//!
//! The client-facing contract: a client replays a family's change log from
//! a cursor and gets back only the entries it actually needs to converge to
//! the current cache state. This is what makes the protocol robust to
//! re-sends, reorderings within equivalence classes, and long client
//! offline periods.
//!
//! Within one read window an entity can appear more than once -- a revert
//! (`P0 -> P1 -> P0`), a silent-drift reconvergence, or a race between two
//! concurrent writers (see the ordering discipline in `crate::pipeline`).
//! Only the *last* occurrence of a given entity in the window determines
//! what's delivered; earlier occurrences are fully superseded and exist
//! only to advance the cursor. The surviving occurrence is always resolved
//! against the live cache, never against its own stream-recorded hash --
//! that's what lets a client see exactly one delta per entity per sync call
//! even when several changes landed between polls.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::cache::{CacheStore, Family};
use crate::hash::content_hash;
use crate::kv::{KvResult, KvStore};
use crate::stream::StreamManager;
use std::collections::HashMap;

/// One packaged change, ready to hand to a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Delta {
    pub entity_id: String,
    pub version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

/// The full sync response: entries plus the cursor to resume from next.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncResponse {
    pub entries: Vec<Delta>,
    pub next_stream_id: u64,
    pub more: bool,
}

/// A multiple of the caller's requested page size to over-read from the
/// stream by, so that entries collapsed during dedup don't starve a
/// response that could otherwise have been filled. Bounded so a very
/// sparse family can't force an unbounded stream scan.
const OVERREAD_FACTOR: usize = 4;
const MAX_OVERREAD: usize = 500;

/// Compute the deletion marker's canonical hash for `entity_id`: the hash
/// protocol treats a deletion as content, not as the absence of content.
pub fn deletion_hash(entity_id: &str) -> String {
    content_hash(&json!({"deleted": true, "entity_id": entity_id}))
}

/// Run the sync pipeline for `family` starting at `from_stream_id`,
/// returning at most `max_entries` packaged deltas.
pub async fn sync(
    kv: &dyn KvStore,
    family: Family,
    from_stream_id: u64,
    max_entries: usize,
) -> KvResult<SyncResponse> {
    if max_entries == 0 {
        return Ok(SyncResponse {
            entries: Vec::new(),
            next_stream_id: from_stream_id,
            more: false,
        });
    }

    let streams = StreamManager::new(kv);
    let cache = CacheStore::new(kv);
    let overread = (max_entries * OVERREAD_FACTOR).min(MAX_OVERREAD).max(max_entries);

    let raw_entries = streams.read(family, from_stream_id, overread).await?;

    let mut last_index: HashMap<&str, usize> = HashMap::new();
    for (i, e) in raw_entries.iter().enumerate() {
        last_index.insert(e.entity_id.as_str(), i);
    }

    let mut cursor = from_stream_id;
    let mut entries = Vec::with_capacity(max_entries);
    let mut more = false;

    for (i, entry) in raw_entries.iter().enumerate() {
        if entries.len() >= max_entries {
            more = true;
            break;
        }
        cursor = entry.stream_id;

        // An earlier occurrence of this entity recurs later in the window;
        // whatever it would have produced is superseded by that later one.
        if last_index.get(entry.entity_id.as_str()) != Some(&i) {
            continue;
        }

        match cache.read_hash(family, &entry.entity_id).await? {
            Some(hash_entry) if hash_entry.data_hash == deletion_hash(&entry.entity_id) => {
                entries.push(Delta {
                    entity_id: entry.entity_id.clone(),
                    version: hash_entry.version,
                    data: None,
                    deleted: true,
                });
            }
            Some(hash_entry) => {
                entries.push(Delta {
                    entity_id: entry.entity_id.clone(),
                    version: hash_entry.version,
                    data: Some(hash_entry.data),
                    deleted: false,
                });
            }
            None => {
                // Hard-deleted catalog entity (hash entry removed outright)
                // or one that vanished between the entry's commit and this
                // read; either way the client needs to retire it once.
                entries.push(Delta {
                    entity_id: entry.entity_id.clone(),
                    version: entry.version,
                    data: None,
                    deleted: true,
                });
            }
        }
    }

    if !more {
        more = raw_entries.len() == overread
            && streams.read(family, cursor, 1).await?.first().is_some();
    }

    Ok(SyncResponse {
        entries,
        next_stream_id: cursor,
        more,
    })
}
