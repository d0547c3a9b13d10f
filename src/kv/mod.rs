//! # KV Store Adapter
//!
//! Every other component reaches persistence only through the [`KvStore`]
//! trait. Two backends implement it: [`memory::MemoryStore`] (an in-process
//! `dashmap`-backed store used by tests and single-node deployments) and
//! [`redis_backend::RedisStore`] (a pooled, async Redis client used in
//! production). Selection is a configuration switch (`config::KvConfig`),
//! never a recompile.
//!
//! All primitives are single-key atomic; nothing here is transactional
//! across keys. The ordering discipline that makes multi-key writes safe
//! without transactions lives in `cache::CacheStore::write_both` and is
//! documented there.

pub mod memory;
pub mod redis_backend;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// KV adapter errors. Backend-specific failures (connection loss, protocol
/// errors) are folded into `Backend`; callers only need to distinguish
/// "missing" from "unreachable" from "couldn't decode what came back".
#[derive(Debug, Error, Clone)]
pub enum KvError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("kv backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type KvResult<T> = Result<T, KvError>;

/// A single append-only stream entry as returned by `xread`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Monotonic id assigned by the store at append time.
    pub id: u64,
    pub fields: HashMap<String, String>,
}

/// The minimal primitive set the core relies on.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a string value.
    async fn get(&self, key: &str) -> KvResult<Option<String>>;

    /// Write a string value with an optional TTL.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> KvResult<()>;

    /// Delete a key (string, hash, or set — whatever it is).
    async fn del(&self, key: &str) -> KvResult<()>;

    /// Set a single field in a hash (field map).
    async fn hset(&self, key: &str, field: &str, value: &str) -> KvResult<()>;

    /// Read every field of a hash. Empty map if the key doesn't exist.
    async fn hgetall(&self, key: &str) -> KvResult<HashMap<String, String>>;

    /// Atomically increment an integer field, returning the new value.
    /// If the hash or field doesn't exist yet, it is created starting at 0.
    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> KvResult<i64>;

    /// Add a member to a set.
    async fn sadd(&self, key: &str, member: &str) -> KvResult<()>;

    /// Remove a member from a set.
    async fn srem(&self, key: &str, member: &str) -> KvResult<()>;

    /// List all members of a set.
    async fn smembers(&self, key: &str) -> KvResult<Vec<String>>;

    /// Append an entry to a stream, returning the assigned monotonic id.
    async fn xadd(&self, stream: &str, fields: HashMap<String, String>) -> KvResult<u64>;

    /// Read forward from a stream starting strictly after `from_id`
    /// (`from_id = 0` returns every entry ever appended, modulo pruning),
    /// up to `count` entries in ascending id order.
    async fn xread(&self, stream: &str, from_id: u64, count: usize) -> KvResult<Vec<StreamEntry>>;

    /// Set a TTL on an existing key.
    async fn expire(&self, key: &str, ttl: Duration) -> KvResult<()>;

    /// Clear any TTL on an existing key, making it persistent.
    async fn persist(&self, key: &str) -> KvResult<()>;
}
