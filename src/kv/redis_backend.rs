//! Redis-backed implementation of [`KvStore`], used in production
//! deployments. Strings/hashes/sets map onto native Redis types; streams map
//! onto Redis Streams (`XADD`/`XRANGE`), which already provide the
//! monotonic-id-per-append semantics the core relies on.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{KvError, KvResult, KvStore, StreamEntry};

/// Field name used to store the serialized fields payload inside each Redis
/// Stream entry (Redis Streams are themselves field maps, so a single
/// well-known field carries our caller-supplied field map as JSON).
const STREAM_PAYLOAD_FIELD: &str = "payload";

pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> KvResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| KvError::Backend(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| KvError::Backend(e.to_string()))?;
        Ok(Self { conn })
    }
}

fn backend_err(e: redis::RedisError) -> KvError {
    KvError::Backend(e.to_string())
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(backend_err)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> KvResult<()> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => {
                let _: () = conn
                    .set_ex(key, value, ttl.as_secs().max(1))
                    .await
                    .map_err(backend_err)?;
            }
            None => {
                let _: () = conn.set(key, value).await.map_err(backend_err)?;
            }
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> KvResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await.map_err(backend_err)?;
        Ok(())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> KvResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset(key, field, value).await.map_err(backend_err)?;
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> KvResult<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        conn.hgetall(key).await.map_err(backend_err)
    }

    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> KvResult<i64> {
        let mut conn = self.conn.clone();
        conn.hincr(key, field, delta).await.map_err(backend_err)
    }

    async fn sadd(&self, key: &str, member: &str) -> KvResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.sadd(key, member).await.map_err(backend_err)?;
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> KvResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.srem(key, member).await.map_err(backend_err)?;
        Ok(())
    }

    async fn smembers(&self, key: &str) -> KvResult<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.smembers(key).await.map_err(backend_err)
    }

    async fn xadd(&self, stream: &str, fields: HashMap<String, String>) -> KvResult<u64> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(&fields)
            .map_err(|e| KvError::Serialization(e.to_string()))?;
        let id: String = conn
            .xadd(stream, "*", &[(STREAM_PAYLOAD_FIELD, payload)])
            .await
            .map_err(backend_err)?;
        parse_stream_id(&id)
    }

    async fn xread(&self, stream: &str, from_id: u64, count: usize) -> KvResult<Vec<StreamEntry>> {
        let mut conn = self.conn.clone();
        // Redis Streams IDs are "<ms>-<seq>"; exclusive-from is expressed as
        // "(<from_id>-0" to mirror from_id's meaning of "strictly after".
        let start = format!("({}-0", from_id);
        let raw: Vec<(String, Vec<(String, String)>)> = redis::cmd("XRANGE")
            .arg(stream)
            .arg(start)
            .arg("+")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;

        raw.into_iter()
            .map(|(id, fields)| {
                let id = parse_stream_id(&id)?;
                let payload = fields
                    .into_iter()
                    .find(|(f, _)| f == STREAM_PAYLOAD_FIELD)
                    .map(|(_, v)| v)
                    .unwrap_or_default();
                let fields: HashMap<String, String> = serde_json::from_str(&payload)
                    .map_err(|e| KvError::Serialization(e.to_string()))?;
                Ok(StreamEntry { id, fields })
            })
            .collect()
    }

    async fn expire(&self, key: &str, ttl: Duration) -> KvResult<()> {
        let mut conn = self.conn.clone();
        let _: bool = conn
            .expire(key, ttl.as_secs() as i64)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn persist(&self, key: &str) -> KvResult<()> {
        let mut conn = self.conn.clone();
        let _: bool = conn.persist(key).await.map_err(backend_err)?;
        Ok(())
    }
}

/// Redis Stream ids are `"<ms>-<seq>"`. We fold both components into a
/// single monotonic `u64` cursor: `ms * 10_000 + seq` (seq rarely exceeds a
/// handful per millisecond under our write volume).
fn parse_stream_id(id: &str) -> KvResult<u64> {
    let (ms, seq) = id
        .split_once('-')
        .ok_or_else(|| KvError::Serialization(format!("malformed stream id: {id}")))?;
    let ms: u64 = ms
        .parse()
        .map_err(|_| KvError::Serialization(format!("malformed stream id: {id}")))?;
    let seq: u64 = seq
        .parse()
        .map_err(|_| KvError::Serialization(format!("malformed stream id: {id}")))?;
    Ok(ms * 10_000 + seq)
}
