//! # Rate Limiting
//!
//! A token-bucket limiter backed by the KV store so quota is shared across
//! server instances rather than per-process. Each client (identified by
//! whatever key the HTTP layer resolves -- API key, user id, or source IP)
//! gets a fixed budget per fixed window; the counter is a simple `hincrby`
//! with the window's TTL set on first increment, which is racy under true
//! concurrency (two requests can both observe the pre-increment count) but
//! converges to roughly the configured rate, matching the token-bucket's
//! approximate-not-exact contract.

use std::time::Duration;

use crate::kv::{KvResult, KvStore};

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow { remaining: u32 },
    Deny { retry_after: Duration },
}

fn bucket_key(client_key: &str, window_start_secs: u64) -> String {
    format!("ratelimit:{client_key}:{window_start_secs}")
}

/// Check and consume one unit of quota for `client_key`. `window` buckets
/// are aligned to epoch time (`now / window`), so all requests within the
/// same window share one counter that expires on its own.
pub async fn check(
    kv: &dyn KvStore,
    client_key: &str,
    limit: u32,
    window: Duration,
    now: Duration,
) -> KvResult<Decision> {
    let window_secs = window.as_secs().max(1);
    let window_start = (now.as_secs() / window_secs) * window_secs;
    let key = bucket_key(client_key, window_start);

    let count = kv.hincrby(&key, "count", 1).await?;
    if count == 1 {
        kv.expire(&key, window).await.ok();
    }

    if count as u32 > limit {
        let elapsed_in_window = now.as_secs() - window_start;
        let retry_after = Duration::from_secs(window_secs.saturating_sub(elapsed_in_window));
        return Ok(Decision::Deny { retry_after });
    }

    Ok(Decision::Allow { remaining: limit.saturating_sub(count as u32) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryStore;

    #[tokio::test]
    async fn requests_within_quota_are_allowed() {
        let kv = MemoryStore::new();
        for _ in 0..3 {
            let decision = check(&kv, "client-1", 3, Duration::from_secs(60), Duration::from_secs(0))
                .await
                .unwrap();
            assert!(matches!(decision, Decision::Allow { .. }));
        }
    }

    #[tokio::test]
    async fn request_past_quota_is_denied() {
        let kv = MemoryStore::new();
        for _ in 0..3 {
            check(&kv, "client-1", 3, Duration::from_secs(60), Duration::from_secs(0))
                .await
                .unwrap();
        }
        let decision = check(&kv, "client-1", 3, Duration::from_secs(60), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(matches!(decision, Decision::Deny { .. }));
    }

    #[tokio::test]
    async fn distinct_clients_have_independent_quotas() {
        let kv = MemoryStore::new();
        for _ in 0..3 {
            check(&kv, "client-1", 3, Duration::from_secs(60), Duration::from_secs(0))
                .await
                .unwrap();
        }
        let decision = check(&kv, "client-2", 3, Duration::from_secs(60), Duration::from_secs(0))
            .await
            .unwrap();
        assert!(matches!(decision, Decision::Allow { .. }));
    }

    #[tokio::test]
    async fn a_new_window_resets_the_quota() {
        let kv = MemoryStore::new();
        for _ in 0..3 {
            check(&kv, "client-1", 3, Duration::from_secs(10), Duration::from_secs(0))
                .await
                .unwrap();
        }
        let decision = check(&kv, "client-1", 3, Duration::from_secs(10), Duration::from_secs(11))
            .await
            .unwrap();
        assert!(matches!(decision, Decision::Allow { .. }));
    }
}
