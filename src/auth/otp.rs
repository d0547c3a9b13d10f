//! One-time-code generation, verification, and delivery.
//!
//! Codes are 6 digits, stored as a SHA-256 hash (never in plaintext) under
//! `otp:<phone>` with a short TTL, and rejected after a bounded number of
//! verification attempts. Delivery is a pluggable trait — concrete SMS or
//! WhatsApp senders live outside this crate; the default implementation
//! just logs the code, which is sufficient for local development and for
//! exercising the registration flow in tests.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::auth::AuthError;
use crate::kv::KvStore;

const OTP_TTL: Duration = Duration::from_secs(300);
const MAX_ATTEMPTS: u32 = 5;

fn otp_key(phone: &str) -> String {
    format!("otp:{phone}")
}

fn attempts_key(phone: &str) -> String {
    format!("otp_attempts:{phone}")
}

fn hash_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

/// Somewhere to actually deliver a one-time code to a user.
#[async_trait]
pub trait OtpSender: Send + Sync {
    async fn send(&self, phone: &str, code: &str);
}

/// Development/test default: logs the code instead of sending it.
pub struct LoggingSender;

#[async_trait]
impl OtpSender for LoggingSender {
    async fn send(&self, phone: &str, code: &str) {
        tracing::info!(phone = %phone, code = %code, "OTP delivery (logging sender)");
    }
}

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    format!("{:06}", rng.gen_range(0..1_000_000))
}

/// Issue a fresh OTP for `phone`, store its hash with a TTL, and hand it to
/// `sender` for delivery. Issuing a new code resets the attempt counter.
pub async fn issue(kv: &dyn KvStore, sender: &dyn OtpSender, phone: &str) -> Result<(), AuthError> {
    let code = generate_code();
    kv.set(&otp_key(phone), &hash_code(&code), Some(OTP_TTL)).await?;
    kv.del(&attempts_key(phone)).await.ok();
    sender.send(phone, &code).await;
    Ok(())
}

/// Verify a submitted code against the stored hash. Consumes the code on
/// success (it can't be replayed); increments an attempt counter on
/// failure and rejects outright once the bound is exceeded.
pub async fn verify(kv: &dyn KvStore, phone: &str, submitted: &str) -> Result<(), AuthError> {
    let attempts = kv.hincrby(&attempts_key(phone), "count", 1).await.unwrap_or(0);
    if attempts > MAX_ATTEMPTS as i64 {
        return Err(AuthError::InvalidOtp);
    }

    let stored = kv.get(&otp_key(phone)).await?.ok_or(AuthError::InvalidOtp)?;
    if stored != hash_code(submitted) {
        return Err(AuthError::InvalidOtp);
    }

    kv.del(&otp_key(phone)).await.ok();
    kv.del(&attempts_key(phone)).await.ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryStore;
    use std::sync::Mutex;

    struct CapturingSender {
        captured: Mutex<Option<String>>,
    }

    #[async_trait]
    impl OtpSender for CapturingSender {
        async fn send(&self, _phone: &str, code: &str) {
            *self.captured.lock().unwrap() = Some(code.to_string());
        }
    }

    #[tokio::test]
    async fn issued_code_verifies_successfully() {
        let kv = MemoryStore::new();
        let sender = CapturingSender { captured: Mutex::new(None) };
        issue(&kv, &sender, "+963911111111").await.unwrap();
        let code = sender.captured.lock().unwrap().clone().unwrap();
        verify(&kv, "+963911111111", &code).await.unwrap();
    }

    #[tokio::test]
    async fn code_cannot_be_replayed() {
        let kv = MemoryStore::new();
        let sender = CapturingSender { captured: Mutex::new(None) };
        issue(&kv, &sender, "+963911111111").await.unwrap();
        let code = sender.captured.lock().unwrap().clone().unwrap();
        verify(&kv, "+963911111111", &code).await.unwrap();
        let replay = verify(&kv, "+963911111111", &code).await;
        assert!(matches!(replay, Err(AuthError::InvalidOtp)));
    }

    #[tokio::test]
    async fn wrong_code_is_rejected() {
        let kv = MemoryStore::new();
        let sender = LoggingSender;
        issue(&kv, &sender, "+963911111111").await.unwrap();
        let result = verify(&kv, "+963911111111", "000000").await;
        assert!(matches!(result, Err(AuthError::InvalidOtp)));
    }

    #[tokio::test]
    async fn too_many_attempts_locks_out_verification() {
        let kv = MemoryStore::new();
        let sender = LoggingSender;
        issue(&kv, &sender, "+963911111111").await.unwrap();
        for _ in 0..MAX_ATTEMPTS {
            let _ = verify(&kv, "+963911111111", "wrong!").await;
        }
        let result = verify(&kv, "+963911111111", "wrong!").await;
        assert!(matches!(result, Err(AuthError::InvalidOtp)));
    }
}
