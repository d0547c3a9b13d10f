//! # Auth Subsystem
//!
//! JWT issuance/verification, an OTP-based registration and login flow
//! (phone-based, not password-based — there is no password to validate
//! here), session bookkeeping in the KV store, and a small RBAC check
//! gating the handful of admin-only routes.
//!
//! ## Modules
//!
//! - `otp`: one-time-code generation, verification, and pluggable delivery
//! - `sessions`: JWT issuance/verification and KV-backed session tracking
//! - `rbac`: the `admin` role gate

pub mod otp;
pub mod rbac;
pub mod sessions;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::kv::{KvError, KvResult, KvStore};

/// Authentication and authorization error types.
#[derive(Debug, Error, Clone)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid or expired one-time code")]
    InvalidOtp,

    #[error("session expired")]
    SessionExpired,

    #[error("invalid session token")]
    InvalidToken,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("status downgrade rejected: {from} -> {to}")]
    DowngradeRejected { from: UserStatus, to: UserStatus },

    #[error("duplicate index: {0}")]
    DuplicateIndex(String),

    #[error("kv error: {0}")]
    Kv(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<KvError> for AuthError {
    fn from(err: KvError) -> Self {
        AuthError::Kv(err.to_string())
    }
}

/// The status ladder a user climbs. Transitions are monotonic: a later
/// status can never be assigned a lower one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Unregistered,
    Registered,
    ErpnextCustomer,
    Verified,
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UserStatus::Unregistered => "unregistered",
            UserStatus::Registered => "registered",
            UserStatus::ErpnextCustomer => "erpnext_customer",
            UserStatus::Verified => "verified",
        };
        f.write_str(s)
    }
}

/// A registered user record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub phone: String,
    pub email: Option<String>,
    pub username: Option<String>,
    pub google_id: Option<String>,
    pub device_id: Option<String>,
    pub status: UserStatus,
    pub role: Role,
}

/// Coarse role for RBAC purposes. Everything not explicitly `Admin` is
/// treated as an ordinary user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

fn user_key(id: &str) -> String {
    format!("user:{id}")
}

fn phone_index_key(phone: &str) -> String {
    format!("phone:{phone}")
}

fn email_index_key(email: &str) -> String {
    format!("email:{email}")
}

fn username_index_key(username: &str) -> String {
    format!("username:{username}")
}

fn device_index_key(device_id: &str) -> String {
    format!("device:{device_id}")
}

fn google_index_key(google_id: &str) -> String {
    format!("google:{google_id}")
}

/// The user store: primary record plus secondary pointers on every unique
/// identifier a client might authenticate with.
pub struct UserStore<'a> {
    kv: &'a dyn KvStore,
}

impl<'a> UserStore<'a> {
    pub fn new(kv: &'a dyn KvStore) -> Self {
        Self { kv }
    }

    pub async fn find_by_id(&self, id: &str) -> KvResult<Option<User>> {
        self.read_user(&user_key(id)).await
    }

    pub async fn find_by_phone(&self, phone: &str) -> KvResult<Option<User>> {
        self.find_by_index(&phone_index_key(phone)).await
    }

    pub async fn find_by_email(&self, email: &str) -> KvResult<Option<User>> {
        self.find_by_index(&email_index_key(email)).await
    }

    pub async fn find_by_username(&self, username: &str) -> KvResult<Option<User>> {
        self.find_by_index(&username_index_key(username)).await
    }

    pub async fn find_by_google_id(&self, google_id: &str) -> KvResult<Option<User>> {
        self.find_by_index(&google_index_key(google_id)).await
    }

    async fn find_by_index(&self, index_key: &str) -> KvResult<Option<User>> {
        match self.kv.get(index_key).await? {
            None => Ok(None),
            Some(id) => self.find_by_id(&id).await,
        }
    }

    async fn read_user(&self, key: &str) -> KvResult<Option<User>> {
        match self.kv.get(key).await? {
            None => Ok(None),
            Some(raw) => Ok(Some(
                serde_json::from_str(&raw).map_err(|e| KvError::Serialization(e.to_string()))?,
            )),
        }
    }

    /// Register a new user by phone number, rejecting a duplicate phone.
    /// Device and phone pointers are never removed, even after soft-delete,
    /// so a removed account can't be silently re-registered under the same
    /// identity.
    pub async fn register(&self, phone: &str, device_id: Option<&str>) -> Result<User, AuthError> {
        if self.kv.get(&phone_index_key(phone)).await?.is_some() {
            return Err(AuthError::DuplicateIndex(format!("phone {phone} already registered")));
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            phone: phone.to_string(),
            email: None,
            username: None,
            google_id: None,
            device_id: device_id.map(str::to_string),
            status: UserStatus::Unregistered,
            role: Role::User,
        };

        self.persist(&user).await?;
        self.kv.set(&phone_index_key(phone), &user.id, None).await?;
        if let Some(device_id) = device_id {
            self.kv.set(&device_index_key(device_id), &user.id, None).await?;
        }
        Ok(user)
    }

    async fn persist(&self, user: &User) -> KvResult<()> {
        let serialized = serde_json::to_string(user).map_err(|e| KvError::Serialization(e.to_string()))?;
        self.kv.set(&user_key(&user.id), &serialized, None).await
    }

    /// Advance a user's status. Rejects and logs any request that would
    /// move the ladder backwards.
    pub async fn advance_status(&self, id: &str, new_status: UserStatus) -> Result<User, AuthError> {
        let mut user = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| AuthError::Internal(format!("user {id} vanished mid-transition")))?;

        if new_status < user.status {
            tracing::warn!(user_id = %id, from = %user.status, to = %new_status, "rejected status downgrade");
            return Err(AuthError::DowngradeRejected { from: user.status, to: new_status });
        }

        user.status = new_status;
        self.persist(&user).await?;
        Ok(user)
    }

    /// Link a Google account to an existing user, rejecting a Google id
    /// already claimed by someone else.
    pub async fn link_google_id(&self, id: &str, google_id: &str) -> Result<User, AuthError> {
        if let Some(existing) = self.kv.get(&google_index_key(google_id)).await? {
            if existing != id {
                return Err(AuthError::DuplicateIndex(format!(
                    "google id {google_id} already linked"
                )));
            }
        }

        let mut user = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| AuthError::Internal(format!("user {id} vanished mid-link")))?;

        user.google_id = Some(google_id.to_string());
        self.persist(&user).await?;
        self.kv.set(&google_index_key(google_id), &user.id, None).await?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryStore;

    #[tokio::test]
    async fn register_then_find_by_phone() {
        let kv = MemoryStore::new();
        let store = UserStore::new(&kv);
        let user = store.register("+963911111111", Some("device-1")).await.unwrap();
        let found = store.find_by_phone("+963911111111").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
    }

    #[tokio::test]
    async fn duplicate_phone_is_rejected() {
        let kv = MemoryStore::new();
        let store = UserStore::new(&kv);
        store.register("+963911111111", None).await.unwrap();
        let result = store.register("+963911111111", None).await;
        assert!(matches!(result, Err(AuthError::DuplicateIndex(_))));
    }

    #[tokio::test]
    async fn status_advances_monotonically() {
        let kv = MemoryStore::new();
        let store = UserStore::new(&kv);
        let user = store.register("+963911111111", None).await.unwrap();
        let advanced = store.advance_status(&user.id, UserStatus::Registered).await.unwrap();
        assert_eq!(advanced.status, UserStatus::Registered);
    }

    #[tokio::test]
    async fn link_google_id_then_find_by_google_id() {
        let kv = MemoryStore::new();
        let store = UserStore::new(&kv);
        let user = store.register("+963911111111", None).await.unwrap();
        store.link_google_id(&user.id, "google-oauth-1").await.unwrap();
        let found = store.find_by_google_id("google-oauth-1").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
    }

    #[tokio::test]
    async fn duplicate_google_id_is_rejected() {
        let kv = MemoryStore::new();
        let store = UserStore::new(&kv);
        let a = store.register("+963911111111", None).await.unwrap();
        let b = store.register("+963922222222", None).await.unwrap();
        store.link_google_id(&a.id, "google-oauth-1").await.unwrap();
        let result = store.link_google_id(&b.id, "google-oauth-1").await;
        assert!(matches!(result, Err(AuthError::DuplicateIndex(_))));
    }

    #[tokio::test]
    async fn downgrade_is_rejected() {
        let kv = MemoryStore::new();
        let store = UserStore::new(&kv);
        let user = store.register("+963911111111", None).await.unwrap();
        store.advance_status(&user.id, UserStatus::Verified).await.unwrap();
        let result = store.advance_status(&user.id, UserStatus::Registered).await;
        assert!(matches!(result, Err(AuthError::DowngradeRejected { .. })));
    }
}
