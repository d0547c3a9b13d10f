//! JWT issuance/verification and KV-backed session tracking.
//!
//! Access and refresh tokens both carry `user_id` and `status` claims so a
//! handler can make authorization decisions without a round trip to the
//! user store. Each issued token is additionally recorded under
//! `session:<token_id>` with a TTL equal to its own lifetime, so token
//! revocation is a single key delete and expired sessions clean themselves
//! up without a sweep.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{AuthError, UserStatus};
use crate::config::JwtConfig;
use crate::kv::KvStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub status: UserStatus,
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub jti: String,
}

/// An issued access/refresh pair.
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

fn session_key(token_id: &str) -> String {
    format!("session:{token_id}")
}

fn issue_one(
    config: &JwtConfig,
    user_id: &str,
    status: UserStatus,
    token_type: TokenType,
    lifetime: std::time::Duration,
) -> Result<(String, String), AuthError> {
    let jti = Uuid::new_v4().to_string();
    let now = chrono::Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        status,
        token_type,
        iat: now.timestamp(),
        exp: (now + chrono::Duration::from_std(lifetime).unwrap_or_default()).timestamp(),
        iss: config.issuer.clone(),
        jti: jti.clone(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| AuthError::Internal(e.to_string()))?;
    Ok((token, jti))
}

/// Issue a fresh access/refresh token pair for `user_id`, recording both
/// as live sessions in the KV store.
pub async fn issue_tokens(
    kv: &dyn KvStore,
    config: &JwtConfig,
    user_id: &str,
    status: UserStatus,
) -> Result<TokenPair, AuthError> {
    let (access_token, access_jti) =
        issue_one(config, user_id, status, TokenType::Access, config.access_token_lifetime)?;
    let (refresh_token, refresh_jti) =
        issue_one(config, user_id, status, TokenType::Refresh, config.refresh_token_lifetime)?;

    kv.set(&session_key(&access_jti), user_id, Some(config.access_token_lifetime))
        .await?;
    kv.set(&session_key(&refresh_jti), user_id, Some(config.refresh_token_lifetime))
        .await?;

    Ok(TokenPair { access_token, refresh_token })
}

/// Verify a token's signature, expiry, and that its session hasn't been
/// revoked (i.e. the `session:<jti>` key is still present).
pub async fn verify_token(kv: &dyn KvStore, config: &JwtConfig, token: &str) -> Result<Claims, AuthError> {
    let mut validation = Validation::default();
    validation.set_issuer(&[config.issuer.clone()]);
    let decoded = decode::<Claims>(token, &DecodingKey::from_secret(config.secret.as_bytes()), &validation)
        .map_err(|_| AuthError::InvalidToken)?;

    let claims = decoded.claims;
    match kv.get(&session_key(&claims.jti)).await? {
        Some(_) => Ok(claims),
        None => Err(AuthError::SessionExpired),
    }
}

/// Revoke a session immediately, ahead of its natural TTL expiry.
pub async fn revoke(kv: &dyn KvStore, jti: &str) -> Result<(), AuthError> {
    kv.del(&session_key(jti)).await?;
    Ok(())
}
