//! # Top-Level Error Taxonomy
//!
//! Every component in this crate defines its own `thiserror`-derived error
//! enum scoped to its own failure modes (`KvError`, `ErpError`, `AuthError`,
//! ...). `AppError` is the taxonomy those component errors fold into at the
//! HTTP boundary (see `api::responses`), matching the kinds enumerated for
//! the service as a whole: validation, not-found, conflict, auth, transient
//! upstream, permanent upstream, and internal.

use axum::http::StatusCode;
use thiserror::Error;

use crate::auth::AuthError;
use crate::erp::ErpError;
use crate::kv::KvError;

/// Operational error kind, independent of which component raised it.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request shape or out-of-range value. Never retried server-side.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Resource absent in ERP or cache.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate unique index (email/username/phone/device).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Credentials invalid or account disabled.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not permitted.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// ERP/KV reachable but returned 5xx or timed out. Safe to retry.
    #[error("transient upstream failure: {0}")]
    Transient(String),

    /// ERP returned a definitive 4xx on a known-valid id. Not retried.
    #[error("permanent upstream failure: {0}")]
    Permanent(String),

    /// Programmer error or unexpected condition.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status this error kind maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Transient(_) => StatusCode::BAD_GATEWAY,
            AppError::Permanent(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable code for the response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::Transient(_) => "transient_upstream",
            AppError::Permanent(_) => "permanent_upstream",
            AppError::Internal(_) => "internal",
        }
    }
}

impl From<KvError> for AppError {
    fn from(err: KvError) -> Self {
        match err {
            KvError::NotFound(k) => AppError::NotFound(k),
            KvError::Backend(msg) => AppError::Transient(msg),
            KvError::Serialization(msg) => AppError::Internal(msg),
        }
    }
}

impl From<ErpError> for AppError {
    fn from(err: ErpError) -> Self {
        match err {
            ErpError::Transient(msg) => AppError::Transient(msg),
            ErpError::Permanent(msg) => AppError::Permanent(msg),
            ErpError::Decode(msg) => AppError::Internal(msg),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials | AuthError::InvalidOtp => {
                AppError::Unauthorized(err.to_string())
            }
            AuthError::SessionExpired | AuthError::InvalidToken => {
                AppError::Unauthorized(err.to_string())
            }
            AuthError::PermissionDenied(_) => AppError::Forbidden(err.to_string()),
            AuthError::DowngradeRejected { .. } => AppError::Conflict(err.to_string()),
            AuthError::DuplicateIndex(_) => AppError::Conflict(err.to_string()),
            AuthError::Kv(msg) | AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}
