//! # Request Handlers
//!
//! One function per endpoint in the table documented on [`super::routes`].
//! Handlers do the HTTP-specific work (extracting query params, mapping a
//! domain error to the envelope) and otherwise delegate straight into the
//! core modules — no business logic lives here.

use std::sync::Arc;

use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::responses::{ApiResponse, ApiResult};
use crate::api::routes::AppState;
use crate::api::webhooks::{handle_erpnext_webhook, handle_legacy_price_update, ErpWebhookEnvelope, LegacyPriceUpdate};
use crate::auth::sessions::{issue_tokens, Claims};
use crate::auth::{otp, UserStatus, UserStore};
use crate::cache::{read_warehouse_reference, CacheStore, Family};
use crate::error::AppError;
use crate::pipeline::CommitResult;
use crate::refresh::{run_full_refresh, RefreshSummary};
use crate::sync::{sync, SyncResponse};
use crate::users::{create_message, delete_message, list_messages, MessagePage};

// ---------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health(State(_state): State<Arc<AppState>>) -> ApiResult<HealthBody> {
    Ok(ApiResponse::ok(HealthBody { status: "ok", version: crate::VERSION }))
}

#[derive(Debug, Serialize)]
pub struct CertificateInfoBody {
    pub fingerprint: Option<String>,
}

/// Reports the TLS certificate fingerprint currently in effect: an
/// operator override written by the admin CLI's `cert-rotate` command,
/// or the startup configuration value if no override has been recorded.
pub async fn certificate_info(State(state): State<Arc<AppState>>) -> ApiResult<CertificateInfoBody> {
    let fingerprint = match state
        .kv
        .get(crate::config::CERTIFICATE_FINGERPRINT_KEY)
        .await
        .map_err(AppError::from)?
    {
        Some(value) => Some(value),
        None => state.config.certificate_fingerprint.clone(),
    };
    Ok(ApiResponse::ok(CertificateInfoBody { fingerprint }))
}

// ---------------------------------------------------------------------
// Webhooks
// ---------------------------------------------------------------------

pub async fn webhook_erpnext(
    State(state): State<Arc<AppState>>,
    Json(envelope): Json<ErpWebhookEnvelope>,
) -> ApiResult<CommitResult> {
    let entity_type = envelope.entity_type.clone();
    let result = handle_erpnext_webhook(state.kv.as_ref(), state.erp.as_ref(), &state.config, envelope).await?;
    state.analytics.record_webhook(&entity_type, result.changed);
    Ok(ApiResponse::ok(result))
}

pub async fn webhook_price_update(
    State(state): State<Arc<AppState>>,
    Json(update): Json<LegacyPriceUpdate>,
) -> ApiResult<CommitResult> {
    let result = handle_legacy_price_update(state.kv.as_ref(), &state.config, update).await?;
    state.analytics.record_webhook("price", result.changed);
    Ok(ApiResponse::ok(result))
}

// ---------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SyncQuery {
    #[serde(default)]
    pub from: u64,
    pub max: Option<usize>,
}

const DEFAULT_SYNC_PAGE: usize = 100;

fn parse_family(raw: &str) -> Result<Family, AppError> {
    match raw {
        "product" => Ok(Family::Product),
        "price" => Ok(Family::Price),
        "stock" => Ok(Family::Stock),
        "hero" => Ok(Family::Hero),
        "bundle" => Ok(Family::Bundle),
        "home" => Ok(Family::Home),
        "message" => Ok(Family::Message),
        other => Err(AppError::Validation(format!("unknown family `{other}`"))),
    }
}

pub async fn sync_family(
    State(state): State<Arc<AppState>>,
    Path(family): Path<String>,
    Query(query): Query<SyncQuery>,
) -> ApiResult<SyncResponse> {
    let family = parse_family(&family)?;
    let max = query.max.unwrap_or(DEFAULT_SYNC_PAGE);
    let response = sync(state.kv.as_ref(), family, query.from, max).await.map_err(AppError::from)?;
    state.analytics.record_sync(family.as_str(), response.entries.len());
    Ok(ApiResponse::ok(response))
}

// ---------------------------------------------------------------------
// Stock
// ---------------------------------------------------------------------

pub async fn stock_get(
    State(state): State<Arc<AppState>>,
    Path(item_code): Path<String>,
) -> ApiResult<Value> {
    let cache = CacheStore::new(state.kv.as_ref());
    let value = cache
        .read_simple(Family::Stock, &item_code)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::NotFound(format!("no stock cached for {item_code}")))?;
    Ok(ApiResponse::ok(value))
}

pub async fn stock_warehouses_reference(State(state): State<Arc<AppState>>) -> ApiResult<Vec<String>> {
    let names = read_warehouse_reference(state.kv.as_ref()).await.map_err(AppError::from)?;
    Ok(ApiResponse::ok(names))
}

pub async fn stock_update_all(State(state): State<Arc<AppState>>) -> ApiResult<RefreshSummary> {
    let summary = run_full_refresh(state.kv.as_ref(), state.erp.as_ref(), &state.config).await;
    let (updated, errors) = summary_totals(&summary);
    state.analytics.record_refresh(updated, errors);
    Ok(ApiResponse::ok(summary))
}

fn summary_totals(summary: &RefreshSummary) -> (u64, u64) {
    [
        &summary.product,
        &summary.price,
        &summary.stock,
        &summary.hero,
        &summary.bundle,
        &summary.home,
    ]
    .iter()
    .fold((0u64, 0u64), |(updated, errors), family| {
        (updated + family.updated as u64, errors + family.errors.len() as u64)
    })
}

// ---------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub phone: String,
    pub device_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: String,
}

pub async fn auth_register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<RegisterResponse> {
    if request.phone.is_empty() {
        return Err(AppError::Validation("phone must not be empty".to_string()).into());
    }

    let store = UserStore::new(state.kv.as_ref());
    let user = match store.find_by_phone(&request.phone).await.map_err(AppError::from)? {
        Some(existing) => existing,
        None => store
            .register(&request.phone, request.device_id.as_deref())
            .await
            .map_err(AppError::from)?,
    };

    otp::issue(state.kv.as_ref(), state.otp_sender.as_ref(), &request.phone)
        .await
        .map_err(AppError::from)?;

    Ok(ApiResponse::ok(RegisterResponse { user_id: user.id }))
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub phone: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub access_token: String,
    pub refresh_token: String,
}

pub async fn auth_verify(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerifyRequest>,
) -> ApiResult<VerifyResponse> {
    otp::verify(state.kv.as_ref(), &request.phone, &request.code)
        .await
        .map_err(AppError::from)?;

    let store = UserStore::new(state.kv.as_ref());
    let user = store
        .find_by_phone(&request.phone)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::NotFound(format!("no registration for {}", request.phone)))?;

    let user = if user.status < UserStatus::Registered {
        store.advance_status(&user.id, UserStatus::Registered).await.map_err(AppError::from)?
    } else {
        user
    };

    let tokens = issue_tokens(state.kv.as_ref(), &state.config.jwt, &user.id, user.status)
        .await
        .map_err(AppError::from)?;

    Ok(ApiResponse::ok(VerifyResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    }))
}

// ---------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

const DEFAULT_MESSAGE_PAGE: usize = 20;

pub async fn messages_list(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<MessagesQuery>,
) -> ApiResult<MessagePage> {
    let limit = query.limit.unwrap_or(DEFAULT_MESSAGE_PAGE);
    let page = list_messages(state.kv.as_ref(), &claims.sub, query.cursor.as_deref(), limit)
        .await
        .map_err(AppError::from)?;
    Ok(ApiResponse::ok(page))
}

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    pub user_id: String,
    pub title: String,
    pub body: String,
}

/// Admin-only: push a message to a specific user. Gated by
/// `require_admin_middleware` at the route layer.
pub async fn messages_create(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateMessageRequest>,
) -> ApiResult<crate::users::Message> {
    let created_at = chrono::Utc::now().to_rfc3339();
    let message = create_message(state.kv.as_ref(), &request.user_id, &request.title, &request.body, &created_at)
        .await
        .map_err(AppError::from)?;
    Ok(ApiResponse::ok(message))
}

pub async fn messages_delete(
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<String>,
) -> ApiResult<()> {
    delete_message(state.kv.as_ref(), &message_id).await.map_err(AppError::from)?;
    Ok(ApiResponse::ok(()))
}
