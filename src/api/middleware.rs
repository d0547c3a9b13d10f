//! # HTTP Middleware
//!
//! Layers applied outermost-first: request id, logging, CORS, rate
//! limiting, security headers, auth. Because `Router::layer` makes each
//! new layer the outermost one, they're registered in `routes::build` in
//! the reverse of that order — see the comment there.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::api::responses::ApiErrorResponse;
use crate::api::routes::AppState;
use crate::auth::rbac::require_admin;
use crate::auth::sessions::{verify_token, Claims};
use crate::auth::UserStore;
use crate::error::AppError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Stamp every request/response with a request id, generating one if the
/// caller didn't supply one.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Structured access log: method, path, status, latency, request id.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|r| r.0.clone())
        .unwrap_or_default();

    let start = Instant::now();
    let response = next.run(request).await;
    let elapsed = start.elapsed();

    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = elapsed.as_millis() as u64,
        "request"
    );
    response
}

/// Permissive-by-configuration CORS: `*` in development, an explicit
/// origin allowlist in production.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.iter().any(|o| o == "*") {
        return CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    CorsLayer::new().allow_origin(origins).allow_methods(Any).allow_headers(Any)
}

/// A fixed, minimal set of security headers every response carries.
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::HeaderName::from_static("x-xss-protection"),
        HeaderValue::from_static("1; mode=block"),
    );
    response
}

fn client_key(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<std::net::SocketAddr>>()
        .map(|c| c.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Token-bucket rate limiting shared across instances via the KV store.
/// Keyed by source IP; authentication state doesn't change the quota.
pub async fn rate_limit_middleware(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let key = client_key(&request);
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();

    match crate::ratelimit::check(
        state.kv.as_ref(),
        &key,
        state.config.rate_limit_requests,
        state.config.rate_limit_window,
        now,
    )
    .await
    {
        Ok(crate::ratelimit::Decision::Allow { .. }) => next.run(request).await,
        Ok(crate::ratelimit::Decision::Deny { retry_after }) => rate_limited_response(retry_after),
        Err(_) => next.run(request).await,
    }
}

fn rate_limited_response(retry_after: Duration) -> Response {
    let mut response =
        ApiErrorResponse(AppError::Validation("rate limit exceeded".to_string())).into_response();
    *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
    if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().to_string()) {
        response.headers_mut().insert(header::RETRY_AFTER, value);
    }
    response
}

/// Require a valid, non-revoked bearer token; attaches the decoded
/// [`Claims`] to the request so downstream handlers can read `sub`/`status`
/// without a second lookup.
pub async fn auth_middleware(State(state): State<Arc<AppState>>, mut request: Request, next: Next) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = token else {
        return ApiErrorResponse(AppError::Unauthorized("missing bearer token".to_string())).into_response();
    };

    match verify_token(state.kv.as_ref(), &state.config.jwt, token).await {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(err) => ApiErrorResponse(AppError::from(err)).into_response(),
    }
}

/// Require the `admin` role on an already-authenticated request. Must be
/// layered inside `auth_middleware` so `Claims` is already present; looks
/// the role up fresh rather than trusting a claim, since role isn't part
/// of the token (it's checked at issuance time only indirectly via status).
pub async fn require_admin_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(claims) = request.extensions().get::<Claims>().cloned() else {
        return ApiErrorResponse(AppError::Unauthorized("missing session".to_string())).into_response();
    };

    let store = UserStore::new(state.kv.as_ref());
    let user = match store.find_by_id(&claims.sub).await {
        Ok(Some(user)) => user,
        Ok(None) => return ApiErrorResponse(AppError::Unauthorized("unknown user".to_string())).into_response(),
        Err(err) => return ApiErrorResponse(AppError::from(err)).into_response(),
    };

    match require_admin(user.role) {
        Ok(()) => next.run(request).await,
        Err(err) => ApiErrorResponse(AppError::from(err)).into_response(),
    }
}
