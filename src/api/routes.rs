//! # Routes
//!
//! ## Endpoint table
//!
//! | Method | Path                                 | Auth   |
//! |--------|---------------------------------------|--------|
//! | POST   | `/api/webhooks/erpnext`               | none   |
//! | POST   | `/api/webhooks/price-update`          | none   |
//! | GET    | `/api/sync/:family`                   | none   |
//! | GET    | `/api/stock/:item_code`                | none   |
//! | GET    | `/api/stock/warehouses/reference`      | none   |
//! | POST   | `/api/stock/update-all`                | admin  |
//! | GET    | `/api/certificate-info`                | none   |
//! | POST   | `/api/auth/register`                   | none   |
//! | POST   | `/api/auth/verify`                     | none   |
//! | GET    | `/api/messages`                        | user   |
//! | POST   | `/api/messages`                        | admin  |
//! | DELETE | `/api/messages/:id`                    | admin  |
//! | GET    | `/health`                               | none   |
//!
//! ## Middleware order
//!
//! Requests pass through, outermost first: request id, logging, CORS,
//! rate limiting, security headers, then (on routes that need it) auth and
//! the admin gate, before reaching a handler. `Router::layer` makes each
//! newly added layer the new outermost one, so the calls below run in the
//! reverse of that list.

use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};

use crate::api::handlers::*;
use crate::api::middleware::{
    auth_middleware, cors_layer, logging_middleware, rate_limit_middleware, request_id_middleware,
    require_admin_middleware, security_headers_middleware,
};
use crate::analytics::Recorder;
use crate::auth::otp::OtpSender;
use crate::config::AppConfig;
use crate::erp::ErpFetcher;
use crate::kv::KvStore;

/// Shared application state handed to every handler and middleware layer.
pub struct AppState {
    pub kv: Arc<dyn KvStore>,
    pub erp: Arc<dyn ErpFetcher>,
    pub otp_sender: Arc<dyn OtpSender>,
    pub config: AppConfig,
    pub analytics: Recorder,
}

fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/api/webhooks/erpnext", post(webhook_erpnext))
        .route("/api/webhooks/price-update", post(webhook_price_update))
        .route("/api/sync/:family", get(sync_family))
        .route("/api/stock/warehouses/reference", get(stock_warehouses_reference))
        .route("/api/stock/:item_code", get(stock_get))
        .route("/api/certificate-info", get(certificate_info))
        .route("/api/auth/register", post(auth_register))
        .route("/api/auth/verify", post(auth_verify))
}

fn user_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/messages", get(messages_list))
        .layer(from_fn_with_state(state, auth_middleware))
}

fn admin_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/stock/update-all", post(stock_update_all))
        .route("/api/messages", post(messages_create))
        .route("/api/messages/:id", delete(messages_delete))
        .layer(from_fn_with_state(state.clone(), require_admin_middleware))
        .layer(from_fn_with_state(state, auth_middleware))
}

/// Build the full HTTP application.
pub fn build(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_allowed_origins);

    Router::new()
        .merge(public_routes())
        .merge(user_routes(state.clone()))
        .merge(admin_routes(state.clone()))
        .with_state(state.clone())
        // Listed innermost-first: each `.layer` call becomes the new
        // outermost wrapper, so execution order is the reverse of this
        // list — request id, then logging, CORS, rate limiting, security
        // headers, matching the table above.
        .layer(axum::middleware::from_fn(security_headers_middleware))
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(cors)
        .layer(axum::middleware::from_fn(logging_middleware))
        .layer(axum::middleware::from_fn(request_id_middleware))
}
