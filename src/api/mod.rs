//! # HTTP Boundary
//!
//! The axum application: request handlers, middleware pipeline, route
//! table, response envelope, and webhook payload parsing. Everything
//! under `api` is HTTP-specific glue over the core modules (`pipeline`,
//! `sync`, `refresh`, `auth`, `users`) — no domain logic lives here.

pub mod handlers;
pub mod middleware;
pub mod responses;
pub mod routes;
pub mod webhooks;

pub use routes::{build, AppState};
