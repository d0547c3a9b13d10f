//! # ERP Fetcher — boundary contract
//!
//! A read-only client to the upstream ERP system of record. Pure fetch and
//! decode, no side effects; this crate never writes to the ERP. Specified
//! here only by the operations the rest of the core calls through the
//! [`ErpFetcher`] trait, so the webhook handler, full refresh, and their
//! tests can all run against [`client::HttpErpClient`] in production or a
//! fake in tests without caring which.

pub mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// ERP fetcher errors, classified by retry eligibility.
#[derive(Debug, Error, Clone)]
pub enum ErpError {
    /// Reachable but returned 5xx or timed out. Safe to retry.
    #[error("transient ERP failure: {0}")]
    Transient(String),

    /// A definitive 4xx on a known-valid id (e.g. genuinely deleted in ERP).
    /// Treated as "not found"; never retried.
    #[error("permanent ERP failure: {0}")]
    Permanent(String),

    /// The ERP responded but the payload couldn't be decoded into the
    /// expected shape.
    #[error("failed to decode ERP response: {0}")]
    Decode(String),
}

pub type ErpResult<T> = Result<T, ErpError>;

/// One product's id plus enough of its variant descriptor to enumerate
/// child item codes for price/stock materialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductIndexEntry {
    pub product_id: String,
    pub variants: Vec<VariantDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantDescriptor {
    pub item_code: String,
    pub size_unit: Option<String>,
}

/// Retail/wholesale price quote for a single item code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct PriceQuote {
    pub retail: f64,
    pub wholesale: f64,
}

/// A fetched binary asset plus its declared content type, ready to be
/// inlined as a `data:` URL by the transformer.
#[derive(Debug, Clone)]
pub struct Blob {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[async_trait]
pub trait ErpFetcher: Send + Sync {
    async fn fetch_product(&self, id: &str) -> ErpResult<Value>;
    async fn fetch_all_product_index(&self) -> ErpResult<Vec<ProductIndexEntry>>;
    async fn fetch_item_price(&self, item_code: &str) -> ErpResult<PriceQuote>;
    async fn fetch_item_stock_warehouses(&self, item_code: &str) -> ErpResult<Vec<String>>;
    async fn fetch_hero_image_urls(&self) -> ErpResult<Vec<String>>;
    async fn fetch_bundle_image_urls(&self) -> ErpResult<Vec<String>>;
    async fn fetch_app_home_raw(&self) -> ErpResult<Value>;
    async fn fetch_blob(&self, url: &str) -> ErpResult<Blob>;
}
