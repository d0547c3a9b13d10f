//! Production [`ErpFetcher`] implementation over the ERP's REST dialect.
//! The exact dialect is intentionally not pinned down here; this client
//! speaks a thin, stable shape (`/api/resource/<doctype>/<id>`-style paths) and
//! leaves the per-route response parsing to whichever endpoints the
//! deployment actually points at — the retry/timeout/classification
//! behavior is the part under test.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::time::sleep;

use super::{Blob, ErpError, ErpFetcher, ErpResult, PriceQuote, ProductIndexEntry};
use async_trait::async_trait;

/// Bounded retry with exponential backoff, applied only to `Transient`
/// classifications — a `Permanent` failure (e.g. a genuine 404) is
/// returned immediately without retrying.
const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(200);

pub struct HttpErpClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl HttpErpClient {
    pub fn new(base_url: String, api_key: String, api_secret: String, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client configuration is static and valid");
        Self {
            http,
            base_url,
            api_key,
            api_secret,
        }
    }

    fn auth_header(&self) -> String {
        format!("token {}:{}", self.api_key, self.api_secret)
    }

    async fn get_json(&self, path: &str) -> ErpResult<Value> {
        retry(|| async { self.get_json_once(path).await }).await
    }

    async fn get_json_once(&self, path: &str) -> ErpResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| ErpError::Transient(e.to_string()))?;

        classify_status(response.status())?;

        response
            .json::<Value>()
            .await
            .map_err(|e| ErpError::Decode(e.to_string()))
    }
}

fn classify_status(status: StatusCode) -> ErpResult<()> {
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::NOT_FOUND || status.is_client_error() {
        return Err(ErpError::Permanent(format!("ERP responded {status}")));
    }
    Err(ErpError::Transient(format!("ERP responded {status}")))
}

async fn retry<F, Fut, T>(mut attempt: F) -> ErpResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ErpResult<T>>,
{
    let mut backoff = BASE_BACKOFF;
    for attempt_no in 1..=MAX_ATTEMPTS {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(ErpError::Transient(msg)) if attempt_no < MAX_ATTEMPTS => {
                tracing::warn!(attempt = attempt_no, error = %msg, "transient ERP failure, retrying");
                sleep(backoff).await;
                backoff *= 2;
            }
            Err(other) => return Err(other),
        }
    }
    unreachable!("loop always returns by the final attempt")
}

#[async_trait]
impl ErpFetcher for HttpErpClient {
    async fn fetch_product(&self, id: &str) -> ErpResult<Value> {
        self.get_json(&format!("/api/resource/Item/{id}")).await
    }

    async fn fetch_all_product_index(&self) -> ErpResult<Vec<ProductIndexEntry>> {
        let raw = self.get_json("/api/method/app.published_items").await?;
        serde_json::from_value(raw).map_err(|e| ErpError::Decode(e.to_string()))
    }

    async fn fetch_item_price(&self, item_code: &str) -> ErpResult<PriceQuote> {
        let raw = self
            .get_json(&format!("/api/method/app.item_price?item_code={item_code}"))
            .await?;
        Ok(PriceQuote {
            retail: raw.get("retail").and_then(Value::as_f64).unwrap_or(0.0),
            wholesale: raw.get("wholesale").and_then(Value::as_f64).unwrap_or(0.0),
        })
    }

    async fn fetch_item_stock_warehouses(&self, item_code: &str) -> ErpResult<Vec<String>> {
        let raw = self
            .get_json(&format!("/api/method/app.item_stock?item_code={item_code}"))
            .await?;
        let warehouses = raw
            .get("warehouses")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(warehouses
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect())
    }

    async fn fetch_hero_image_urls(&self) -> ErpResult<Vec<String>> {
        let raw = self.get_json("/api/method/app.hero_images").await?;
        decode_string_array(raw)
    }

    async fn fetch_bundle_image_urls(&self) -> ErpResult<Vec<String>> {
        let raw = self.get_json("/api/method/app.bundle_images").await?;
        decode_string_array(raw)
    }

    async fn fetch_app_home_raw(&self) -> ErpResult<Value> {
        self.get_json("/api/method/app.home").await
    }

    async fn fetch_blob(&self, url: &str) -> ErpResult<Blob> {
        retry(|| async { self.fetch_blob_once(url).await }).await
    }
}

impl HttpErpClient {
    async fn fetch_blob_once(&self, url: &str) -> ErpResult<Blob> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ErpError::Transient(e.to_string()))?;
        classify_status(response.status())?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ErpError::Transient(e.to_string()))?
            .to_vec();
        Ok(Blob { bytes, content_type })
    }
}

fn decode_string_array(value: Value) -> ErpResult<Vec<String>> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .ok_or_else(|| ErpError::Decode("expected a JSON array of strings".to_string()))
}
