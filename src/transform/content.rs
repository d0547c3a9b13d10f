//! Image-family transformation: download each source URL and inline it as
//! a `data:` URL so clients never make a second round trip for hero,
//! bundle, or other curated image content.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::erp::ErpFetcher;

/// Fetch each URL and encode it as a `data:<content-type>;base64,<...>`
/// string. A single failed download is dropped and logged; it never fails
/// the whole family's transform.
pub async fn inline_image_urls(fetcher: &dyn ErpFetcher, urls: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(urls.len());
    for url in urls {
        match fetcher.fetch_blob(url).await {
            Ok(blob) => {
                let encoded = STANDARD.encode(&blob.bytes);
                out.push(format!("data:{};base64,{}", blob.content_type, encoded));
            }
            Err(err) => {
                tracing::warn!(url = %url, error = %err, "dropping image that failed to download");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::erp::{Blob, ErpResult, PriceQuote, ProductIndexEntry};
    use async_trait::async_trait;
    use serde_json::Value;

    struct FakeFetcher {
        should_fail: Vec<String>,
    }

    #[async_trait]
    impl ErpFetcher for FakeFetcher {
        async fn fetch_product(&self, _id: &str) -> ErpResult<Value> {
            unimplemented!()
        }
        async fn fetch_all_product_index(&self) -> ErpResult<Vec<ProductIndexEntry>> {
            unimplemented!()
        }
        async fn fetch_item_price(&self, _item_code: &str) -> ErpResult<PriceQuote> {
            unimplemented!()
        }
        async fn fetch_item_stock_warehouses(&self, _item_code: &str) -> ErpResult<Vec<String>> {
            unimplemented!()
        }
        async fn fetch_hero_image_urls(&self) -> ErpResult<Vec<String>> {
            unimplemented!()
        }
        async fn fetch_bundle_image_urls(&self) -> ErpResult<Vec<String>> {
            unimplemented!()
        }
        async fn fetch_app_home_raw(&self) -> ErpResult<Value> {
            unimplemented!()
        }
        async fn fetch_blob(&self, url: &str) -> ErpResult<Blob> {
            if self.should_fail.contains(&url.to_string()) {
                return Err(crate::erp::ErpError::Transient("boom".to_string()));
            }
            Ok(Blob {
                bytes: b"fake-bytes".to_vec(),
                content_type: "image/png".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn successful_downloads_become_data_urls() {
        let fetcher = FakeFetcher { should_fail: vec![] };
        let urls = vec!["http://erp/a.png".to_string()];
        let result = inline_image_urls(&fetcher, &urls).await;
        assert_eq!(result.len(), 1);
        assert!(result[0].starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn failed_download_is_dropped_not_fatal() {
        let fetcher = FakeFetcher {
            should_fail: vec!["http://erp/bad.png".to_string()],
        };
        let urls = vec![
            "http://erp/bad.png".to_string(),
            "http://erp/good.png".to_string(),
        ];
        let result = inline_image_urls(&fetcher, &urls).await;
        assert_eq!(result.len(), 1);
        assert!(result[0].starts_with("data:image/png;base64,"));
    }
}
