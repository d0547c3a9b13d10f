//! # Webhook Handler
//!
//! The fast-path ingress: one entry point, [`process`], that validates a
//! family-specific payload, fetches and transforms the candidate value,
//! and runs it through the shared detect-and-commit pipeline. The result
//! never carries the value itself — only whether it changed, its new
//! version, and (if appended) the stream id — clients discover content by
//! polling the sync protocol, not by reading the webhook response.

use serde_json::Value;

use crate::cache::{read_warehouse_reference, CacheStore, Family};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::erp::ErpFetcher;
use crate::kv::KvStore;
use crate::pipeline::{detect_and_commit, CommitResult};
use crate::transform::{inline_image_urls, transform_price, transform_product, transform_stock};

/// Resolve the entity id for a family from its payload. Singleton families
/// ignore whatever the payload carries and use the family name itself.
///
/// The `POST /api/webhooks/erpnext` body is `{entity_type, itemCode?}`, and
/// the product family is additionally documented (and exercised end to end)
/// as `{erpnextName: "..."}`. Each family accepts whichever of its fields is
/// present, trying them in order, so both shapes resolve.
fn resolve_entity_id(family: Family, payload: &Value) -> Result<String, AppError> {
    if family.is_singleton() {
        return Ok(family.as_str().to_string());
    }
    let fields: &[&str] = match family {
        Family::Product => &["erpnextName", "itemCode", "product_id"],
        Family::Price | Family::Stock => &["itemCode", "item_code"],
        _ => &["id"],
    };
    fields
        .iter()
        .find_map(|field| {
            payload
                .get(*field)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .ok_or_else(|| {
            AppError::Validation(format!(
                "payload missing one of `{}` for {family}",
                fields.join("`/`")
            ))
        })
}

/// Process one webhook delivery for `family`. Idempotent by value: a
/// byte-for-byte replay of the same ERP state yields `changed: false` and
/// appends nothing.
pub async fn process(
    kv: &dyn KvStore,
    erp: &dyn ErpFetcher,
    config: &AppConfig,
    family: Family,
    payload: &Value,
) -> Result<CommitResult, AppError> {
    if !matches!(
        family,
        Family::Product | Family::Price | Family::Stock | Family::Hero | Family::Bundle | Family::Home
    ) {
        return Err(AppError::Validation(format!(
            "{family} is not a webhook-ingestible family"
        )));
    }

    let id = resolve_entity_id(family, payload)?;
    let candidate = fetch_and_transform(kv, erp, family, &id).await?;
    let ttl = config.ttl_for(family);

    detect_and_commit(kv, family, &id, &candidate, ttl)
        .await
        .map_err(AppError::from)
}

async fn fetch_and_transform(
    kv: &dyn KvStore,
    erp: &dyn ErpFetcher,
    family: Family,
    id: &str,
) -> Result<Value, AppError> {
    match family {
        Family::Product => {
            let raw = erp.fetch_product(id).await?;
            let cache = CacheStore::new(kv);
            Ok(transform_product(&cache, raw).await?)
        }
        Family::Price => {
            let quote = erp.fetch_item_price(id).await?;
            Ok(transform_price(quote))
        }
        Family::Stock => {
            let warehouses = erp.fetch_item_stock_warehouses(id).await?;
            let reference = read_warehouse_reference(kv).await?;
            if reference.is_empty() {
                return Err(AppError::Validation(
                    "warehouse reference is empty; refusing to write an unpositioned availability vector"
                        .to_string(),
                ));
            }
            Ok(transform_stock(&warehouses, &reference))
        }
        Family::Hero => {
            let urls = erp.fetch_hero_image_urls().await?;
            Ok(Value::Array(
                inline_image_urls(erp, &urls)
                    .await
                    .into_iter()
                    .map(Value::String)
                    .collect(),
            ))
        }
        Family::Bundle => {
            let urls = erp.fetch_bundle_image_urls().await?;
            Ok(Value::Array(
                inline_image_urls(erp, &urls)
                    .await
                    .into_iter()
                    .map(Value::String)
                    .collect(),
            ))
        }
        Family::Home => Ok(erp.fetch_app_home_raw().await?),
        Family::Message => unreachable!("rejected above"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::erp::{Blob, ErpError, ErpResult, PriceQuote, ProductIndexEntry};
    use crate::kv::memory::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;

    struct FakeErp {
        product: Value,
        price: PriceQuote,
        stock_warehouses: Vec<String>,
    }

    #[async_trait]
    impl ErpFetcher for FakeErp {
        async fn fetch_product(&self, _id: &str) -> ErpResult<Value> {
            Ok(self.product.clone())
        }
        async fn fetch_all_product_index(&self) -> ErpResult<Vec<ProductIndexEntry>> {
            Ok(vec![])
        }
        async fn fetch_item_price(&self, _item_code: &str) -> ErpResult<PriceQuote> {
            Ok(self.price)
        }
        async fn fetch_item_stock_warehouses(&self, _item_code: &str) -> ErpResult<Vec<String>> {
            Ok(self.stock_warehouses.clone())
        }
        async fn fetch_hero_image_urls(&self) -> ErpResult<Vec<String>> {
            Ok(vec![])
        }
        async fn fetch_bundle_image_urls(&self) -> ErpResult<Vec<String>> {
            Ok(vec![])
        }
        async fn fetch_app_home_raw(&self) -> ErpResult<Value> {
            Ok(json!({"banner": "welcome"}))
        }
        async fn fetch_blob(&self, _url: &str) -> ErpResult<Blob> {
            Err(ErpError::Permanent("no blobs in this fake".to_string()))
        }
    }

    fn fake_erp() -> FakeErp {
        FakeErp {
            product: json!({"product_id": "WEB-ITM-0002", "variants": []}),
            price: PriceQuote { retail: 10.0, wholesale: 8.0 },
            stock_warehouses: vec!["Homs".to_string()],
        }
    }

    #[tokio::test]
    async fn product_webhook_requires_an_id_field() {
        let kv = MemoryStore::new();
        let erp = fake_erp();
        let config = AppConfig::default();
        let result = process(&kv, &erp, &config, Family::Product, &json!({})).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn product_webhook_first_delivery_creates() {
        // §8 scenario 1, literal input.
        let kv = MemoryStore::new();
        let erp = fake_erp();
        let config = AppConfig::default();
        let result = process(
            &kv,
            &erp,
            &config,
            Family::Product,
            &json!({"erpnextName": "WEB-ITM-0002"}),
        )
        .await
        .unwrap();
        assert!(result.changed);
        assert_eq!(result.version, 1);
    }

    #[tokio::test]
    async fn product_webhook_accepts_item_code_too() {
        let kv = MemoryStore::new();
        let erp = fake_erp();
        let config = AppConfig::default();
        let result = process(&kv, &erp, &config, Family::Product, &json!({"itemCode": "WEB-ITM-0002"}))
            .await
            .unwrap();
        assert!(result.changed);
    }

    #[tokio::test]
    async fn replaying_identical_erp_state_is_not_a_change() {
        // §8 scenario 2.
        let kv = MemoryStore::new();
        let erp = fake_erp();
        let config = AppConfig::default();
        let payload = json!({"erpnextName": "WEB-ITM-0002"});
        process(&kv, &erp, &config, Family::Product, &payload).await.unwrap();
        let second = process(&kv, &erp, &config, Family::Product, &payload).await.unwrap();
        assert!(!second.changed);
    }

    #[tokio::test]
    async fn hero_and_home_are_singletons_ignoring_payload_id() {
        let kv = MemoryStore::new();
        let erp = fake_erp();
        let config = AppConfig::default();
        let result = process(&kv, &erp, &config, Family::Home, &json!({"id": "irrelevant"}))
            .await
            .unwrap();
        assert!(result.changed);
        let cache = CacheStore::new(&kv);
        assert!(cache.read_hash(Family::Home, "home").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn message_family_is_rejected() {
        let kv = MemoryStore::new();
        let erp = fake_erp();
        let config = AppConfig::default();
        let result = process(&kv, &erp, &config, Family::Message, &json!({})).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn stock_write_is_rejected_when_warehouse_reference_is_empty() {
        let kv = MemoryStore::new();
        let erp = fake_erp();
        let config = AppConfig::default();
        let result = process(&kv, &erp, &config, Family::Stock, &json!({"itemCode": "ITM-1"})).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        let cache = CacheStore::new(&kv);
        assert!(cache.read_hash(Family::Stock, "ITM-1").await.unwrap().is_none());
    }
}
