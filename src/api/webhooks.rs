//! # ERP Webhook Ingress
//!
//! Payload parsing for the two inbound webhook shapes: the generic
//! `entity_type`-tagged ERPNext webhook, and the legacy price-update
//! endpoint some older ERP workflows still call directly with
//! `{erpnextName, sizeUnit, price, itemCode?, invalidateCache?}` instead of
//! going through `fetch_item_price`.

use serde::Deserialize;
use serde_json::Value;

use crate::cache::{CacheStore, Family};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::erp::{ErpFetcher, PriceQuote};
use crate::kv::KvStore;
use crate::pipeline::{detect_and_commit, CommitResult};
use crate::transform::transform_price;
use crate::webhook::process;

/// The ERPNext webhook envelope: `entity_type` selects the family, the
/// rest of the body is family-specific and handed to [`process`] as-is.
#[derive(Debug, Deserialize)]
pub struct ErpWebhookEnvelope {
    pub entity_type: String,
    #[serde(flatten)]
    pub payload: Value,
}

fn parse_family(entity_type: &str) -> Result<Family, AppError> {
    match entity_type {
        "product" => Ok(Family::Product),
        "price" => Ok(Family::Price),
        "stock" => Ok(Family::Stock),
        "hero" => Ok(Family::Hero),
        "bundle" => Ok(Family::Bundle),
        "home" => Ok(Family::Home),
        other => Err(AppError::Validation(format!("unknown entity_type `{other}`"))),
    }
}

/// Handle one `POST /api/webhooks/erpnext` delivery.
pub async fn handle_erpnext_webhook(
    kv: &dyn KvStore,
    erp: &dyn ErpFetcher,
    config: &AppConfig,
    envelope: ErpWebhookEnvelope,
) -> Result<CommitResult, AppError> {
    let family = parse_family(&envelope.entity_type)?;
    process(kv, erp, config, family, &envelope.payload).await
}

/// The legacy price-update body: the price itself, rather than an id the
/// handler must go re-fetch from the ERP. Predates the `itemCode`-keyed
/// ERP fetch path, so item identity is usually carried as an ERPNext item
/// name plus size/unit label; `itemCode` is accepted as an explicit
/// override when the caller already knows it.
#[derive(Debug, Deserialize)]
pub struct LegacyPriceUpdate {
    #[serde(rename = "erpnextName")]
    pub erpnext_name: String,
    #[serde(rename = "sizeUnit")]
    pub size_unit: String,
    pub price: f64,
    #[serde(rename = "itemCode")]
    pub item_code: Option<String>,
    #[serde(rename = "invalidateCache", default)]
    pub invalidate_cache: bool,
}

impl LegacyPriceUpdate {
    /// The item code this update applies to: the explicit override when
    /// given, otherwise the conventional `{erpnextName}-{sizeUnit}` ERPNext
    /// item-code composition.
    fn resolved_item_code(&self) -> String {
        self.item_code
            .clone()
            .unwrap_or_else(|| format!("{}-{}", self.erpnext_name, self.size_unit))
    }
}

/// Handle one `POST /api/webhooks/price-update` delivery. Runs the quote
/// straight through `detect_and_commit` with the same transform the
/// regular price family uses, so the hash entry this produces is
/// indistinguishable from one that arrived via the normal ERP fetch path
/// — an operator inspecting the cache can't tell which route produced a
/// given price. `price` updates the retail tier; the wholesale tier is
/// carried over from whatever is already cached (`0` if nothing is).
/// `invalidateCache` forces the write through even when it would otherwise
/// be a no-op, by clearing the existing cache entry first.
pub async fn handle_legacy_price_update(
    kv: &dyn KvStore,
    config: &AppConfig,
    update: LegacyPriceUpdate,
) -> Result<CommitResult, AppError> {
    if update.erpnext_name.is_empty() || update.size_unit.is_empty() {
        return Err(AppError::Validation(
            "erpnextName and sizeUnit must not be empty".to_string(),
        ));
    }
    let item_code = update.resolved_item_code();

    let cache = CacheStore::new(kv);
    let wholesale = cache
        .read_simple(Family::Price, &item_code)
        .await
        .map_err(AppError::from)?
        .and_then(|v| v.get(1).and_then(Value::as_f64))
        .unwrap_or(0.0);

    if update.invalidate_cache {
        cache.delete_both(Family::Price, &item_code).await.map_err(AppError::from)?;
    }

    let candidate = transform_price(PriceQuote { retail: update.price, wholesale });
    let ttl = config.ttl_for(Family::Price);
    detect_and_commit(kv, Family::Price, &item_code, &candidate, ttl)
        .await
        .map_err(AppError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::erp::{Blob, ErpResult, ProductIndexEntry, VariantDescriptor};
    use crate::kv::memory::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;

    struct FakeErp;

    #[async_trait]
    impl ErpFetcher for FakeErp {
        async fn fetch_product(&self, id: &str) -> ErpResult<Value> {
            Ok(json!({"product_id": id, "variants": []}))
        }
        async fn fetch_all_product_index(&self) -> ErpResult<Vec<ProductIndexEntry>> {
            Ok(vec![ProductIndexEntry {
                product_id: "WEB-1".to_string(),
                variants: vec![VariantDescriptor { item_code: "ITM-1".to_string(), size_unit: None }],
            }])
        }
        async fn fetch_item_price(&self, _item_code: &str) -> ErpResult<PriceQuote> {
            Ok(PriceQuote { retail: 10.0, wholesale: 8.0 })
        }
        async fn fetch_item_stock_warehouses(&self, _item_code: &str) -> ErpResult<Vec<String>> {
            Ok(vec![])
        }
        async fn fetch_hero_image_urls(&self) -> ErpResult<Vec<String>> {
            Ok(vec![])
        }
        async fn fetch_bundle_image_urls(&self) -> ErpResult<Vec<String>> {
            Ok(vec![])
        }
        async fn fetch_app_home_raw(&self) -> ErpResult<Value> {
            Ok(json!({}))
        }
        async fn fetch_blob(&self, _url: &str) -> ErpResult<Blob> {
            Err(crate::erp::ErpError::Permanent("no blobs".to_string()))
        }
    }

    #[tokio::test]
    async fn erpnext_envelope_dispatches_by_entity_type() {
        let kv = MemoryStore::new();
        let erp = FakeErp;
        let config = AppConfig::default();
        let envelope = ErpWebhookEnvelope {
            entity_type: "product".to_string(),
            payload: json!({"product_id": "WEB-1"}),
        };
        let result = handle_erpnext_webhook(&kv, &erp, &config, envelope).await.unwrap();
        assert!(result.changed);
    }

    #[tokio::test]
    async fn unknown_entity_type_is_rejected() {
        let kv = MemoryStore::new();
        let erp = FakeErp;
        let config = AppConfig::default();
        let envelope = ErpWebhookEnvelope { entity_type: "widget".to_string(), payload: json!({}) };
        let result = handle_erpnext_webhook(&kv, &erp, &config, envelope).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn legacy_price_update_commits_through_detect_and_commit() {
        let kv = MemoryStore::new();
        let config = AppConfig::default();
        let update = LegacyPriceUpdate {
            erpnext_name: "WEB-ITM-0002".to_string(),
            size_unit: "1KG".to_string(),
            price: 12.0,
            item_code: Some("ITM-1".to_string()),
            invalidate_cache: false,
        };
        let result = handle_legacy_price_update(&kv, &config, update).await.unwrap();
        assert!(result.changed);

        let cache = crate::cache::CacheStore::new(&kv);
        let entry = cache.read_hash(Family::Price, "ITM-1").await.unwrap().unwrap();
        assert!(crate::cache::verify_hash_faithfulness(&entry));
    }

    #[tokio::test]
    async fn legacy_price_update_derives_item_code_when_absent() {
        let kv = MemoryStore::new();
        let config = AppConfig::default();
        let update = LegacyPriceUpdate {
            erpnext_name: "WEB-ITM-0002".to_string(),
            size_unit: "1KG".to_string(),
            price: 12.0,
            item_code: None,
            invalidate_cache: false,
        };
        let result = handle_legacy_price_update(&kv, &config, update).await.unwrap();
        assert!(result.changed);

        let cache = crate::cache::CacheStore::new(&kv);
        let entry = cache.read_hash(Family::Price, "WEB-ITM-0002-1KG").await.unwrap().unwrap();
        assert!(crate::cache::verify_hash_faithfulness(&entry));
    }

    #[tokio::test]
    async fn legacy_price_update_rejects_empty_erpnext_name() {
        let kv = MemoryStore::new();
        let config = AppConfig::default();
        let update = LegacyPriceUpdate {
            erpnext_name: String::new(),
            size_unit: "1KG".to_string(),
            price: 1.0,
            item_code: None,
            invalidate_cache: false,
        };
        let result = handle_legacy_price_update(&kv, &config, update).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn legacy_price_update_preserves_cached_wholesale_tier() {
        let kv = MemoryStore::new();
        let config = AppConfig::default();
        let first = LegacyPriceUpdate {
            erpnext_name: "WEB-ITM-0002".to_string(),
            size_unit: "1KG".to_string(),
            price: 12.0,
            item_code: Some("ITM-1".to_string()),
            invalidate_cache: false,
        };
        handle_legacy_price_update(&kv, &config, first).await.unwrap();

        // Seed a wholesale tier the legacy body never carries, then update
        // retail again and confirm wholesale survives.
        let cache = crate::cache::CacheStore::new(&kv);
        let seeded = json!([12.0, 9.0]);
        cache
            .write_both(Family::Price, "ITM-1", &seeded, &crate::hash::content_hash(&seeded), 2, None)
            .await
            .unwrap();

        let second = LegacyPriceUpdate {
            erpnext_name: "WEB-ITM-0002".to_string(),
            size_unit: "1KG".to_string(),
            price: 15.0,
            item_code: Some("ITM-1".to_string()),
            invalidate_cache: false,
        };
        handle_legacy_price_update(&kv, &config, second).await.unwrap();

        let simple = cache.read_simple(Family::Price, "ITM-1").await.unwrap().unwrap();
        assert_eq!(simple, json!([15.0, 9.0]));
    }

    #[tokio::test]
    async fn legacy_price_update_invalidate_cache_forces_a_change() {
        let kv = MemoryStore::new();
        let config = AppConfig::default();
        let update = LegacyPriceUpdate {
            erpnext_name: "WEB-ITM-0002".to_string(),
            size_unit: "1KG".to_string(),
            price: 12.0,
            item_code: Some("ITM-1".to_string()),
            invalidate_cache: false,
        };
        handle_legacy_price_update(&kv, &config, update).await.unwrap();

        let replay = LegacyPriceUpdate {
            erpnext_name: "WEB-ITM-0002".to_string(),
            size_unit: "1KG".to_string(),
            price: 12.0,
            item_code: Some("ITM-1".to_string()),
            invalidate_cache: true,
        };
        let result = handle_legacy_price_update(&kv, &config, replay).await.unwrap();
        assert!(result.changed);
    }
}
