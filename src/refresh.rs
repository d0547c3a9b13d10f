//! # Full Refresh
//!
//! The slow-path reconciliation: enumerate everything the ERP currently
//! publishes and run it through the same detect-and-commit pipeline the
//! webhook handler uses, in bounded-concurrency batches. Invoked by the
//! scheduler on its weekly slot, or on demand via `POST
//! /api/stock/update-all` / the admin CLI's `refresh` subcommand.

use std::collections::HashSet;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::cache::{read_warehouse_reference, Family};
use crate::config::AppConfig;
use crate::erp::ErpFetcher;
use crate::kv::KvStore;
use crate::pipeline::detect_and_commit;
use crate::transform::{inline_image_urls, transform_price, transform_product, transform_stock};

/// Outcome for one item within one family's refresh pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemError {
    pub entity_id: String,
    pub message: String,
}

/// Aggregate result for one family.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FamilySummary {
    pub total: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub errors: Vec<ItemError>,
}

/// The full refresh's result: one summary per family touched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefreshSummary {
    pub product: FamilySummary,
    pub price: FamilySummary,
    pub stock: FamilySummary,
    pub hero: FamilySummary,
    pub bundle: FamilySummary,
    pub home: FamilySummary,
}

/// Run a full refresh across every family. The warehouse reference is
/// read once up front and reused for every stock item in this pass, per
/// the snapshot-per-refresh discipline.
pub async fn run_full_refresh(
    kv: &dyn KvStore,
    erp: &dyn ErpFetcher,
    config: &AppConfig,
) -> RefreshSummary {
    let index = match erp.fetch_all_product_index().await {
        Ok(index) => index,
        Err(err) => {
            tracing::error!(error = %err, "full refresh: failed to enumerate product index");
            return RefreshSummary::default();
        }
    };

    // Only walks entities the ERP still enumerates. An item that vanished
    // from the index since the last refresh keeps its last-known cache
    // entry and never gets a deletion entry appended to its stream —
    // open question, not a bug: see the decision recorded in DESIGN.md.
    let product_ids: Vec<String> = index.iter().map(|p| p.product_id.clone()).collect();
    let item_codes: Vec<String> = {
        let mut seen = HashSet::new();
        index
            .iter()
            .flat_map(|p| p.variants.iter())
            .filter(|v| seen.insert(v.item_code.clone()))
            .map(|v| v.item_code.clone())
            .collect()
    };

    let reference = read_warehouse_reference(kv).await.unwrap_or_default();

    let product = refresh_products(kv, erp, config, product_ids).await;

    let price = refresh_family(kv, erp, config, Family::Price, item_codes.clone(), |erp, id| {
        Box::pin(async move {
            let quote = erp.fetch_item_price(&id).await?;
            Ok(transform_price(quote))
        })
    })
    .await;

    // An empty warehouse reference would produce an unpositioned (and thus
    // meaningless) availability vector for every item; refuse the whole
    // family rather than committing zero-length vectors that could never
    // satisfy the availability/warehouse congruence invariant once a real
    // reference is published.
    let stock = if reference.is_empty() {
        FamilySummary {
            total: item_codes.len(),
            updated: 0,
            unchanged: 0,
            errors: item_codes
                .iter()
                .map(|id| ItemError {
                    entity_id: id.clone(),
                    message: "warehouse reference is empty".to_string(),
                })
                .collect(),
        }
    } else {
        let reference_for_stock = reference.clone();
        refresh_family(kv, erp, config, Family::Stock, item_codes, move |erp, id| {
            let reference = reference_for_stock.clone();
            Box::pin(async move {
                let warehouses = erp.fetch_item_stock_warehouses(&id).await?;
                Ok(transform_stock(&warehouses, &reference))
            })
        })
        .await
    };

    let hero = refresh_singleton(kv, erp, config, Family::Hero, |erp| {
        Box::pin(async move {
            let urls = erp.fetch_hero_image_urls().await?;
            let data_urls = inline_image_urls(erp, &urls).await;
            Ok(serde_json::Value::Array(
                data_urls.into_iter().map(serde_json::Value::String).collect(),
            ))
        })
    })
    .await;

    let bundle = refresh_singleton(kv, erp, config, Family::Bundle, |erp| {
        Box::pin(async move {
            let urls = erp.fetch_bundle_image_urls().await?;
            let data_urls = inline_image_urls(erp, &urls).await;
            Ok(serde_json::Value::Array(
                data_urls.into_iter().map(serde_json::Value::String).collect(),
            ))
        })
    })
    .await;

    let home = refresh_singleton(kv, erp, config, Family::Home, |erp| {
        Box::pin(async move { erp.fetch_app_home_raw().await })
    })
    .await;

    RefreshSummary { product, price, stock, hero, bundle, home }
}

/// Run the detect-and-commit pipeline for every id in `ids`, in batches of
/// `config.refresh_batch_size` with bounded in-flight concurrency.
async fn refresh_family<'a>(
    kv: &'a dyn KvStore,
    erp: &'a dyn ErpFetcher,
    config: &'a AppConfig,
    family: Family,
    ids: Vec<String>,
    fetch: impl Fn(&'a dyn ErpFetcher, String) -> std::pin::Pin<Box<dyn std::future::Future<Output = crate::erp::ErpResult<serde_json::Value>> + Send + 'a>>
        + Send
        + Sync
        + 'a,
) -> FamilySummary {
    let total = ids.len();
    let ttl = config.ttl_for(family);
    let concurrency = config.refresh_batch_size.max(1);

    let results: Vec<Result<bool, ItemError>> = stream::iter(ids)
        .map(|id| {
            let fetch = &fetch;
            async move {
                let candidate = fetch(erp, id.clone())
                    .await
                    .map_err(|e| ItemError { entity_id: id.clone(), message: e.to_string() })?;
                let result = detect_and_commit(kv, family, &id, &candidate, ttl)
                    .await
                    .map_err(|e| ItemError { entity_id: id.clone(), message: e.to_string() })?;
                Ok(result.changed)
            }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    summarize(total, results)
}

async fn refresh_singleton<'a, F>(
    kv: &'a dyn KvStore,
    erp: &'a dyn ErpFetcher,
    config: &'a AppConfig,
    family: Family,
    fetch: F,
) -> FamilySummary
where
    F: FnOnce(&'a dyn ErpFetcher) -> std::pin::Pin<Box<dyn std::future::Future<Output = crate::erp::ErpResult<serde_json::Value>> + Send + 'a>>,
{
    let id = family.as_str();
    let ttl = config.ttl_for(family);
    let outcome = async {
        let candidate = fetch(erp).await.map_err(|e| ItemError { entity_id: id.to_string(), message: e.to_string() })?;
        let result = detect_and_commit(kv, family, id, &candidate, ttl)
            .await
            .map_err(|e| ItemError { entity_id: id.to_string(), message: e.to_string() })?;
        Ok::<bool, ItemError>(result.changed)
    }
    .await;

    summarize(1, vec![outcome])
}

fn summarize(total: usize, results: Vec<Result<bool, ItemError>>) -> FamilySummary {
    let mut summary = FamilySummary { total, ..Default::default() };
    for result in results {
        match result {
            Ok(true) => summary.updated += 1,
            Ok(false) => summary.unchanged += 1,
            Err(err) => summary.errors.push(err),
        }
    }
    summary
}

/// Product refresh runs outside the generic `refresh_family` helper: its
/// candidate value isn't a hermetic function of the ERP fetch alone, it
/// also needs `transform_product`'s price-cache lookup (`crate::cache`),
/// which the generic helper's `ErpFetcher`-only fetch closure has no
/// access to.
async fn refresh_products(kv: &dyn KvStore, erp: &dyn ErpFetcher, config: &AppConfig, ids: Vec<String>) -> FamilySummary {
    let total = ids.len();
    let ttl = config.ttl_for(Family::Product);
    let concurrency = config.refresh_batch_size.max(1);
    let cache = crate::cache::CacheStore::new(kv);

    let results: Vec<Result<bool, ItemError>> = stream::iter(ids)
        .map(|id| {
            let cache = &cache;
            async move {
                let raw = erp
                    .fetch_product(&id)
                    .await
                    .map_err(|e| ItemError { entity_id: id.clone(), message: e.to_string() })?;
                let candidate = transform_product(cache, raw)
                    .await
                    .map_err(|e| ItemError { entity_id: id.clone(), message: e.to_string() })?;
                let result = detect_and_commit(kv, Family::Product, &id, &candidate, ttl)
                    .await
                    .map_err(|e| ItemError { entity_id: id.clone(), message: e.to_string() })?;
                Ok(result.changed)
            }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    summarize(total, results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::erp::{Blob, ErpError, ErpResult, PriceQuote, ProductIndexEntry, VariantDescriptor};
    use crate::kv::memory::MemoryStore;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct FakeErp {
        index: Vec<ProductIndexEntry>,
    }

    #[async_trait]
    impl ErpFetcher for FakeErp {
        async fn fetch_product(&self, id: &str) -> ErpResult<Value> {
            Ok(json!({"product_id": id, "variants": []}))
        }
        async fn fetch_all_product_index(&self) -> ErpResult<Vec<ProductIndexEntry>> {
            Ok(self.index.clone())
        }
        async fn fetch_item_price(&self, item_code: &str) -> ErpResult<PriceQuote> {
            if item_code == "BAD" {
                return Err(ErpError::Transient("timeout".to_string()));
            }
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
            Ok(json!({"banner": "hi"}))
        }
        async fn fetch_blob(&self, _url: &str) -> ErpResult<Blob> {
            Err(ErpError::Permanent("no blobs".to_string()))
        }
    }

    fn index_with(item_codes: &[&str]) -> Vec<ProductIndexEntry> {
        vec![ProductIndexEntry {
            product_id: "WEB-1".to_string(),
            variants: item_codes
                .iter()
                .map(|c| VariantDescriptor { item_code: c.to_string(), size_unit: None })
                .collect(),
        }]
    }

    #[tokio::test]
    async fn first_refresh_creates_every_family() {
        let kv = MemoryStore::new();
        let erp = FakeErp { index: index_with(&["ITM-1", "ITM-2"]) };
        let config = AppConfig::default();

        let summary = run_full_refresh(&kv, &erp, &config).await;
        assert_eq!(summary.product.total, 1);
        assert_eq!(summary.product.updated, 1);
        assert_eq!(summary.price.total, 2);
        assert_eq!(summary.price.updated, 2);
        assert_eq!(summary.home.updated, 1);
    }

    #[tokio::test]
    async fn second_refresh_reports_unchanged() {
        let kv = MemoryStore::new();
        let erp = FakeErp { index: index_with(&["ITM-1"]) };
        let config = AppConfig::default();

        run_full_refresh(&kv, &erp, &config).await;
        let second = run_full_refresh(&kv, &erp, &config).await;
        assert_eq!(second.product.unchanged, 1);
        assert_eq!(second.price.unchanged, 1);
    }

    #[tokio::test]
    async fn per_item_error_is_recorded_not_fatal() {
        let kv = MemoryStore::new();
        let erp = FakeErp { index: index_with(&["ITM-1", "BAD"]) };
        let config = AppConfig::default();

        let summary = run_full_refresh(&kv, &erp, &config).await;
        assert_eq!(summary.price.total, 2);
        assert_eq!(summary.price.updated, 1);
        assert_eq!(summary.price.errors.len(), 1);
        assert_eq!(summary.price.errors[0].entity_id, "BAD");
    }

    #[tokio::test]
    async fn duplicate_item_codes_across_products_are_deduplicated() {
        let kv = MemoryStore::new();
        let erp = FakeErp {
            index: vec![
                ProductIndexEntry {
                    product_id: "WEB-1".to_string(),
                    variants: vec![VariantDescriptor { item_code: "ITM-1".to_string(), size_unit: None }],
                },
                ProductIndexEntry {
                    product_id: "WEB-2".to_string(),
                    variants: vec![VariantDescriptor { item_code: "ITM-1".to_string(), size_unit: None }],
                },
            ],
        };
        let config = AppConfig::default();
        let summary = run_full_refresh(&kv, &erp, &config).await;
        assert_eq!(summary.price.total, 1);
    }

    #[tokio::test]
    async fn stock_refresh_is_rejected_wholesale_when_reference_is_missing() {
        let kv = MemoryStore::new();
        let erp = FakeErp { index: index_with(&["ITM-1", "ITM-2"]) };
        let config = AppConfig::default();

        let summary = run_full_refresh(&kv, &erp, &config).await;
        assert_eq!(summary.stock.total, 2);
        assert_eq!(summary.stock.updated, 0);
        assert_eq!(summary.stock.errors.len(), 2);

        let cache = crate::cache::CacheStore::new(&kv);
        assert!(cache.read_hash(Family::Stock, "ITM-1").await.unwrap().is_none());
    }
}
