//! Product family transform. The only non-hermetic step in the pipeline:
//! each variant's current price tier is read back from the price cache
//! (not re-fetched from ERP) and embedded into the product payload, so a
//! product webhook reflects whatever price was last materialized rather
//! than triggering its own ERP round trip.

use serde_json::Value;

use crate::cache::{CacheStore, Family};
use crate::kv::KvResult;

/// Embed each variant's cached `[retail, wholesale]` price, keyed by
/// `item_code`, into `raw.variants[*].price`. Variants with no cached
/// price yet are left without a `price` field rather than defaulted to
/// zero — that would be indistinguishable from an actual zero price.
pub async fn transform_product(cache: &CacheStore<'_>, mut raw: Value) -> KvResult<Value> {
    let item_codes: Vec<String> = raw
        .get("variants")
        .and_then(Value::as_array)
        .map(|variants| {
            variants
                .iter()
                .filter_map(|v| v.get("item_code").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut prices = Vec::with_capacity(item_codes.len());
    for item_code in &item_codes {
        prices.push(cache.read_simple(Family::Price, item_code).await?);
    }

    if let Some(variants) = raw.get_mut("variants").and_then(Value::as_array_mut) {
        for variant in variants.iter_mut() {
            let item_code = variant
                .get("item_code")
                .and_then(Value::as_str)
                .map(str::to_string);
            let Some(item_code) = item_code else { continue };
            let Some(pos) = item_codes.iter().position(|c| *c == item_code) else {
                continue;
            };
            if let Some(price) = &prices[pos] {
                if let Some(obj) = variant.as_object_mut() {
                    obj.insert("price".to_string(), price.clone());
                }
            }
        }
    }

    Ok(raw)
}
