//! Stock family: a binary availability vector positioned against the
//! warehouse reference axis. Matching is case-insensitive and tolerant of
//! surrounding whitespace. ERP warehouse names frequently carry a trailing
//! company-abbreviation suffix (e.g. `"Homs Store - P"` for the `"Homs"`
//! location); a reference name is matched if it appears as a whole word
//! at the front of the canonicalized reported name. A name from the ERP
//! that still doesn't canonicalize to any reference entry is logged and
//! simply contributes nothing.

use serde_json::{json, Value};

fn canonicalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Drop a trailing `" - <abbr>"` company suffix, if present.
fn strip_company_suffix(name: &str) -> &str {
    name.rsplit_once(" - ").map(|(base, _abbr)| base).unwrap_or(name)
}

fn matches(reference: &str, reported: &str) -> bool {
    let base = strip_company_suffix(reported);
    base == reference || base.split_whitespace().next() == Some(reference)
}

/// Build the availability vector for one item given the warehouse names
/// ERP reports it as in-stock at, against the ordered reference axis.
pub fn transform_stock(item_warehouses: &[String], reference: &[String]) -> Value {
    let canonical_reference: Vec<String> = reference.iter().map(|w| canonicalize(w)).collect();
    let mut availability = vec![0u8; reference.len()];

    for reported in item_warehouses {
        let canonical = canonicalize(reported);
        let matched = canonical_reference.iter().position(|r| matches(r, &canonical));

        match matched {
            Some(idx) => availability[idx] = 1,
            None => {
                tracing::warn!(warehouse = %reported, "warehouse not in reference, dropping");
            }
        }
    }

    Value::Array(availability.into_iter().map(|v| json!(v)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> Vec<String> {
        vec!["Idlib", "Allepo", "Homs", "Hama", "Latakia"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn exact_and_case_insensitive_matches_set_the_right_bit() {
        let reported = vec!["homs".to_string()];
        let result = transform_stock(&reported, &reference());
        assert_eq!(result, json!([0, 0, 1, 0, 0]));
    }

    #[test]
    fn whitespace_and_suffix_variants_match_after_trim() {
        let reported = vec![" Homs ".to_string()];
        let result = transform_stock(&reported, &reference());
        assert_eq!(result, json!([0, 0, 1, 0, 0]));
    }

    #[test]
    fn company_suffix_and_generic_qualifier_are_tolerated_when_location_matches() {
        let reported = vec!["Homs Store - P".to_string()];
        let result = transform_stock(&reported, &reference());
        assert_eq!(result, json!([0, 0, 1, 0, 0]));
    }

    #[test]
    fn truly_unknown_warehouse_is_dropped_not_fatal() {
        let reported = vec!["Nonexistent Depot - P".to_string()];
        let result = transform_stock(&reported, &reference());
        assert_eq!(result, json!([0, 0, 0, 0, 0]));
    }

    #[test]
    fn empty_reference_yields_empty_vector() {
        let result = transform_stock(&["Homs".to_string()], &[]);
        assert_eq!(result, json!([]));
    }
}
