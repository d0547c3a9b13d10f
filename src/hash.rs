//! # Content Hasher
//!
//! Deterministic SHA-256 digest over normalized JSON. Two values that are
//! structurally equal once keys are sorted hash identically regardless of
//! field order in the source payload — this is what lets the change
//! detector (`crate::detect`) tell "ERP re-sent the same data in a different
//! key order" apart from "the data actually changed".

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Compute the canonical content hash of a JSON value.
///
/// Contract: deterministic across runs and platforms.
/// - Object keys are sorted byte-wise, recursively.
/// - Array order is preserved (it's semantically meaningful, e.g. stock
///   availability vectors are positional).
/// - Strings pass through unchanged; no case/whitespace normalization.
pub fn content_hash(value: &Value) -> String {
    let normalized = normalize(value);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Byte-wise equality of two content hashes. Empty or missing hashes never
/// compare equal to anything, including each other.
pub fn hashes_equal(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && a == b
}

/// Render `value` as a canonical JSON string: object keys sorted ascending
/// (recursively), arrays left in their original order.
fn normalize(value: &Value) -> String {
    let mut out = String::new();
    write_normalized(value, &mut out);
    out
}

fn write_normalized(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            // Integer-valued floats are emitted without a trailing ".0"; this
            // is an arbitrary but fixed choice per the hasher's contract, and
            // must stay consistent across the lifetime of the deployment.
            if let Some(i) = n.as_i64() {
                out.push_str(&i.to_string());
            } else if let Some(u) = n.as_u64() {
                out.push_str(&u.to_string());
            } else if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f.is_finite() && f.abs() < 1e18 {
                    out.push_str(&(f as i64).to_string());
                } else {
                    out.push_str(&n.to_string());
                }
            } else {
                out.push_str(&n.to_string());
            }
        }
        Value::String(s) => {
            out.push('"');
            for c in s.chars() {
                match c {
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\t' => out.push_str("\\t"),
                    c if (c as u32) < 0x20 => {
                        out.push_str(&format!("\\u{:04x}", c as u32));
                    }
                    c => out.push(c),
                }
            }
            out.push('"');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_normalized(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_normalized(&Value::String((*key).clone()), out);
                out.push(':');
                write_normalized(&map[*key], out);
            }
            out.push('}');
        }
    }
}

/// Canonical deletion-marker value hashed in place of a family's data when an
/// entity is removed.
pub fn deletion_marker(entity_id: &str) -> Value {
    serde_json::json!({ "deleted": true, "entity_id": entity_id })
}
