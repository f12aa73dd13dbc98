//! Canonical argument hashing for loop fingerprinting.
//!
//! Two logically equal argument sets must hash identically even when their
//! object keys were built in different insertion order, so objects are
//! rendered with sorted keys before digesting. Sequence order stays
//! significant.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hex characters kept from the SHA-256 digest. 16 bytes is collision-free
/// at the scale of a single run's history window.
const DIGEST_PREFIX_LEN: usize = 32;

/// Hash a tool invocation (name + structured arguments) into a stable
/// fingerprint. The tool name participates so identical arguments to
/// different tools never collide.
pub fn hash_tool_call(tool_name: &str, args: &Value) -> String {
    let mut canonical = String::new();
    render(args, &mut canonical);
    digest(&format!("{}:{}", tool_name, canonical))
}

/// Hash tool output as opaque text.
pub fn hash_result(content: &str) -> String {
    digest(content)
}

fn digest(input: &str) -> String {
    let hash = Sha256::digest(input.as_bytes());
    let mut encoded = hex::encode(hash);
    encoded.truncate(DIGEST_PREFIX_LEN);
    encoded
}

fn render(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(key);
                out.push(':');
                render(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                render(item, out);
            }
            out.push(']');
        }
        // Scalars use their JSON text, which is lossless and unambiguous
        // (strings come out quoted and escaped, so "1" and 1 differ).
        other => out.push_str(&other.to_string()),
    }
}
