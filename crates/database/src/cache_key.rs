//! Canonical request encoding for the RPC response cache.
//!
//! Canonical form: object keys sorted recursively, hex strings lower-cased.
//! The cache key is the md5 of the canonical string; the algorithm is fixed
//! for cross-version cache compatibility.

use serde_json::Value;

/// Renders a JSON request in canonical form.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::String(s) => {
            let lowered = if s.starts_with("0x") || s.starts_with("0X") {
                Value::String(s.to_ascii_lowercase())
            } else {
                Value::String(s.clone())
            };
            out.push_str(&lowered.to_string());
        }
        other => out.push_str(&other.to_string()),
    }
}

/// md5 of the canonical request string.
pub fn request_hash(canonical: &str) -> [u8; 16] {
    md5::compute(canonical.as_bytes()).0
}
