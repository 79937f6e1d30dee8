//! Cache Key Derivation
//!
//! A logical request (content type + request object) is rendered into a
//! canonical form with object members sorted by name, then hashed. Equal
//! requests yield the same key in every process, independent of field order
//! or map iteration order.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::model::ContentType;
use crate::error::Result;

/// Derive the cache key for a serializable request
pub fn derive_key<T: Serialize + ?Sized>(content_type: ContentType, request: &T) -> Result<String> {
    let value = serde_json::to_value(request)?;
    Ok(derive_key_from_value(content_type, &value))
}

/// Derive the cache key for an already-built JSON request
pub fn derive_key_from_value(content_type: ContentType, request: &Value) -> String {
    let mut canonical = String::with_capacity(128);
    canonicalize(request, &mut canonical);

    let mut hasher = Sha256::new();
    hasher.update(content_type.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();

    format!("{}:{:x}", content_type.as_str(), digest)
}

/// Key pattern matching every key of one content type
pub fn content_type_pattern(content_type: ContentType) -> String {
    format!("{}:*", content_type.as_str())
}

/// Write `value` as compact JSON with object members sorted by key
pub fn canonicalize(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut members: Vec<(&String, &Value)> = map.iter().collect();
            members.sort_unstable_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (name, member)) in members.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                push_json_string(name, out);
                out.push(':');
                canonicalize(member, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                canonicalize(item, out);
            }
            out.push(']');
        }
        Value::String(s) => push_json_string(s, out),
        // Null, bool and number have a single compact rendering
        other => out.push_str(&other.to_string()),
    }
}

fn push_json_string(s: &str, out: &mut String) {
    // serde_json's string escaping is deterministic
    out.push_str(&Value::String(s.to_owned()).to_string());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_key_shape() {
        let key = derive_key(ContentType::AiResponse, &json!({"prompt": "hi"})).unwrap();
        let (prefix, digest) = key.split_once(':').unwrap();
        assert_eq!(prefix, "ai_response");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_field_order_independent() {
        let a = json!({"text": "hello", "voice": {"pitch": 1.2, "speed": 0.9}, "lang": "en"});
        let b = json!({"lang": "en", "voice": {"speed": 0.9, "pitch": 1.2}, "text": "hello"});
        assert_eq!(
            derive_key_from_value(ContentType::VoiceSynthesis, &a),
            derive_key_from_value(ContentType::VoiceSynthesis, &b)
        );
    }

    #[test]
    fn test_hashmap_iteration_order_independent() {
        let mut first = HashMap::new();
        let mut second = HashMap::new();
        for i in 0..32 {
            first.insert(format!("field-{}", i), i);
        }
        for i in (0..32).rev() {
            second.insert(format!("field-{}", i), i);
        }
        assert_eq!(
            derive_key(ContentType::Configuration, &first).unwrap(),
            derive_key(ContentType::Configuration, &second).unwrap()
        );
    }

    #[test]
    fn test_content_type_separates_keys() {
        let request = json!({"id": 7});
        assert_ne!(
            derive_key_from_value(ContentType::AiResponse, &request),
            derive_key_from_value(ContentType::EmotionAnalysis, &request)
        );
    }

    #[test]
    fn test_array_order_matters() {
        let a = json!({"ids": [1, 2]});
        let b = json!({"ids": [2, 1]});
        assert_ne!(
            derive_key_from_value(ContentType::AiResponse, &a),
            derive_key_from_value(ContentType::AiResponse, &b)
        );
    }

    #[test]
    fn test_canonical_rendering() {
        let mut out = String::new();
        canonicalize(&json!({"b": [true, null], "a": "x\"y"}), &mut out);
        assert_eq!(out, r#"{"a":"x\"y","b":[true,null]}"#);
    }

    #[test]
    fn test_repeat_calls_identical() {
        let key = derive_key_from_value(ContentType::UserSession, &json!({}));
        let again = derive_key_from_value(ContentType::UserSession, &json!({}));
        assert_eq!(key, again);
        assert!(key.starts_with("user_session:"));
    }

    #[test]
    fn test_pattern() {
        assert_eq!(content_type_pattern(ContentType::StaticAsset), "static_asset:*");
    }
}
