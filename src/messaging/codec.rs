//! # Worker Payload Codec
//!
//! Some workers emit `NaN`, `Infinity` or `-Infinity` inside otherwise
//! valid JSON, which no strict parser accepts. Decoding is therefore
//! lenient: strict parse first, then a literal-sanitizing retry, and as a
//! last resort the raw value is handed back unchanged. Decoding never
//! fails; encoding is plain JSON serialization.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::OnceLock;

use super::errors::{MessagingError, MessagingResult};

/// `-Infinity` must match before `Infinity`: replacing the unsigned
/// literal inside a signed one would leave `-null` behind.
fn literal_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\bInfinity\b|\bNaN\b").unwrap())
}

/// Decode a worker payload.
///
/// Already-structured values pass through untouched. Strings are parsed
/// strictly; if that fails, the non-standard numeric literals are replaced
/// with `null` and parsing is retried; if that also fails, the original
/// value is returned unchanged.
pub fn decode(value: Value) -> Value {
    let raw = match value {
        Value::String(s) => s,
        structured => return structured,
    };

    match serde_json::from_str::<Value>(&raw) {
        Ok(parsed) => parsed,
        Err(_) => {
            let sanitized = literal_pattern().replace_all(&raw, "null");
            match serde_json::from_str::<Value>(&sanitized) {
                Ok(parsed) => parsed,
                Err(_) => Value::String(raw),
            }
        }
    }
}

/// Decode a raw message body.
pub fn decode_str(raw: &str) -> Value {
    decode(Value::String(raw.to_string()))
}

/// Encode a payload for publishing.
pub fn encode<T: Serialize>(payload: &T) -> MessagingResult<Value> {
    serde_json::to_value(payload).map_err(|e| MessagingError::message_serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_strict_json_parses_directly() {
        let decoded = decode_str(r#"{"a": 1, "b": "two"}"#);
        assert_eq!(decoded, json!({"a": 1, "b": "two"}));
    }

    #[test]
    fn test_non_standard_literals_become_null() {
        let decoded = decode_str(r#"{"x": NaN, "y": Infinity}"#);
        assert_eq!(decoded, json!({"x": null, "y": null}));
    }

    #[test]
    fn test_negative_infinity_becomes_null() {
        let decoded = decode_str(r#"{"y": -Infinity}"#);
        assert_eq!(decoded, json!({"y": null}));
    }

    #[test]
    fn test_literals_inside_strings_survive() {
        // "NaN" as a quoted value is valid JSON already; the first parse wins.
        let decoded = decode_str(r#"{"note": "NaN is not a number"}"#);
        assert_eq!(decoded, json!({"note": "NaN is not a number"}));
    }

    #[test]
    fn test_word_boundaries_protect_identifiers() {
        // NaNette is not the literal NaN; sanitization must not corrupt it,
        // so the value stays an unparseable string.
        let decoded = decode_str("NaNette");
        assert_eq!(decoded, Value::String("NaNette".to_string()));
    }

    #[test]
    fn test_unparseable_input_returned_unchanged() {
        let decoded = decode_str("plain string");
        assert_eq!(decoded, Value::String("plain string".to_string()));
    }

    #[test]
    fn test_structured_value_passes_through() {
        let original = json!({"dataset_id": "d1"});
        assert_eq!(decode(original.clone()), original);
    }

    #[test]
    fn test_bare_nan_decodes_to_null() {
        assert_eq!(decode_str("NaN"), Value::Null);
    }

    #[test]
    fn test_encode_round_trip() {
        #[derive(Serialize)]
        struct Payload {
            dataset_id: String,
        }
        let value = encode(&Payload {
            dataset_id: "d1".to_string(),
        })
        .unwrap();
        assert_eq!(value, json!({"dataset_id": "d1"}));
    }
}
