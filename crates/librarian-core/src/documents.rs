//! The two JSON documents every library archive holds.
//!
//! Both are kept as ordered JSON objects so keys this crate does not know
//! about survive a load/save cycle untouched and in their original order.

use serde_json::{Map, Value};

/// An ordered JSON object.
pub type Document = Map<String, Value>;

/// Archive entry holding the library configuration. Also the entry probed when
/// verifying a password.
pub const CONFIG_DOCUMENT: &str = "config.json";
/// Archive entry holding the library metadata.
pub const META_DOCUMENT: &str = "meta.json";

/// Config key holding one visibility flag per display column.
pub const HEADERS_KEY: &str = "headers";

/// Display columns, in table order.
pub const HEADER_COLUMNS: [&str; 8] = [
    "filename",
    "tags",
    "rating",
    "playcount",
    "skipcount",
    "duration",
    "date",
    "lastplayed",
];

pub const DEFAULT_HEADERS: [bool; 8] = [true, true, true, false, false, false, true, false];

/// Position of a display column by name (case-insensitive).
pub fn column_index(column: &str) -> Option<usize> {
    HEADER_COLUMNS
        .iter()
        .position(|known| known.eq_ignore_ascii_case(column))
}

/// Config document written into a brand-new library.
pub fn default_config(headers: &[bool]) -> Document {
    let mut config = Document::new();
    config.insert(HEADERS_KEY.to_string(), headers_value(headers));
    config
}

pub fn headers_value(headers: &[bool]) -> Value {
    Value::Array(headers.iter().copied().map(Value::Bool).collect())
}

/// Reads the header flags from a config document. Falls back to `default`
/// when the key is missing or is not an array of booleans.
pub fn headers_from(config: &Document, default: &[bool]) -> Vec<bool> {
    config
        .get(HEADERS_KEY)
        .and_then(Value::as_array)
        .and_then(|flags| flags.iter().map(Value::as_bool).collect::<Option<Vec<_>>>())
        .unwrap_or_else(|| default.to_vec())
}

/// Parses a stored document. Anything other than a UTF-8 JSON object is rejected.
pub fn decode(bytes: &[u8]) -> Result<Document, String> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(document)) => Ok(document),
        Ok(other) => Err(format!("expected a JSON object, found {}", kind(&other))),
        Err(err) => Err(format!("invalid JSON: {err}")),
    }
}

pub fn encode(document: &Document) -> Vec<u8> {
    // Serializing a map of `Value`s cannot fail.
    serde_json::to_vec(document).unwrap_or_default()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn default_config_holds_only_headers() {
        let config = default_config(&DEFAULT_HEADERS);
        assert_eq!(
            Value::Object(config),
            json!({"headers": [true, true, true, false, false, false, true, false]})
        );
    }

    #[test]
    fn headers_fall_back_when_missing_or_malformed() {
        let mut config = Document::new();
        assert_eq!(headers_from(&config, &[true, false]), vec![true, false]);

        config.insert(HEADERS_KEY.into(), json!([true, "yes"]));
        assert_eq!(headers_from(&config, &[false]), vec![false]);

        config.insert(HEADERS_KEY.into(), json!([false, false, true]));
        assert_eq!(headers_from(&config, &[true]), vec![false, false, true]);
    }

    #[test]
    fn decode_keeps_key_order() {
        let document = decode(br#"{"zeta": 1, "alpha": {"nested": [1, 2]}, "mid": null}"#)
            .expect("decode object");
        let keys: Vec<_> = document.keys().map(String::as_str).collect();
        assert_eq!(keys, ["zeta", "alpha", "mid"]);
        assert_eq!(encode(&document), br#"{"zeta":1,"alpha":{"nested":[1,2]},"mid":null}"#);
    }

    #[test]
    fn decode_rejects_non_objects() {
        let err = decode(b"[1, 2]").expect_err("arrays are not documents");
        assert!(err.contains("an array"));
        assert!(decode(b"{not json").is_err());
        assert!(decode(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn columns_resolve_case_insensitively() {
        assert_eq!(column_index("Rating"), Some(2));
        assert_eq!(column_index("lastplayed"), Some(7));
        assert_eq!(column_index("bitrate"), None);
    }
}
