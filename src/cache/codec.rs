//! Self-describing text codec for cache values, with corruption quarantine
//! (§4.A, §8 invariant 5).
//!
//! Values are written as JSON text. On read, a handful of sentinel strings
//! that indicate a value was serialized by a buggy upstream writer (an
//! un-stringified object, a JS `null`/`undefined`, or nothing at all) are
//! treated as corruption rather than as data: the key is deleted and the read
//! reports a miss. Strings that happen to look like a strict ISO-8601 UTC
//! timestamp are rehydrated into a [`chrono::DateTime<Utc>`] rather than left
//! as a bare JSON string, since several entity classes round-trip timestamps
//! through the cache.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

const SENTINELS: [&str; 3] = ["[object Object]", "null", "undefined"];

static ISO8601_UTC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?Z$").expect("valid regex")
});

/// What a decoded cache value turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Timestamp(DateTime<Utc>),
    Json(Value),
}

impl Decoded {
    pub fn into_json(self) -> Value {
        match self {
            Decoded::Timestamp(ts) => Value::String(ts.to_rfc3339()),
            Decoded::Json(v) => v,
        }
    }
}

pub fn encode(value: &Value) -> String {
    value.to_string()
}

/// Decode a raw cache payload. `Ok(None)` with `quarantine = true` via the
/// second return slot tells the caller to delete the key; `Ok(None)` alone
/// covers an already-empty read.
pub fn decode(raw: &str) -> DecodeOutcome {
    if raw.trim().is_empty() || SENTINELS.contains(&raw) {
        return DecodeOutcome::Corrupt;
    }

    // A raw value might be a bare (unquoted) timestamp string stored directly,
    // not JSON-wrapped — check that shape before attempting JSON parsing.
    if ISO8601_UTC.is_match(raw) {
        return match DateTime::parse_from_rfc3339(raw) {
            Ok(dt) => DecodeOutcome::Ok(Decoded::Timestamp(dt.with_timezone(&Utc))),
            Err(_) => DecodeOutcome::Corrupt,
        };
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::String(ref s)) if ISO8601_UTC.is_match(s) => {
            match DateTime::parse_from_rfc3339(s) {
                Ok(dt) => DecodeOutcome::Ok(Decoded::Timestamp(dt.with_timezone(&Utc))),
                Err(_) => DecodeOutcome::Corrupt,
            }
        }
        Ok(value) => DecodeOutcome::Ok(Decoded::Json(value)),
        Err(_) => DecodeOutcome::Corrupt,
    }
}

pub enum DecodeOutcome {
    Ok(Decoded),
    Corrupt,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarantines_object_object() {
        assert!(matches!(decode("[object Object]"), DecodeOutcome::Corrupt));
    }

    #[test]
    fn quarantines_null_and_undefined() {
        assert!(matches!(decode("null"), DecodeOutcome::Corrupt));
        assert!(matches!(decode("undefined"), DecodeOutcome::Corrupt));
    }

    #[test]
    fn quarantines_empty() {
        assert!(matches!(decode(""), DecodeOutcome::Corrupt));
        assert!(matches!(decode("   "), DecodeOutcome::Corrupt));
    }

    #[test]
    fn quarantines_invalid_json() {
        assert!(matches!(decode("{not json"), DecodeOutcome::Corrupt));
    }

    #[test]
    fn rehydrates_bare_timestamp() {
        match decode("2024-01-02T03:04:05Z") {
            DecodeOutcome::Ok(Decoded::Timestamp(ts)) => {
                assert_eq!(ts.to_rfc3339(), "2024-01-02T03:04:05+00:00");
            }
            _ => panic!("expected timestamp"),
        }
    }

    #[test]
    fn rehydrates_quoted_timestamp() {
        match decode("\"2024-01-02T03:04:05.500Z\"") {
            DecodeOutcome::Ok(Decoded::Timestamp(_)) => {}
            _ => panic!("expected timestamp"),
        }
    }

    #[test]
    fn passes_through_plain_json_object() {
        match decode(r#"{"ownerUserId":"1"}"#) {
            DecodeOutcome::Ok(Decoded::Json(Value::Object(map))) => {
                assert_eq!(map.get("ownerUserId").unwrap(), "1");
            }
            _ => panic!("expected json object"),
        }
    }

    #[test]
    fn passes_through_plain_text() {
        match decode("\"some-nick\"") {
            DecodeOutcome::Ok(Decoded::Json(Value::String(s))) => assert_eq!(s, "some-nick"),
            _ => panic!("expected string"),
        }
    }
}
