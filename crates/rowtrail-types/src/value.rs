//! Typed scalar values carried in row images.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A typed column value.
///
/// Equality for change detection is [`Value::is_distinct_from`], which follows
/// SQL `IS DISTINCT FROM`: null equals null and differs from everything else.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// SQL NULL.
    #[default]
    Null,
    /// Boolean value.
    Boolean(bool),
    /// 64-bit signed integer.
    Integer(i64),
    /// Double precision float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
    /// UTC timestamp.
    Timestamp(DateTime<Utc>),
    /// Structured JSON document, compared by value only.
    Json(serde_json::Value),
}

impl Value {
    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null-aware inequality.
    ///
    /// Two NaN reals are not distinct, matching how the store compares
    /// floating point columns.
    pub fn is_distinct_from(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Real(a), Value::Real(b)) if a.is_nan() && b.is_nan() => false,
            (a, b) => a != b,
        }
    }

    /// Canonical text representation, `None` for NULL.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Boolean(b) => Some(b.to_string()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Real(r) => Some(r.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Blob(bytes) => Some(hex_literal(bytes)),
            Value::Timestamp(ts) => Some(ts.to_rfc3339_opts(SecondsFormat::Micros, true)),
            Value::Json(json) => Some(json.to_string()),
        }
    }

    /// Converts this value to JSON for whole-row images.
    ///
    /// Values without a natural JSON form (blobs, timestamps, non-finite reals)
    /// use their canonical text.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::Number((*i).into()),
            Value::Real(r) => serde_json::Number::from_f64(*r)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(r.to_string())),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Json(json) => json.clone(),
            other => other
                .to_text()
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

fn hex_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for byte in bytes {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Some(text) => f.write_str(&text),
            None => f.write_str("NULL"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Real(r)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Blob(bytes)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Value::Timestamp(ts)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::Json(json)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use test_case::test_case;

    #[test_case(Value::Null, Value::Null, false ; "null vs null")]
    #[test_case(Value::Null, Value::Integer(0), true ; "null vs zero")]
    #[test_case(Value::Text(String::new()), Value::Null, true ; "empty text vs null")]
    #[test_case(Value::Integer(1), Value::Integer(1), false ; "equal integers")]
    #[test_case(Value::Integer(1), Value::Integer(2), true ; "different integers")]
    #[test_case(Value::Real(f64::NAN), Value::Real(f64::NAN), false ; "nan vs nan")]
    #[test_case(Value::Real(0.5), Value::Real(0.25), true ; "different reals")]
    #[test_case(Value::Json(json!({"a": 1})), Value::Json(json!({"a": 1})), false ; "equal json")]
    #[test_case(Value::Json(json!([1, 2])), Value::Json(json!([2, 1])), true ; "reordered array")]
    fn test_is_distinct_from(a: Value, b: Value, expected: bool) {
        assert_eq!(a.is_distinct_from(&b), expected);
        assert_eq!(b.is_distinct_from(&a), expected);
    }

    #[test_case(Value::Boolean(true), "true")]
    #[test_case(Value::Integer(-42), "-42")]
    #[test_case(Value::Real(1.5), "1.5")]
    #[test_case(Value::Text("a|b".into()), "a|b")]
    #[test_case(Value::Blob(vec![0xde, 0xad, 0x01]), "\\xdead01")]
    #[test_case(Value::Json(json!({"k": [1, null]})), "{\"k\":[1,null]}")]
    fn test_canonical_text(value: Value, expected: &str) {
        assert_eq!(value.to_text().as_deref(), Some(expected));
    }

    #[test]
    fn test_null_has_no_text() {
        assert_eq!(Value::Null.to_text(), None);
        assert_eq!(Value::Null.to_string(), "NULL");
    }

    #[test]
    fn test_timestamp_text_is_utc_micros() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(
            Value::Timestamp(ts).to_text().unwrap(),
            "2024-01-15T10:30:00.000000Z"
        );
    }

    #[test]
    fn test_to_json_falls_back_to_text() {
        assert_eq!(Value::Integer(7).to_json(), json!(7));
        assert_eq!(Value::Blob(vec![1]).to_json(), json!("\\x01"));
        assert_eq!(Value::Real(f64::INFINITY).to_json(), json!("inf"));
        assert_eq!(Value::Null.to_json(), json!(null));
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
    }

    #[test]
    fn test_serde_keeps_type_tag() {
        let value = Value::Integer(3);
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json, json!({"type": "integer", "value": 3}));
        let back: Value = serde_json::from_value(json).unwrap();
        assert_eq!(back, value);
    }
}
