//! JSON <-> Host Value Conversions
//!
//! Bidirectional conversion between `serde_json::Value` and [`Value`], so
//! parameter maps can be loaded from JSON documents and results dumped back.
//!
//! # Type Mapping
//!
//! | JSON Type | Host Value |
//! |-----------|------------|
//! | null | `Null` |
//! | boolean | `Bool` |
//! | integral number | `Int` |
//! | other number | `Float` |
//! | string | `String` |
//! | array | `Table` |
//! | object | `Structure` |
//!
//! In the other direction `Decimal` becomes a JSON string (no precision
//! loss), `Bytes` a lowercase hex string, and `Date`/`Time` the backend's
//! `YYYYMMDD`/`HHMMSS` text.

use serde_json::{Map, Number, Value as JsonValue};

use crate::protocol::error::{Result, RfcError};
use crate::protocol::value::{Record, Value};

/// Convert serde_json::Value to a host value.
pub fn json_to_value(json: JsonValue) -> Value {
    match json {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => Value::String(s),
        JsonValue::Array(items) => Value::Table(items.into_iter().map(json_to_value).collect()),
        JsonValue::Object(map) => Value::Structure(
            map.into_iter()
                .map(|(k, v)| (k, json_to_value(v)))
                .collect(),
        ),
    }
}

/// Convert a JSON object into a parameter map.
///
/// # Errors
///
/// Returns `RfcError::InvalidArgument` if `json` is not an object.
pub fn json_to_record(json: JsonValue) -> Result<Record> {
    match json_to_value(json) {
        Value::Structure(record) => Ok(record),
        other => Err(RfcError::InvalidArgument(format!(
            "expected a JSON object, received {}",
            other.kind()
        ))),
    }
}

/// Convert a host value to serde_json::Value.
///
/// # Errors
///
/// Returns `RfcError::InvalidArgument` for NaN or infinite floats, which
/// JSON cannot represent.
pub fn value_to_json(value: &Value) -> Result<JsonValue> {
    Ok(match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(i) => JsonValue::Number((*i).into()),
        Value::Float(f) => JsonValue::Number(Number::from_f64(*f).ok_or_else(|| {
            RfcError::InvalidArgument(format!("float {} cannot be represented in JSON", f))
        })?),
        Value::Decimal(d) => JsonValue::String(d.to_string()),
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Bytes(b) => JsonValue::String(hex::encode(b)),
        Value::Date(d) => JsonValue::String(d.format("%Y%m%d").to_string()),
        Value::Time(t) => JsonValue::String(t.format("%H%M%S").to_string()),
        Value::Structure(record) => record_to_json(record)?,
        Value::Table(rows) => {
            JsonValue::Array(rows.iter().map(value_to_json).collect::<Result<_>>()?)
        }
    })
}

/// Convert a result map to a JSON object.
pub fn record_to_json(record: &Record) -> Result<JsonValue> {
    let mut map = Map::with_capacity(record.len());
    for (key, value) in record {
        map.insert(key.clone(), value_to_json(value)?);
    }
    Ok(JsonValue::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::{NaiveDate, NaiveTime};
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn test_json_to_value_nested() {
        let value = json_to_value(json!({
            "IMPORTSTRUCT": {"RFCINT4": 345, "RFCFLOAT": 1.5, "RFCCHAR1": "A"},
            "RFCTABLE": [{"RFCINT1": 1}, {"RFCINT1": 2}],
            "FLAG": true,
            "EMPTY": null
        }));

        let record = value.as_record().unwrap();
        assert_eq!(record["FLAG"], Value::Bool(true));
        assert_eq!(record["EMPTY"], Value::Null);
        assert_eq!(
            value.get("IMPORTSTRUCT").unwrap().get("RFCINT4"),
            Some(&Value::Int(345))
        );
        assert_eq!(
            value.get("IMPORTSTRUCT").unwrap().get("RFCFLOAT"),
            Some(&Value::Float(1.5))
        );
        assert_eq!(record["RFCTABLE"].as_table().unwrap().len(), 2);
    }

    #[test]
    fn test_json_to_record_requires_object() {
        assert!(json_to_record(json!({"A": 1})).is_ok());
        let err = json_to_record(json!([1, 2])).unwrap_err();
        assert!(matches!(err, RfcError::InvalidArgument(_)));
    }

    #[test]
    fn test_value_to_json_special_types() {
        let record = crate::record! {
            "AMOUNT" => BigDecimal::from_str("1234.50").unwrap(),
            "RAW" => vec![0x01u8, 0xAB, 0xff],
            "DAY" => NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            "AT" => NaiveTime::from_hms_opt(12, 11, 20).unwrap(),
        };

        let json = record_to_json(&record).unwrap();
        assert_eq!(json["AMOUNT"], json!("1234.50"));
        assert_eq!(json["RAW"], json!("01abff"));
        assert_eq!(json["DAY"], json!("20240115"));
        assert_eq!(json["AT"], json!("121120"));
    }

    #[test]
    fn test_value_to_json_rejects_nan() {
        let err = value_to_json(&Value::Float(f64::NAN)).unwrap_err();
        assert!(matches!(err, RfcError::InvalidArgument(_)));
    }

    #[test]
    fn test_table_roundtrip() {
        let original = json!([{"NAME": "x", "COUNT": 3}, "scalar", 7]);
        let back = value_to_json(&json_to_value(original.clone())).unwrap();
        assert_eq!(back, original);
    }
}
