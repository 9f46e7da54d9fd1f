//! Payload shaping and lax field coercion shared by all record kinds.

use crate::error::ValidationError;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::de::{Deserializer, Error};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Key under which multi-field devices may nest their measurements.
pub const READINGS_KEY: &str = "readings";

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

pub fn into_object(value: Value) -> Result<Map<String, Value>, ValidationError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ValidationError::NotAnObject),
    }
}

/// Merges the fields nested under `readings` into the top level object.
///
/// Top level keys win over nested keys of the same name, so both payload
/// shapes yield the same field map.
pub fn flatten_readings(value: Value) -> Result<Map<String, Value>, ValidationError> {
    let mut top = into_object(value)?;
    match top.remove(READINGS_KEY) {
        None | Some(Value::Null) => Ok(top),
        Some(Value::Object(mut nested)) => {
            for (key, value) in top {
                nested.insert(key, value);
            }
            Ok(nested)
        }
        Some(other) => Err(ValidationError::Readings(json_type(&other))),
    }
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    // naive timestamps are taken as UTC
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

pub(crate) fn timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| D::Error::custom(format!("invalid ISO-8601 timestamp: {:?}", raw)))
}

pub(crate) fn lax_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    coerce_f64(Value::deserialize(deserializer)?).map_err(D::Error::custom)
}

pub(crate) fn lax_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        value => coerce_f64(value).map(Some).map_err(D::Error::custom),
    }
}

fn coerce_f64(value: Value) -> Result<f64, String> {
    let parsed = match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(f) if f.is_finite() => Ok(f),
        _ => Err(format!("expected a finite number, got {}", value)),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
