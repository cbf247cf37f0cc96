//! Conversion between JSON-shaped payloads and the store's tagged values.
//!
//! The mapping is total over null, bool, integer, float, string, list, and
//! object; round-tripping any payload within that set yields an equal value.

use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{ListValue, Struct, Value as StoreValue};
use serde_json::{Map, Number, Value};
use std::collections::{BTreeMap, HashMap};

/// Convert a native JSON value into the store's tagged representation.
pub fn to_store_value(value: &Value) -> StoreValue {
    let kind = match value {
        Value::Null => Kind::NullValue(0),
        Value::Bool(b) => Kind::BoolValue(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Kind::IntegerValue(i)
            } else {
                Kind::DoubleValue(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => Kind::StringValue(s.clone()),
        Value::Array(items) => Kind::ListValue(ListValue {
            values: items.iter().map(to_store_value).collect(),
        }),
        Value::Object(map) => Kind::StructValue(Struct {
            fields: map
                .iter()
                .map(|(k, v)| (k.clone(), to_store_value(v)))
                .collect(),
        }),
    };
    StoreValue { kind: Some(kind) }
}

/// Convert a tagged store value back into native JSON.
pub fn from_store_value(value: &StoreValue) -> Value {
    match &value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(*b),
        Some(Kind::IntegerValue(i)) => Value::Number((*i).into()),
        Some(Kind::DoubleValue(d)) => Number::from_f64(*d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s.clone()),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.iter().map(from_store_value).collect())
        }
        Some(Kind::StructValue(fields)) => {
            let mut map = Map::new();
            for (k, v) in &fields.fields {
                map.insert(k.clone(), from_store_value(v));
            }
            Value::Object(map)
        }
    }
}

pub fn to_store_payload(payload: &BTreeMap<String, Value>) -> HashMap<String, StoreValue> {
    payload
        .iter()
        .map(|(k, v)| (k.clone(), to_store_value(v)))
        .collect()
}

pub fn from_store_payload(payload: &HashMap<String, StoreValue>) -> BTreeMap<String, Value> {
    payload
        .iter()
        .map(|(k, v)| (k.clone(), from_store_value(v)))
        .collect()
}

/// Fetch a string field from a payload map.
pub fn payload_str<'a>(payload: &'a BTreeMap<String, Value>, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str)
}

/// Fetch a string-list field from a payload map.
pub fn payload_str_list(payload: &BTreeMap<String, Value>, key: &str) -> Vec<String> {
    payload
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Fetch an integer field from a payload map.
pub fn payload_i64(payload: &BTreeMap<String, Value>, key: &str) -> Option<i64> {
    payload.get(key).and_then(Value::as_i64)
}
