//! Dynamic value model
//!
//! `Value` is the common currency between the execution context, the
//! expression evaluator and the type coercer. It mirrors the JSON data model
//! with integers and floats kept apart, so a status code stays an integer
//! all the way through resolution.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Map of string keys to values, ordered by key so rendering is deterministic
pub type ValueMap = BTreeMap<String, Value>;

/// A JSON-like datum
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(ValueMap),
}

impl Value {
    /// Name of the variant, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check whether this is the zero value of a scalar type
    ///
    /// Containers have no canonical zero and are never reported as zero.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !*b,
            Value::Int(i) => *i == 0,
            Value::Float(f) => *f == 0.0,
            Value::String(s) => s.is_empty(),
            Value::List(_) | Value::Map(_) => false,
        }
    }

    /// Look up a key when this value is a map
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Look up a position when this value is a list
    pub fn at(&self, index: i64) -> Option<&Value> {
        match self {
            Value::List(items) => usize::try_from(index).ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    /// Canonical string rendering
    ///
    /// Scalars render the way they would be typed by hand; `Null` renders as
    /// the empty string; lists and maps render as compact JSON with sorted keys.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::List(_) | Value::Map(_) => {
                serde_json::Value::from(self.clone()).to_string()
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            ),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::from(i),
            // NaN and infinities have no JSON form
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s),
            Value::List(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<ValueMap> for Value {
    fn from(map: ValueMap) -> Self {
        Value::Map(map)
    }
}

/// Convert a JSON object into a `ValueMap`; anything else yields an empty map
pub fn value_map(json: serde_json::Value) -> ValueMap {
    match Value::from(json) {
        Value::Map(map) => map,
        _ => ValueMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_keeps_integers_apart_from_floats() {
        assert_eq!(Value::from(json!(12345)), Value::Int(12345));
        assert_eq!(Value::from(json!(123.45)), Value::Float(123.45));
        assert_eq!(Value::from(json!(null)), Value::Null);
    }

    #[test]
    fn test_render_scalars() {
        assert_eq!(Value::Null.render(), "");
        assert_eq!(Value::Bool(true).render(), "true");
        assert_eq!(Value::Int(-7).render(), "-7");
        assert_eq!(Value::Float(123.45).render(), "123.45");
        assert_eq!(Value::Float(2.0).render(), "2");
        assert_eq!(Value::from("abc").render(), "abc");
    }

    #[test]
    fn test_render_containers_is_sorted_json() {
        let value = Value::from(json!({"b": [1, "x"], "a": {"z": null}}));
        assert_eq!(value.render(), r#"{"a":{"z":null},"b":[1,"x"]}"#);
    }

    #[test]
    fn test_zero_values() {
        assert!(Value::Null.is_zero());
        assert!(Value::Int(0).is_zero());
        assert!(Value::Float(0.0).is_zero());
        assert!(Value::Bool(false).is_zero());
        assert!(Value::from("").is_zero());
        assert!(!Value::Map(ValueMap::new()).is_zero());
        assert!(!Value::List(vec![]).is_zero());
        assert!(!Value::Int(200).is_zero());
    }

    #[test]
    fn test_lookup_helpers() {
        let value = Value::from(json!({"rows": [{"col_a": "x"}]}));
        let row = value.get("rows").and_then(|rows| rows.at(0));
        assert_eq!(row.and_then(|r| r.get("col_a")), Some(&Value::from("x")));
        assert_eq!(value.get("rows").and_then(|rows| rows.at(-1)), None);
        assert_eq!(value.get("rows").and_then(|rows| rows.at(5)), None);
        assert_eq!(Value::Int(1).get("x"), None);
    }

    #[test]
    fn test_serde_round_trip_through_json_text() {
        let text = r#"{"a":1,"b":1.5,"c":[true,null],"d":"s"}"#;
        let value: Value = serde_json::from_str(text).unwrap();
        assert_eq!(value.get("a"), Some(&Value::Int(1)));
        assert_eq!(serde_json::to_string(&value).unwrap(), text);
    }
}
