//! Type coercion into declared variable types

use crate::core::value::Value;
use crate::core::variable::VariableType;
use thiserror::Error;

const MAX_SHOWN_VALUE: usize = 64;

/// A non-null value that cannot be represented in the declared type
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot coerce {found} value {value:?} to {target}: {reason}")]
pub struct CoercionError {
    /// Rendering of the offending value, shortened
    pub value: String,
    pub found: &'static str,
    pub target: VariableType,
    pub reason: String,
}

impl CoercionError {
    fn new(value: &Value, target: VariableType, reason: impl Into<String>) -> Self {
        let mut shown = value.render();
        if shown.chars().count() > MAX_SHOWN_VALUE {
            shown = shown.chars().take(MAX_SHOWN_VALUE).collect::<String>() + "...";
        }
        Self {
            value: shown,
            found: value.type_name(),
            target,
            reason: reason.into(),
        }
    }
}

/// Coerce `value` into `target`
///
/// `Null` passes through for every type. For int, float and bool the empty
/// string carries no value and also coerces to `Null`.
pub fn coerce(value: Value, target: VariableType) -> Result<Value, CoercionError> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    match target {
        VariableType::String => Ok(match value {
            Value::String(s) => Value::String(s),
            other => Value::String(other.render()),
        }),
        VariableType::Int => to_int(&value).map(|v| v.map_or(Value::Null, Value::Int)),
        VariableType::Float => to_float(&value).map(|v| v.map_or(Value::Null, Value::Float)),
        VariableType::Bool => to_bool(&value).map(|v| v.map_or(Value::Null, Value::Bool)),
        VariableType::Object => Ok(value),
    }
}

/// Text to parse, or `None` for the empty string
///
/// Surrounding whitespace is ignored when parsing, so whitespace-only text
/// is not empty and fails to parse.
fn parse_text(s: &str) -> Option<&str> {
    (!s.is_empty()).then(|| s.trim())
}

fn float_to_int(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive
    if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f.trunc() as i64)
    } else {
        None
    }
}

fn to_int(value: &Value) -> Result<Option<i64>, CoercionError> {
    let target = VariableType::Int;
    match value {
        Value::Int(i) => Ok(Some(*i)),
        Value::Float(f) => float_to_int(*f)
            .map(Some)
            .ok_or_else(|| CoercionError::new(value, target, "out of integer range")),
        Value::String(s) => {
            let Some(text) = parse_text(s) else {
                return Ok(None);
            };
            if let Ok(i) = text.parse::<i64>() {
                return Ok(Some(i));
            }
            // "12.0" is accepted, "12.5" is not
            match text.parse::<f64>() {
                Ok(f) if f.fract() == 0.0 => float_to_int(f)
                    .map(Some)
                    .ok_or_else(|| CoercionError::new(value, target, "out of integer range")),
                _ => Err(CoercionError::new(value, target, "not an integer")),
            }
        }
        other => Err(CoercionError::new(
            other,
            target,
            format!("{} is not numeric", other.type_name()),
        )),
    }
}

fn to_float(value: &Value) -> Result<Option<f64>, CoercionError> {
    let target = VariableType::Float;
    match value {
        Value::Int(i) => Ok(Some(*i as f64)),
        Value::Float(f) => Ok(Some(*f)),
        Value::String(s) => {
            let Some(text) = parse_text(s) else {
                return Ok(None);
            };
            match text.parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(Some(f)),
                _ => Err(CoercionError::new(value, target, "not a finite number")),
            }
        }
        other => Err(CoercionError::new(
            other,
            target,
            format!("{} is not numeric", other.type_name()),
        )),
    }
}

/// Booleans and the words "true"/"false" in any letter case
fn to_bool(value: &Value) -> Result<Option<bool>, CoercionError> {
    let target = VariableType::Bool;
    match value {
        Value::Bool(b) => Ok(Some(*b)),
        Value::String(s) => {
            let Some(text) = parse_text(s) else {
                return Ok(None);
            };
            if text.eq_ignore_ascii_case("true") {
                Ok(Some(true))
            } else if text.eq_ignore_ascii_case("false") {
                Ok(Some(false))
            } else {
                Err(CoercionError::new(value, target, "expected \"true\" or \"false\""))
            }
        }
        other => Err(CoercionError::new(
            other,
            target,
            format!("{} is not a boolean", other.type_name()),
        )),
    }
}

/// Emptiness rule used for required/default fallback
///
/// `Null` is always empty; scalars are empty at their zero value; an object is
/// never empty.
pub fn is_empty(value: &Value, declared: VariableType) -> bool {
    match (value, declared) {
        (Value::Null, _) => true,
        (_, VariableType::Object) => false,
        (other, _) => other.is_zero(),
    }
}
