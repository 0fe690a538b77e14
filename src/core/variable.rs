//! Declared step inputs and their resolution

use crate::core::coerce::{coerce, is_empty, CoercionError};
use crate::core::context::ExecutionContext;
use crate::core::value::{Value, ValueMap};
use crate::expression;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Semantic type of a declared variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    #[default]
    #[serde(alias = "VARIABLE_TYPE_STRING")]
    String,
    #[serde(alias = "VARIABLE_TYPE_INT")]
    Int,
    #[serde(alias = "VARIABLE_TYPE_FLOAT")]
    Float,
    #[serde(alias = "VARIABLE_TYPE_BOOL")]
    Bool,
    #[serde(alias = "VARIABLE_TYPE_OBJECT")]
    Object,
}

impl VariableType {
    pub const ALL: [VariableType; 5] = [
        VariableType::String,
        VariableType::Int,
        VariableType::Float,
        VariableType::Bool,
        VariableType::Object,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VariableType::String => "string",
            VariableType::Int => "int",
            VariableType::Float => "float",
            VariableType::Bool => "bool",
            VariableType::Object => "object",
        }
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure to prepare a step's inputs
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error("variable '{variable}' (type {var_type}): {source}")]
    TypeCoercion {
        variable: String,
        var_type: VariableType,
        #[source]
        source: CoercionError,
    },
}

/// An input declared on a step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariableSpec {
    /// Template referencing earlier data, or a literal
    pub value: String,

    #[serde(rename = "type")]
    pub var_type: VariableType,

    /// Fall back to `default` when the resolved value is empty
    pub required: bool,

    /// Literal used as the value itself when the fallback applies
    pub default: String,
}

impl VariableSpec {
    pub fn new(value: impl Into<String>, var_type: VariableType) -> Self {
        Self {
            value: value.into(),
            var_type,
            ..Self::default()
        }
    }

    pub fn required(mut self, default: impl Into<String>) -> Self {
        self.required = true;
        self.default = default.into();
        self
    }

    /// Resolve this input for `step_id` against the shared context
    ///
    /// Unresolvable expressions give `Null`. A required input whose value is
    /// empty is replaced by `default`, coerced to the declared type without
    /// being evaluated as an expression.
    pub fn resolve(&self, step_id: &str, ctx: &ExecutionContext) -> Result<Value, CoercionError> {
        let raw = ctx
            .with_view(step_id, |view| expression::evaluate(&self.value, view))
            .unwrap_or_else(|| {
                debug!("Expression {:?} is undefined for step {}", self.value, step_id);
                Value::Null
            });

        let value = coerce(raw, self.var_type)?;
        if self.required && is_empty(&value, self.var_type) {
            debug!(
                "Required value {:?} is empty for step {}, using default {:?}",
                self.value, step_id, self.default
            );
            return coerce(Value::String(self.default.clone()), self.var_type);
        }

        Ok(value)
    }

    /// Resolve, then render the result as text for URLs, headers and queries
    ///
    /// A `Null` result renders as the empty string.
    pub fn resolve_string(&self, step_id: &str, ctx: &ExecutionContext) -> Result<String, CoercionError> {
        self.resolve(step_id, ctx).map(|value| value.render())
    }
}

/// Resolve every declared input of a step, in name order
///
/// Stops at the first input that fails to coerce.
pub fn resolve_inputs(
    step_id: &str,
    inputs: &BTreeMap<String, VariableSpec>,
    ctx: &ExecutionContext,
) -> Result<ValueMap, ResolveError> {
    let mut resolved = ValueMap::new();
    for (name, spec) in inputs {
        let value = spec.resolve(step_id, ctx).map_err(|source| {
            warn!("Step {} input '{}' failed to resolve: {}", step_id, name, source);
            ResolveError::TypeCoercion {
                variable: name.clone(),
                var_type: spec.var_type,
                source,
            }
        })?;
        resolved.insert(name.clone(), value);
    }
    Ok(resolved)
}
