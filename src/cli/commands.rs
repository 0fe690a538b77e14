//! CLI command definitions

use crate::core::{config::PipelineDefinition, ContextSnapshot, ExecutionContext, VariableType};
use crate::expression::{self, ExpressionError};
use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};

/// Resolve one variable
#[derive(Debug, Args, Clone)]
pub struct ResolveCommand {
    /// Path to a JSON context file ({"Req": ..., "Step": ...})
    #[arg(long)]
    pub context: PathBuf,

    /// Step the variable belongs to
    #[arg(long)]
    pub step: String,

    /// Expression to resolve, e.g. "{{.Req.Header.token}}"
    #[arg(long)]
    pub value: String,

    /// Declared type
    #[arg(long = "type", value_enum, default_value_t = VariableTypeArg::String)]
    pub var_type: VariableTypeArg,

    /// Fall back to the default when the value is empty
    #[arg(long)]
    pub required: bool,

    /// Default literal
    #[arg(long, default_value = "")]
    pub default: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Validate a pipeline definition
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Inspect a step in a context file
#[derive(Debug, Args, Clone)]
pub struct InspectCommand {
    /// Path to a JSON context file
    #[arg(long)]
    pub context: PathBuf,

    /// Step to show
    #[arg(long)]
    pub step: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Variable type argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum VariableTypeArg {
    String,
    Int,
    Float,
    Bool,
    Object,
}

impl From<VariableTypeArg> for VariableType {
    fn from(arg: VariableTypeArg) -> Self {
        match arg {
            VariableTypeArg::String => VariableType::String,
            VariableTypeArg::Int => VariableType::Int,
            VariableTypeArg::Float => VariableType::Float,
            VariableTypeArg::Bool => VariableType::Bool,
            VariableTypeArg::Object => VariableType::Object,
        }
    }
}

/// Load an execution context from a JSON snapshot file
pub fn load_context(path: &Path) -> Result<ExecutionContext> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read context file {}", path.display()))?;
    let snapshot: ContextSnapshot = serde_json::from_str(&content)
        .with_context(|| format!("Invalid context file {}", path.display()))?;
    Ok(ExecutionContext::from_snapshot(snapshot))
}

/// An input whose expression does not parse
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct InvalidInput {
    pub step_id: String,
    pub input: String,
    pub expression: String,
    pub error: String,
}

/// Find every input of `definition` whose expression does not parse
pub fn invalid_inputs(definition: &PipelineDefinition) -> Vec<InvalidInput> {
    let mut invalid = Vec::new();
    for step in &definition.steps {
        for (name, spec) in &step.inputs {
            if let Err(e) = expression::validate(&spec.value) {
                invalid.push(invalid_input(&step.id, name, &spec.value, e));
            }
        }
    }
    invalid
}

fn invalid_input(step_id: &str, input: &str, expression: &str, error: ExpressionError) -> InvalidInput {
    InvalidInput {
        step_id: step_id.to_string(),
        input: input.to_string(),
        expression: expression.to_string(),
        error: error.to_string(),
    }
}
