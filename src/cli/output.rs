//! CLI output formatting

use crate::{
    cli::commands::InvalidInput,
    core::{StepData, Value, VariableType},
};
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");

/// Format a resolved value for display
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => style("null").dim().to_string(),
        Value::String(s) => style(format!("{:?}", s)).green().to_string(),
        Value::Int(_) | Value::Float(_) => style(value.render()).cyan().to_string(),
        Value::Bool(_) => style(value.render()).yellow().to_string(),
        Value::List(_) | Value::Map(_) => {
            let json = serde_json::Value::from(value.clone());
            serde_json::to_string_pretty(&json).unwrap_or_else(|_| value.render())
        }
    }
}

/// Format a resolution result line
pub fn format_resolution(step_id: &str, expression: &str, var_type: VariableType, value: &Value) -> String {
    format!(
        "{}{} {} {} = {}",
        CHECK,
        style(step_id).bold(),
        style(expression).dim(),
        style(format!("({})", var_type)).dim(),
        format_value(value)
    )
}

/// Format what a step has published
pub fn format_step(step_id: &str, step: &StepData) -> String {
    let mut lines = vec![format!("{}Step {}", INFO, style(step_id).bold())];

    lines.push(format!(
        "  Status code: {}",
        style(step.data.status_code).cyan()
    ));
    lines.push(format!("  Body: {}", format_value(&step.data.body)));

    for (label, map) in [("Var", &step.var), ("Out", &step.out), ("Query", &step.data.query)] {
        if map.is_empty() {
            lines.push(format!("  {}: {}", label, style("(none)").dim()));
            continue;
        }
        lines.push(format!("  {}:", label));
        for (key, value) in map {
            lines.push(format!("    {} = {}", style(key).cyan(), format_value(value)));
        }
    }

    lines.join("\n")
}

/// Format an invalid input for display
pub fn format_invalid_input(invalid: &InvalidInput) -> String {
    format!(
        "{}{}.{}: {} {}",
        CROSS,
        style(&invalid.step_id).bold(),
        style(&invalid.input).cyan(),
        style(&invalid.expression).dim(),
        style(&invalid.error).red()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{value::value_map, ValueMap};
    use serde_json::json;

    #[test]
    fn test_format_value_plain_text() {
        console::set_colors_enabled(false);
        assert_eq!(format_value(&Value::Null), "null");
        assert_eq!(format_value(&Value::from("x")), "\"x\"");
        assert_eq!(format_value(&Value::Int(3)), "3");
        assert!(format_value(&Value::from(json!({"a": 1}))).contains("\"a\": 1"));
    }

    #[test]
    fn test_format_step_lists_sections() {
        console::set_colors_enabled(false);
        let step = StepData {
            var: value_map(json!({"limit": 10})),
            out: ValueMap::new(),
            ..StepData::default()
        };

        let text = format_step("fetch", &step);
        assert!(text.contains("Status code: 0"));
        assert!(text.contains("limit = 10"));
        assert!(text.contains("Out: (none)"));
    }
}
