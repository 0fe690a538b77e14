//! Shared fixtures for the integration tests

#![allow(dead_code)]

use pipeline_engine::core::value::value_map;
use pipeline_engine::core::{ExecutionContext, Value, VariableSpec, VariableType};
use serde_json::json;

pub const CURRENT_STEP: &str = "current";
pub const ANOTHER_STEP: &str = "another";
pub const EMPTY_STEP: &str = "another_empty";

/// A run where a request arrived, `current` is being prepared and two
/// earlier steps have published data (one of them nothing at all)
pub fn fixture_context() -> ExecutionContext {
    let ctx = ExecutionContext::new();

    ctx.set_request_header(value_map(json!({
        "header_1": "value_header_1",
        "header_2": "value_header_2",
    })));
    ctx.set_request_query(value_map(json!({
        "query_1": "value_query_1",
        "query_2": 12345,
    })));
    ctx.set_request_json(value_map(json!({
        "json_1": "value_json_1",
        "json_2": {"json_2_a": 123},
    })));

    ctx.set_step_variable(
        CURRENT_STEP,
        value_map(json!({"var_1": "value_var_1", "var_2": "value_var_2"})),
    );
    ctx.set_step_data_body(
        CURRENT_STEP,
        Value::from(json!({"current_body_1": "value_body_1", "current_body_2": true})),
    );
    ctx.set_step_data_query(
        CURRENT_STEP,
        value_map(json!({"current_query_1": {"col_a": "val_a_1", "col_b": "val_b_1"}})),
    );
    ctx.set_step_status_code(CURRENT_STEP, 200);

    ctx.set_step_variable(
        ANOTHER_STEP,
        value_map(json!({"var_3": "value_var_3", "var_4": 123.45})),
    );
    ctx.set_step_data_body(
        ANOTHER_STEP,
        Value::from(json!({"body_1": "value_body_1", "body_2": true})),
    );
    ctx.set_step_data_query(
        ANOTHER_STEP,
        value_map(json!({
            "query_1": [
                {"col_a": "val_a_1", "col_b": "val_b_1"},
                {"col_a": "val_a_2", "col_b": "val_b_2"},
            ]
        })),
    );
    ctx.set_step_status_code(ANOTHER_STEP, 204);
    ctx.set_step_output(ANOTHER_STEP, value_map(json!({"out_1": "value_out_1"})));

    // Present but never written to
    ctx.set_step_output(EMPTY_STEP, Default::default());

    ctx
}

pub fn spec(value: &str, var_type: VariableType) -> VariableSpec {
    VariableSpec::new(value, var_type)
}

/// Resolve `spec` for the fixture's current step
pub fn resolve(ctx: &ExecutionContext, spec: &VariableSpec) -> Value {
    spec.resolve(CURRENT_STEP, ctx)
        .unwrap_or_else(|e| panic!("{:?} failed to resolve: {}", spec.value, e))
}
