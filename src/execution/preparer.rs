//! Step preparation - resolves a step's declared inputs before it runs

use crate::{
    broker::EventBroker,
    core::{resolve_inputs, ExecutionContext, ResolveError, ValueMap, VariableSpec},
    execution::events::{run_topic, ExecutionEvent, LifecycleEvent},
};
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

/// Prepares the steps of one run
///
/// Resolved inputs are written back as the step's `Var` so later steps can
/// reference them, and every outcome is announced on the run's topic.
#[derive(Clone)]
pub struct StepPreparer {
    project_id: String,
    run_id: Uuid,
    broker: EventBroker<LifecycleEvent>,
}

impl StepPreparer {
    pub fn new(project_id: impl Into<String>, run_id: Uuid, broker: EventBroker<LifecycleEvent>) -> Self {
        Self {
            project_id: project_id.into(),
            run_id,
            broker,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Topic the lifecycle events of this run are published on
    pub fn topic(&self) -> String {
        run_topic(self.run_id)
    }

    /// Resolve `inputs` for `step_id` and publish them as the step's variables
    ///
    /// On failure the step's variables are left untouched.
    pub fn prepare(
        &self,
        step_id: &str,
        inputs: &BTreeMap<String, VariableSpec>,
        ctx: &ExecutionContext,
    ) -> Result<ValueMap, ResolveError> {
        match resolve_inputs(step_id, inputs, ctx) {
            Ok(variables) => {
                ctx.set_step_variable(step_id, variables.clone());
                info!("Prepared step {} ({} input(s))", step_id, variables.len());
                self.emit(ExecutionEvent::StepPrepared {
                    step_id: step_id.to_string(),
                    variables: variables.clone(),
                });
                Ok(variables)
            }
            Err(e) => {
                let ResolveError::TypeCoercion { variable, .. } = &e;
                self.emit(ExecutionEvent::StepPreparationFailed {
                    step_id: step_id.to_string(),
                    variable: variable.clone(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn emit(&self, event: ExecutionEvent) {
        let topic = self.topic();
        self.broker
            .publish(&topic, LifecycleEvent::new(&self.project_id, self.run_id, event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::SubscribeSettings;
    use crate::core::{value::value_map, Value, VariableType};
    use serde_json::json;

    fn inputs(entries: &[(&str, VariableSpec)]) -> BTreeMap<String, VariableSpec> {
        entries
            .iter()
            .map(|(name, spec)| (name.to_string(), spec.clone()))
            .collect()
    }

    #[test]
    fn test_prepare_writes_variables_and_emits() {
        let broker = EventBroker::new();
        let preparer = StepPreparer::new("project", Uuid::new_v4(), broker.clone());
        let mut sub = broker
            .subscribe(&preparer.topic(), "observer", SubscribeSettings::default())
            .unwrap();

        let ctx = ExecutionContext::new();
        ctx.set_request_query(value_map(json!({"limit": "25"})));

        let declared = inputs(&[(
            "limit",
            VariableSpec::new("{{.Req.Query.limit}}", VariableType::Int),
        )]);
        let vars = preparer.prepare("fetch", &declared, &ctx).unwrap();

        assert_eq!(vars.get("limit"), Some(&Value::Int(25)));
        assert_eq!(ctx.get_step("fetch").var.get("limit"), Some(&Value::Int(25)));

        let event = sub.try_recv().unwrap();
        assert_eq!(event.run_id, preparer.run_id());
        assert!(matches!(event.event, ExecutionEvent::StepPrepared { .. }));
    }

    #[test]
    fn test_failed_preparation_leaves_variables_untouched() {
        let broker = EventBroker::new();
        let preparer = StepPreparer::new("project", Uuid::new_v4(), broker.clone());
        let mut sub = broker
            .subscribe(&preparer.topic(), "observer", SubscribeSettings::default())
            .unwrap();

        let ctx = ExecutionContext::new();
        ctx.set_step_variable("fetch", value_map(json!({"old": true})));
        ctx.set_request_query(value_map(json!({"flag": "maybe"})));

        let declared = inputs(&[(
            "flag",
            VariableSpec::new("{{.Req.Query.flag}}", VariableType::Bool),
        )]);
        let err = preparer.prepare("fetch", &declared, &ctx).unwrap_err();
        assert!(err.to_string().contains("'flag'"));
        assert_eq!(ctx.get_step("fetch").var.get("old"), Some(&Value::Bool(true)));

        match sub.try_recv().unwrap().event {
            ExecutionEvent::StepPreparationFailed { step_id, variable, .. } => {
                assert_eq!(step_id, "fetch");
                assert_eq!(variable, "flag");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
