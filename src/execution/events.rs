//! Lifecycle events published while a run progresses

use crate::core::ValueMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events that can occur while preparing steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ExecutionEvent {
    StepPrepared {
        step_id: String,
        variables: ValueMap,
    },
    StepPreparationFailed {
        step_id: String,
        variable: String,
        error: String,
    },
}

impl ExecutionEvent {
    pub fn step_id(&self) -> &str {
        match self {
            ExecutionEvent::StepPrepared { step_id, .. }
            | ExecutionEvent::StepPreparationFailed { step_id, .. } => step_id,
        }
    }
}

/// Envelope delivered to observers of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub id: Uuid,
    pub project_id: String,
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: ExecutionEvent,
}

impl LifecycleEvent {
    pub fn new(project_id: &str, run_id: Uuid, event: ExecutionEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id: project_id.to_string(),
            run_id,
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Broker topic carrying the events of one run
pub fn run_topic(run_id: Uuid) -> String {
    format!("run:{}", run_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;

    #[test]
    fn test_event_wire_shape() {
        let mut variables = ValueMap::new();
        variables.insert("x".to_string(), Value::Int(1));
        let event = LifecycleEvent::new(
            "project-1",
            Uuid::nil(),
            ExecutionEvent::StepPrepared {
                step_id: "fetch".to_string(),
                variables,
            },
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "step_prepared");
        assert_eq!(json["project_id"], "project-1");
        assert_eq!(json["data"]["step_id"], "fetch");
        assert_eq!(json["data"]["variables"]["x"], 1);

        let back: LifecycleEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_run_topic() {
        assert_eq!(
            run_topic(Uuid::nil()),
            "run:00000000-0000-0000-0000-000000000000"
        );
    }
}
