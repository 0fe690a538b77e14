//! Execution context - the shared per-run data store
//!
//! Every step of a run reads and writes the same [`ExecutionContext`]. All
//! access goes through a single lock covering the whole structure, so a
//! reader never observes a partially applied update and writes are totally
//! ordered.

use crate::core::value::{Value, ValueMap};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Data from the inbound trigger of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RequestData {
    pub header: ValueMap,
    pub query: ValueMap,
    pub json: ValueMap,
}

/// Result payload produced by a step's side effect
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct StepDataBody {
    /// Response body, for database steps the rows in JSON form
    pub body: Value,

    /// Result sets by query id, usually a list of row maps
    pub query: ValueMap,

    #[serde(rename = "status_code")]
    pub status_code: i64,
}

/// Everything a step has published
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct StepData {
    /// Resolved input variables
    pub var: ValueMap,

    pub data: StepDataBody,

    /// Explicitly published outputs
    pub out: ValueMap,
}

/// Zero StepData, exposed for steps that have not published anything yet
pub(crate) static EMPTY_STEP: StepData = StepData {
    var: BTreeMap::new(),
    data: StepDataBody {
        body: Value::Null,
        query: BTreeMap::new(),
        status_code: 0,
    },
    out: BTreeMap::new(),
};

/// Plain, serializable copy of a whole context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSnapshot {
    #[serde(rename = "Req")]
    pub request: RequestData,

    #[serde(rename = "Step")]
    pub steps: HashMap<String, StepData>,
}

/// Read-only view handed to expression evaluation, scoped to one step
#[derive(Debug, Clone, Copy)]
pub struct ContextView<'a> {
    pub request: &'a RequestData,
    pub steps: &'a HashMap<String, StepData>,
    /// Data of the evaluating step, or the zero StepData when it is absent
    pub current: &'a StepData,
}

/// Concurrency-safe store for one pipeline run
///
/// Shared between step executors behind an `Arc`. Operations never fail:
/// absence is always represented by zero values.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    inner: Mutex<ContextSnapshot>,
}

impl ExecutionContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a context from a snapshot
    pub fn from_snapshot(snapshot: ContextSnapshot) -> Self {
        Self {
            inner: Mutex::new(snapshot),
        }
    }

    // Each write is a single assignment, so a panic elsewhere can't leave a torn value
    fn lock(&self) -> MutexGuard<'_, ContextSnapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update_step<F>(&self, step_id: &str, update: F)
    where
        F: FnOnce(&mut StepData),
    {
        let mut inner = self.lock();
        let step = inner.steps.entry(step_id.to_string()).or_default();
        update(step);
    }

    /// Copy of the whole context
    pub fn snapshot(&self) -> ContextSnapshot {
        self.lock().clone()
    }

    /// Copy of the request data
    pub fn request(&self) -> RequestData {
        self.lock().request.clone()
    }

    /// Replace the request headers
    pub fn set_request_header(&self, header: ValueMap) {
        self.lock().request.header = header;
    }

    /// Replace the request query parameters
    pub fn set_request_query(&self, query: ValueMap) {
        self.lock().request.query = query;
    }

    /// Replace the request JSON body
    pub fn set_request_json(&self, json: ValueMap) {
        self.lock().request.json = json;
    }

    /// Copy of a step's data; unknown ids yield the zero StepData
    pub fn get_step(&self, step_id: &str) -> StepData {
        self.lock().steps.get(step_id).cloned().unwrap_or_default()
    }

    /// Ids of every step that has published something, sorted
    pub fn step_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().steps.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn set_step_status_code(&self, step_id: &str, status_code: i64) {
        self.update_step(step_id, |step| step.data.status_code = status_code);
    }

    pub fn set_step_data_body(&self, step_id: &str, body: Value) {
        self.update_step(step_id, |step| step.data.body = body);
    }

    /// Replace a step's result sets
    pub fn set_step_data_query(&self, step_id: &str, query: ValueMap) {
        self.update_step(step_id, |step| step.data.query = query);
    }

    /// Replace a step's resolved input variables
    pub fn set_step_variable(&self, step_id: &str, vars: ValueMap) {
        self.update_step(step_id, |step| step.var = vars);
    }

    /// Replace a step's published outputs
    pub fn set_step_output(&self, step_id: &str, outputs: ValueMap) {
        self.update_step(step_id, |step| step.out = outputs);
    }

    /// Run `read` against a consistent view scoped to `step_id`
    ///
    /// The lock is held for the duration of `read`, which must stay a bounded
    /// in-memory computation.
    pub fn with_view<R, F>(&self, step_id: &str, read: F) -> R
    where
        F: FnOnce(&ContextView<'_>) -> R,
    {
        let inner = self.lock();
        let view = ContextView {
            request: &inner.request,
            steps: &inner.steps,
            current: inner.steps.get(step_id).unwrap_or(&EMPTY_STEP),
        };
        read(&view)
    }
}

impl From<&RequestData> for Value {
    fn from(request: &RequestData) -> Self {
        let mut map = ValueMap::new();
        map.insert("Header".to_string(), Value::Map(request.header.clone()));
        map.insert("Query".to_string(), Value::Map(request.query.clone()));
        map.insert("Json".to_string(), Value::Map(request.json.clone()));
        Value::Map(map)
    }
}

impl From<&StepDataBody> for Value {
    fn from(data: &StepDataBody) -> Self {
        let mut map = ValueMap::new();
        map.insert("Body".to_string(), data.body.clone());
        map.insert("Query".to_string(), Value::Map(data.query.clone()));
        map.insert("StatusCode".to_string(), Value::Int(data.status_code));
        Value::Map(map)
    }
}

impl From<&StepData> for Value {
    fn from(step: &StepData) -> Self {
        let mut map = ValueMap::new();
        map.insert("Var".to_string(), Value::Map(step.var.clone()));
        map.insert("Data".to_string(), Value::from(&step.data));
        map.insert("Out".to_string(), Value::Map(step.out.clone()));
        Value::Map(map)
    }
}
