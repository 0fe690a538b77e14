//! Step preparation and event plumbing around a run

pub mod events;
pub mod preparer;
pub mod relay;

pub use events::{run_topic, ExecutionEvent, LifecycleEvent};
pub use preparer::StepPreparer;
pub use relay::relay_events;
