//! pipeline-engine - variable resolution and execution context for workflow pipelines

pub mod broker;
pub mod cli;
pub mod coordination;
pub mod core;
pub mod execution;
pub mod expression;

// Re-export commonly used types
pub use broker::{EventBroker, SubscribeSettings, Subscription};
pub use coordination::{AdapterSubscription, Cache, CoordinationError, DistributedLock, InMemoryCoordinator, PubSubAdapter};
pub use core::{ExecutionContext, ResolveError, StepData, Value, ValueMap, VariableSpec, VariableType};
pub use execution::{ExecutionEvent, LifecycleEvent, StepPreparer};
