//! Core data model
//!
//! Values, the shared execution context, declared step inputs and the
//! coercion rules that turn resolved data into typed variables.

pub mod coerce;
pub mod config;
pub mod context;
pub mod value;
pub mod variable;

pub use coerce::{coerce, is_empty, CoercionError};
pub use context::*;
pub use value::{Value, ValueMap};
pub use variable::*;
