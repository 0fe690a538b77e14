//! Path expressions over the execution context
//!
//! Step inputs reference earlier data with templates such as
//! `{{.Req.Header.token}}` or `{{(index .Step.db.Data.Query.rows 0).id}}`.

pub mod eval;
pub mod parser;

pub use eval::eval_expr;
pub use parser::{Arg, Expr, ExpressionError, Segment, Template};

use crate::core::context::ContextView;
use crate::core::value::Value;
use tracing::debug;

/// Parse and evaluate `source`; malformed templates are undefined
pub fn evaluate(source: &str, view: &ContextView<'_>) -> Option<Value> {
    match Template::parse(source) {
        Ok(template) => template.evaluate(view),
        Err(e) => {
            debug!("Expression {:?} did not parse: {}", source, e);
            None
        }
    }
}

/// Check that `source` parses, without evaluating it
pub fn validate(source: &str) -> Result<(), ExpressionError> {
    Template::parse(source).map(|_| ())
}
