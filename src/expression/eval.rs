//! Template evaluation against a context view
//!
//! Evaluation is total: any missing key, out-of-range index or non-container
//! value met mid-path makes the whole action undefined (`None`).

use crate::core::context::{ContextView, RequestData, StepData, StepDataBody};
use crate::core::value::{Value, ValueMap};
use crate::expression::parser::{Arg, Expr, Segment, Template};
use std::collections::HashMap;

/// A position inside the view, borrowed where possible
#[derive(Debug, Clone)]
enum Node<'a> {
    Root,
    Request(&'a RequestData),
    Steps(&'a HashMap<String, StepData>),
    Step(&'a StepData),
    StepBody(&'a StepDataBody),
    Map(&'a ValueMap),
    Value(&'a Value),
    Owned(Value),
}

impl<'a> Node<'a> {
    fn from_value(value: &'a Value) -> Self {
        match value {
            Value::Map(map) => Node::Map(map),
            other => Node::Value(other),
        }
    }

    fn field(self, name: &str, view: &ContextView<'a>) -> Option<Node<'a>> {
        match self {
            Node::Root => match name {
                "Req" => Some(Node::Request(view.request)),
                "Step" => Some(Node::Steps(view.steps)),
                "Var" => Some(Node::Map(&view.current.var)),
                "Data" => Some(Node::StepBody(&view.current.data)),
                "Out" => Some(Node::Map(&view.current.out)),
                _ => None,
            },
            Node::Request(request) => match name {
                "Header" => Some(Node::Map(&request.header)),
                "Query" => Some(Node::Map(&request.query)),
                "Json" => Some(Node::Map(&request.json)),
                _ => None,
            },
            Node::Steps(steps) => steps.get(name).map(Node::Step),
            Node::Step(step) => match name {
                "Var" => Some(Node::Map(&step.var)),
                "Data" => Some(Node::StepBody(&step.data)),
                "Out" => Some(Node::Map(&step.out)),
                _ => None,
            },
            Node::StepBody(data) => match name {
                "Body" => Some(Node::from_value(&data.body)),
                "Query" => Some(Node::Map(&data.query)),
                "StatusCode" => Some(Node::Owned(Value::Int(data.status_code))),
                _ => None,
            },
            Node::Map(map) => map.get(name).map(Node::from_value),
            Node::Value(_) => None,
            Node::Owned(value) => value.get(name).cloned().map(Node::Owned),
        }
    }

    fn index(self, key: &Value) -> Option<Node<'a>> {
        match (self, key) {
            (Node::Value(value), Value::Int(i)) => value.at(*i).map(Node::from_value),
            (Node::Owned(value), Value::Int(i)) => value.at(*i).cloned().map(Node::Owned),
            (Node::Map(map), Value::String(k)) => map.get(k).map(Node::from_value),
            (Node::Owned(value), Value::String(k)) => value.get(k).cloned().map(Node::Owned),
            (Node::Steps(steps), Value::String(k)) => steps.get(k).map(Node::Step),
            _ => None,
        }
    }

    fn into_value(self, view: &ContextView<'a>) -> Value {
        match self {
            Node::Root => {
                let mut map = ValueMap::new();
                map.insert("Req".to_string(), Value::from(view.request));
                map.insert("Step".to_string(), steps_value(view.steps));
                map.insert("Var".to_string(), Value::Map(view.current.var.clone()));
                map.insert("Data".to_string(), Value::from(&view.current.data));
                map.insert("Out".to_string(), Value::Map(view.current.out.clone()));
                Value::Map(map)
            }
            Node::Request(request) => Value::from(request),
            Node::Steps(steps) => steps_value(steps),
            Node::Step(step) => Value::from(step),
            Node::StepBody(data) => Value::from(data),
            Node::Map(map) => Value::Map(map.clone()),
            Node::Value(value) => value.clone(),
            Node::Owned(value) => value,
        }
    }
}

fn steps_value(steps: &HashMap<String, StepData>) -> Value {
    Value::Map(
        steps
            .iter()
            .map(|(id, step)| (id.clone(), Value::from(step)))
            .collect(),
    )
}

fn eval_node<'a>(expr: &Expr, view: &ContextView<'a>) -> Option<Node<'a>> {
    match expr {
        Expr::Path(fields) => walk(Node::Root, fields, view),
        Expr::Chain { target, fields } => walk(eval_node(target, view)?, fields, view),
        Expr::Index { target, keys } => {
            let mut node = eval_node(target, view)?;
            for key in keys {
                let key = match key {
                    Arg::Int(i) => Value::Int(*i),
                    Arg::Str(s) => Value::String(s.clone()),
                    Arg::Expr(expr) => eval_node(expr, view)?.into_value(view),
                };
                node = node.index(&key)?;
            }
            Some(node)
        }
    }
}

fn walk<'a>(start: Node<'a>, fields: &[String], view: &ContextView<'a>) -> Option<Node<'a>> {
    fields
        .iter()
        .try_fold(start, |node, field| node.field(field, view))
}

/// Evaluate one action expression
pub fn eval_expr(expr: &Expr, view: &ContextView<'_>) -> Option<Value> {
    eval_node(expr, view).map(|node| node.into_value(view))
}

impl Template {
    /// Evaluate the template; `None` means undefined
    ///
    /// A template made of one action and nothing else yields the action's raw
    /// value. Anything else is rendered to a string, with undefined actions
    /// rendering as empty text; an empty rendering is undefined.
    pub fn evaluate(&self, view: &ContextView<'_>) -> Option<Value> {
        if let Some(expr) = self.sole_action() {
            return eval_expr(expr, view);
        }

        let mut rendered = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => rendered.push_str(text),
                Segment::Action(expr) => {
                    if let Some(value) = eval_expr(expr, view) {
                        rendered.push_str(&value.render());
                    }
                }
            }
        }

        if rendered.is_empty() {
            None
        } else {
            Some(Value::String(rendered))
        }
    }
}
