//! Narrow expression language used by `uses` and `token_position`.
//!
//! An expression is either a literal or a path rooted at a named binding
//! (`values`, `env`, `res`) followed by attribute, call and subscript
//! accessors. Nothing is executed; evaluation only reads from the bindings.

pub mod eval;
pub mod lexer;
pub mod parse;

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

pub use parse::{Node, Segment, parse_literal};

/// Errors from lexing, parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("syntax error at offset {pos}: {message}")]
    Syntax { pos: usize, message: String },

    #[error("unknown name '{name}' (available: {available})")]
    UnknownRoot { name: String, available: String },

    #[error("key {key} not found in {target}")]
    KeyNotFound { key: String, target: String },

    #[error("'{method}' expects {expected} argument(s), got {got}")]
    Arity {
        method: String,
        expected: &'static str,
        got: usize,
    },

    #[error("cannot {op} on {found}")]
    Type { op: String, found: &'static str },
}

/// A parsed expression together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    source: String,
    node: Node,
}

impl Expr {
    /// Parse an expression.
    ///
    /// # Errors
    ///
    /// Returns [`ExprError::Syntax`] if `source` is not a valid expression.
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        let node = parse::parse_node(source)?;
        Ok(Self {
            source: source.to_owned(),
            node,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Evaluate against the given bindings.
    ///
    /// # Errors
    ///
    /// Returns an [`ExprError`] if the root is unbound, a subscripted key is
    /// missing, or an accessor is applied to a value of the wrong type.
    pub fn evaluate(&self, bindings: &Bindings<'_>) -> Result<Value, ExprError> {
        eval::evaluate(&self.node, bindings)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Named root values an expression may start from.
#[derive(Debug, Clone, Default)]
pub struct Bindings<'a> {
    roots: Vec<(&'a str, &'a Value)>,
}

impl<'a> Bindings<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root binding. A later binding with the same name shadows an
    /// earlier one.
    pub fn bind(mut self, name: &'a str, value: &'a Value) -> Self {
        self.roots.push((name, value));
        self
    }

    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.roots
            .iter()
            .rev()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }

    fn names(&self) -> String {
        let names: Vec<&str> = self.roots.iter().map(|(n, _)| *n).collect();
        if names.is_empty() {
            "none".to_owned()
        } else {
            names.join(", ")
        }
    }
}

/// Render a value for insertion into a `{placeholder}`.
///
/// Strings are inserted verbatim; every other value as compact JSON.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Replace `{name}` placeholders in `template` with values from `vars`.
///
/// Placeholders whose name is not in `vars` are left intact, as are
/// unbalanced braces. Substituted text is not scanned again.
pub fn substitute(template: &str, vars: &BTreeMap<String, String>) -> String {
    if vars.is_empty() {
        return template.to_owned();
    }
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find(['{', '}']) {
            Some(close) if after.as_bytes()[close] == b'}' => {
                let name = &after[..close];
                match vars.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Apply [`substitute`] to every string and object key inside `value`.
pub fn substitute_value(value: &Value, vars: &BTreeMap<String, String>) -> Value {
    match value {
        Value::String(s) => Value::String(substitute(s, vars)),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute_value(v, vars)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (substitute(k, vars), substitute_value(v, vars)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Interpret a textual payload.
///
/// JSON is tried first, then the literal grammar (which accepts
/// `{'foo': 'bar'}`, `True`, `None`). Anything else stays a plain string.
pub fn parse_payload(text: &str) -> Value {
    if let Ok(value) = serde_json::from_str(text) {
        return value;
    }
    parse_literal(text).unwrap_or_else(|_| Value::String(text.to_owned()))
}

/// Short name of a JSON value's type, for diagnostics.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}
