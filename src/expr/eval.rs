use serde_json::Value;

use crate::expr::{Bindings, ExprError, Node, Segment, type_name};

/// Evaluate a parsed expression against `bindings`.
///
/// # Errors
///
/// See [`crate::expr::Expr::evaluate`].
pub fn evaluate(node: &Node, bindings: &Bindings<'_>) -> Result<Value, ExprError> {
    match node {
        Node::Literal(value) => Ok(value.clone()),
        Node::Path { root, segments } => {
            let root_value = bindings.get(root).ok_or_else(|| ExprError::UnknownRoot {
                name: root.clone(),
                available: bindings.names(),
            })?;
            let mut trail = root.clone();
            // Accessors borrow from the bindings until a `.get` default forces
            // an owned value.
            let mut current = Step::Borrowed(root_value);
            for segment in segments {
                current = match current {
                    Step::Borrowed(base) => apply(base, segment, &trail)?,
                    Step::Owned(base) => Step::Owned(apply(&base, segment, &trail)?.into_owned()),
                };
                trail.push_str(&describe(segment));
            }
            Ok(current.into_owned())
        }
    }
}

enum Step<'v> {
    Borrowed(&'v Value),
    Owned(Value),
}

impl Step<'_> {
    fn into_owned(self) -> Value {
        match self {
            Self::Borrowed(v) => v.clone(),
            Self::Owned(v) => v,
        }
    }
}

fn apply<'v>(base: &'v Value, segment: &Segment, trail: &str) -> Result<Step<'v>, ExprError> {
    match segment {
        Segment::Attr(name) => attribute(base, name, trail).map(Step::Borrowed),
        Segment::Call { name, args } if name == "get" => {
            let (key, default) = match args.as_slice() {
                [key] => (key, None),
                [key, default] => (key, Some(default)),
                _ => {
                    return Err(ExprError::Arity {
                        method: "get".to_owned(),
                        expected: "1 or 2",
                        got: args.len(),
                    });
                }
            };
            let Value::Object(_) = base else {
                return Err(ExprError::Type {
                    op: format!("call get() on {trail}"),
                    found: type_name(base),
                });
            };
            match lookup(base, key)? {
                Some(v) => Ok(Step::Borrowed(v)),
                None => Ok(Step::Owned(default.cloned().unwrap_or(Value::Null))),
            }
        }
        Segment::Call { name, args } => {
            if !args.is_empty() {
                return Err(ExprError::Arity {
                    method: name.clone(),
                    expected: "0",
                    got: args.len(),
                });
            }
            attribute(base, name, trail).map(Step::Borrowed)
        }
        Segment::Index(key) => match lookup(base, key)? {
            Some(v) => Ok(Step::Borrowed(v)),
            None => Err(ExprError::KeyNotFound {
                key: key.to_string(),
                target: trail.to_owned(),
            }),
        },
    }
}

fn attribute<'v>(base: &'v Value, name: &str, trail: &str) -> Result<&'v Value, ExprError> {
    match base {
        Value::Object(map) => map.get(name).ok_or_else(|| ExprError::KeyNotFound {
            key: format!("'{name}'"),
            target: trail.to_owned(),
        }),
        other => Err(ExprError::Type {
            op: format!("read attribute '{name}' of {trail}"),
            found: type_name(other),
        }),
    }
}

/// Key lookup on mappings, index lookup on lists. `Ok(None)` means absent.
fn lookup<'v>(base: &'v Value, key: &Value) -> Result<Option<&'v Value>, ExprError> {
    match (base, key) {
        (Value::Object(map), Value::String(k)) => Ok(map.get(k)),
        // Non-string keys never match a JSON object key.
        (Value::Object(_), _) => Ok(None),
        (Value::Array(items), Value::Number(n)) => {
            let Some(idx) = n.as_i64() else {
                return Ok(None);
            };
            let len = items.len() as i64;
            let idx = if idx < 0 { len + idx } else { idx };
            if (0..len).contains(&idx) {
                Ok(items.get(idx as usize))
            } else {
                Ok(None)
            }
        }
        (Value::Array(_), other) => Err(ExprError::Type {
            op: format!("index a list with {}", type_name(other)),
            found: "list",
        }),
        (other, _) => Err(ExprError::Type {
            op: format!("look up {key}"),
            found: type_name(other),
        }),
    }
}

fn describe(segment: &Segment) -> String {
    match segment {
        Segment::Attr(name) => format!(".{name}"),
        Segment::Call { name, args } => {
            let args: Vec<String> = args.iter().map(Value::to_string).collect();
            format!(".{name}({})", args.join(", "))
        }
        Segment::Index(key) => format!("[{key}]"),
    }
}

#[cfg(test)]
mod tests {
    use crate::expr::{Bindings, Expr, ExprError};
    use serde_json::{Value, json};

    fn eval(src: &str, values: &Value, env: &Value) -> Result<Value, ExprError> {
        let bindings = Bindings::new().bind("values", values).bind("env", env);
        Expr::parse(src).unwrap().evaluate(&bindings)
    }

    #[test]
    fn chained_get_reads_prior_step_result() {
        let values = json!({"A": {"token": "XYZ"}});
        let out = eval("values.get('A').get('token')", &values, &json!({})).unwrap();
        assert_eq!(out, json!("XYZ"));
    }

    #[test]
    fn get_on_missing_key_yields_null_or_default() {
        let values = json!({"A": {}});
        assert_eq!(eval("values.get('B')", &values, &json!({})).unwrap(), Value::Null);
        assert_eq!(
            eval("values.get('A').get('id', 7)", &values, &json!({})).unwrap(),
            json!(7)
        );
    }

    #[test]
    fn get_after_default_keeps_walking_owned_value() {
        let values = json!({});
        let out = eval("values.get('A', {'id': 3})['id']", &values, &json!({})).unwrap();
        assert_eq!(out, json!(3));
    }

    #[test]
    fn env_double_quoted_key() {
        let env = json!({"foo": "bar"});
        assert_eq!(eval(r#"env.get("foo")"#, &json!({}), &env).unwrap(), json!("bar"));
        assert_eq!(eval("env.foo", &json!({}), &env).unwrap(), json!("bar"));
    }

    #[test]
    fn subscript_missing_key_is_error() {
        let values = json!({"A": {"id": 1}});
        let err = eval("values['A']['missing']", &values, &json!({})).unwrap_err();
        assert_eq!(
            err,
            ExprError::KeyNotFound {
                key: "\"missing\"".into(),
                target: "values[\"A\"]".into(),
            }
        );
    }

    #[test]
    fn list_indexing_supports_negative_offsets() {
        let values = json!({"A": [10, 20, 30]});
        assert_eq!(eval("values['A'][0]", &values, &json!({})).unwrap(), json!(10));
        assert_eq!(eval("values['A'][-1]", &values, &json!({})).unwrap(), json!(30));
        assert!(eval("values['A'][3]", &values, &json!({})).is_err());
    }

    #[test]
    fn zero_arg_call_is_attribute_access() {
        let res = json!({"json": {"token": "T"}, "status_code": 200});
        let bindings = Bindings::new().bind("res", &res);
        let token = Expr::parse("res.json().get('token')").unwrap().evaluate(&bindings).unwrap();
        assert_eq!(token, json!("T"));
        let status = Expr::parse("res.status_code").unwrap().evaluate(&bindings).unwrap();
        assert_eq!(status, json!(200));
    }

    #[test]
    fn unknown_root_lists_available_names() {
        let err = eval("other.get('x')", &json!({}), &json!({})).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown name 'other' (available: values, env)"
        );
    }

    #[test]
    fn get_on_non_mapping_is_type_error() {
        let values = json!({"A": null});
        let err = eval("values.get('A').get('token')", &values, &json!({})).unwrap_err();
        assert!(matches!(err, ExprError::Type { found: "null", .. }));
    }

    #[test]
    fn get_arity_is_checked() {
        let err = eval("values.get()", &json!({}), &json!({})).unwrap_err();
        assert!(matches!(err, ExprError::Arity { got: 0, .. }));
        let err = eval("values.keys('x')", &json!({}), &json!({})).unwrap_err();
        assert!(matches!(err, ExprError::Arity { got: 1, .. }));
    }

    #[test]
    fn literal_expression_ignores_bindings() {
        assert_eq!(eval("'static'", &json!({}), &json!({})).unwrap(), json!("static"));
    }
}
