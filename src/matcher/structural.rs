use serde_json::Value;

use crate::expr::{render, type_name};

/// Deep equality with numeric comparison across integer/float spellings.
///
/// Types are otherwise strict: `1` never equals `"1"`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => match (x.as_u64(), y.as_u64()) {
                (Some(x), Some(y)) => x == y,
                _ => x.as_f64() == y.as_f64(),
            },
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xm), Value::Object(ym)) => {
            xm.len() == ym.len()
                && xm
                    .iter()
                    .all(|(k, x)| ym.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Polarity of a containment check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Expected must be present.
    Present,
    /// Expected must be absent.
    Absent,
}

/// Structural containment of `expected` within `received`.
///
/// Returns one diagnostic per violated leaf; an empty list means the check
/// holds. Rules, applied recursively:
///
/// - scalar expected: member of `received` (substring, list element, or
///   mapping key);
/// - mapping expected: each key is looked up in `received`; a nested mapping
///   or list at that key recurses, a scalar must be equal. A missing key
///   fails only when looking for presence;
/// - list expected: every item is checked on its own;
/// - mapping expected against a list of received items: present in at least
///   one item, or absent from every item.
pub fn containment(expected: &Value, received: &Value, polarity: Polarity) -> Vec<String> {
    let mut failures = Vec::new();
    check(expected, received, polarity, &mut failures);
    failures
}

fn check(expected: &Value, received: &Value, polarity: Polarity, failures: &mut Vec<String>) {
    match expected {
        Value::Array(items) => {
            for item in items {
                check(item, received, polarity, failures);
            }
        }
        Value::Object(_) => check_mapping(expected, received, polarity, failures),
        scalar => {
            let member = is_member(scalar, received);
            match (polarity, member) {
                (Polarity::Present, false) => {
                    failures.push(format!("{} not found in:\n{}", render(scalar), render(received)));
                }
                (Polarity::Absent, true) => {
                    failures.push(format!("{} in:\n{}", render(scalar), render(received)));
                }
                _ => {}
            }
        }
    }
}

fn check_mapping(expected: &Value, received: &Value, polarity: Polarity, failures: &mut Vec<String>) {
    let Value::Object(pairs) = expected else {
        return;
    };
    match received {
        Value::Object(fields) => {
            for (key, want) in pairs {
                let Some(got) = fields.get(key) else {
                    if polarity == Polarity::Present {
                        failures.push(format!("{key} not found in:\n{received}"));
                    }
                    continue;
                };
                match got {
                    Value::Object(_) | Value::Array(_) => check(want, got, polarity, failures),
                    scalar => {
                        let equal = values_equal(scalar, want);
                        match (polarity, equal) {
                            (Polarity::Present, false) => {
                                failures.push(format!("{scalar}!={want}"));
                            }
                            (Polarity::Absent, true) => {
                                failures.push(format!("{scalar}=={want}"));
                            }
                            _ => {}
                        }
                    }
                }
            }
        }
        Value::Array(elements) => match polarity {
            Polarity::Present => {
                let found = elements.iter().any(|element| {
                    let mut scratch = Vec::new();
                    check(expected, element, polarity, &mut scratch);
                    scratch.is_empty()
                });
                if !found {
                    failures.push(format!("{expected} not found in any of:\n{received}"));
                }
            }
            Polarity::Absent => {
                for element in elements {
                    check(expected, element, polarity, failures);
                }
            }
        },
        other => {
            if polarity == Polarity::Present {
                failures.push(format!(
                    "{expected} not found in {}:\n{}",
                    type_name(other),
                    render(other)
                ));
            }
        }
    }
}

fn is_member(needle: &Value, haystack: &Value) -> bool {
    match haystack {
        Value::String(text) => text.contains(&render(needle)),
        Value::Array(items) => items.iter().any(|item| values_equal(item, needle)),
        Value::Object(fields) => match needle {
            Value::String(key) => fields.contains_key(key),
            _ => false,
        },
        scalar => values_equal(scalar, needle),
    }
}
