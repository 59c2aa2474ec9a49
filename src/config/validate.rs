use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

use crate::config::{AuthHeaderDocument, AuthTemplate, CaseKind, ConfigError, TestBody, TestCase};
use crate::expr::Expr;

/// Validate a top-level test body and convert it into a [`TestCase`].
///
/// `key` is the name under `tests`; a `name` inside the body takes
/// precedence. `field` is the path used in error messages.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] naming the offending field:
/// - empty name, or missing endpoint on a non-chained case
/// - authentication step outside a chain, or missing payload / template
/// - `multi_step` with no steps, nested chains, `steps` without `multi_step`
/// - duplicate step names or more than one authentication step per chain
/// - unparsable `uses` or `token_position` expressions
pub fn test_case(body: TestBody, key: Option<&str>, field: &str) -> Result<TestCase, ConfigError> {
    convert(body, key, field, false)
}

fn convert(
    body: TestBody,
    key: Option<&str>,
    field: &str,
    in_chain: bool,
) -> Result<TestCase, ConfigError> {
    let name = body
        .name
        .clone()
        .or_else(|| key.map(str::to_owned))
        .unwrap_or_default();
    if name.trim().is_empty() {
        return Err(ConfigError::invalid(format!("{field}.name"), "must not be empty"));
    }

    if !body.multi_step && !body.steps.is_empty() {
        return Err(ConfigError::invalid(
            format!("{field}.steps"),
            "steps require multi_step: true",
        ));
    }

    let kind = if body.multi_step {
        if in_chain {
            return Err(ConfigError::invalid(
                format!("{field}.multi_step"),
                "nested chains are not supported",
            ));
        }
        if body.is_authentication {
            return Err(ConfigError::invalid(
                format!("{field}.is_authentication"),
                "a multi_step test cannot be an authentication step",
            ));
        }
        CaseKind::Chain(chain_steps(body.steps.clone(), field)?)
    } else if body.is_authentication {
        if !in_chain {
            return Err(ConfigError::invalid(
                format!("{field}.is_authentication"),
                "authentication steps are only allowed inside a multi_step test",
            ));
        }
        if body.payload.as_ref().is_none_or(Value::is_null) {
            return Err(ConfigError::invalid(
                format!("{field}.payload"),
                "is required for an authentication step",
            ));
        }
        CaseKind::Authentication(auth_template(body.auth_header_template.as_ref(), field)?)
    } else {
        CaseKind::Single
    };

    let endpoint = body.endpoint.clone().unwrap_or_default();
    if !matches!(kind, CaseKind::Chain(_)) && body.endpoint.is_none() {
        return Err(ConfigError::invalid(format!("{field}.endpoint"), "is required"));
    }

    let uses = parse_uses(body.uses.as_ref(), field)?;
    let response_headers = body
        .response_headers
        .as_ref()
        .map(|v| lowercase_header_names(v, &format!("{field}.response_headers")))
        .transpose()?;

    Ok(TestCase {
        name,
        method: body.method,
        endpoint,
        payload: body.payload,
        payload_type: body.payload_type,
        payload_cookies: body.payload_cookies,
        headers: body.headers,
        requires_auth: body.requires_auth,
        expects_status_code: body.expects_status_code,
        expected: body.expected,
        contains: body.contains,
        contains_not: body.contains_not,
        response_cookies: body.response_cookies,
        response_headers,
        uses,
        kind,
    })
}

fn chain_steps(steps: Vec<TestBody>, field: &str) -> Result<Vec<TestCase>, ConfigError> {
    if steps.is_empty() {
        return Err(ConfigError::invalid(
            format!("{field}.steps"),
            "must not be empty when multi_step is true",
        ));
    }

    let mut seen = HashSet::new();
    let mut auth_seen = false;
    let mut cases = Vec::with_capacity(steps.len());
    for (i, step) in steps.into_iter().enumerate() {
        let step_field = format!("{field}.steps[{i}]");
        let case = convert(step, None, &step_field, true)?;
        if !seen.insert(case.name.clone()) {
            return Err(ConfigError::invalid(
                format!("{step_field}.name"),
                format!("duplicate step name '{}'", case.name),
            ));
        }
        if case.is_authentication() {
            if auth_seen {
                return Err(ConfigError::invalid(
                    format!("{step_field}.is_authentication"),
                    "only one authentication step is allowed per chain",
                ));
            }
            auth_seen = true;
        }
        cases.push(case);
    }
    Ok(cases)
}

fn auth_template(
    template: Option<&AuthHeaderDocument>,
    field: &str,
) -> Result<AuthTemplate, ConfigError> {
    let field = format!("{field}.auth_header_template");
    let Some(template) = template else {
        return Err(ConfigError::invalid(
            field,
            "is required for an authentication step",
        ));
    };

    let Some(position) = template.token_position.as_deref() else {
        return Err(ConfigError::invalid(
            format!("{field}.token_position"),
            "is required for an authentication step",
        ));
    };
    let token_position = Expr::parse(position)
        .map_err(|e| ConfigError::invalid(format!("{field}.token_position"), e.to_string()))?;

    let auth_header = template.auth_header.clone().unwrap_or_default();
    if auth_header.is_empty() {
        return Err(ConfigError::invalid(
            format!("{field}.auth_header"),
            "must name at least one header",
        ));
    }

    Ok(AuthTemplate {
        token_position,
        auth_header,
    })
}

fn parse_uses(
    uses: Option<&BTreeMap<String, String>>,
    field: &str,
) -> Result<BTreeMap<String, Expr>, ConfigError> {
    let mut parsed = BTreeMap::new();
    for (name, source) in uses.into_iter().flatten() {
        let expr = Expr::parse(source)
            .map_err(|e| ConfigError::invalid(format!("{field}.uses.{name}"), e.to_string()))?;
        parsed.insert(name.clone(), expr);
    }
    Ok(parsed)
}

/// Response header names are matched lower-cased.
fn lowercase_header_names(value: &Value, field: &str) -> Result<Value, ConfigError> {
    match value {
        Value::Object(map) => Ok(Value::Object(
            map.iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
                .collect(),
        )),
        Value::Array(names) => names
            .iter()
            .map(|n| match n {
                Value::String(s) => Ok(Value::String(s.to_ascii_lowercase())),
                _ => Err(ConfigError::invalid(field, "list entries must be header names")),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::String(s) => Ok(Value::String(s.to_ascii_lowercase())),
        _ => Err(ConfigError::invalid(
            field,
            "must be a mapping, a list of header names, or a header name",
        )),
    }
}
