use std::collections::BTreeMap;
use std::time::Instant;

use serde_json::Value;

use crate::client::{ApiClient, ApiResponse, Call, RequestOptions};
use crate::config::{Headers, TestCase};
use crate::expr::{Bindings, ExprError, parse_payload, render, substitute, substitute_value};
use crate::matcher::{Comparator, Label, MatchOutcome, Received};
use crate::runner::RunError;
use crate::runner::result::{AssertionResult, StepError, StepErrorKind, StepResult};

/// One test case bound to its comparators.
///
/// The pipeline runs status, response cookies, response headers, then the
/// body comparators (`expected`, `contains`, `contains_not`) and stops at the
/// first failure.
#[derive(Debug, Clone)]
pub struct SmokeTest<'c> {
    case: &'c TestCase,
    status: Option<Comparator>,
    cookies: Option<Comparator>,
    headers: Option<Comparator>,
    body: Vec<Comparator>,
}

impl<'c> SmokeTest<'c> {
    pub fn build(case: &'c TestCase) -> Self {
        let mut body = Vec::new();
        if let Some(expected) = &case.expected {
            body.push(Comparator::equals(expected.clone()));
        }
        if let Some(contains) = &case.contains {
            body.push(Comparator::contains(contains.clone()));
        }
        if let Some(contains_not) = &case.contains_not {
            body.push(Comparator::contains_not(contains_not.clone()));
        }

        Self {
            case,
            status: case.expects_status_code.map(Comparator::status),
            cookies: (!case.response_cookies.is_empty())
                .then(|| Comparator::cookies(case.response_cookies.clone())),
            headers: case.response_headers.clone().map(Comparator::contains),
            body,
        }
    }

    pub fn case(&self) -> &TestCase {
        self.case
    }

    /// Execute the call and judge the response.
    ///
    /// `values` holds the results of earlier chain steps and `env` the
    /// suite's resolved environment; both are visible to `uses`.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] if the transport fails. Comparator mismatches
    /// and `uses` errors produce a failed [`StepResult`] instead.
    pub fn run(
        &self,
        client: &ApiClient,
        session: &Headers,
        values: &Value,
        env: &Value,
    ) -> Result<StepResult, RunError> {
        let start = Instant::now();
        let name = self.case.name.as_str();

        let call = match prepare_call(self.case, values, env) {
            Ok(call) => call,
            Err(e) => {
                tracing::error!("Could not resolve uses for {name}: {e}");
                return Ok(StepResult::failed(
                    name,
                    start.elapsed(),
                    StepError::new(StepErrorKind::ExpressionFailed, e.to_string()),
                ));
            }
        };

        let response = client.send(session, &call)?;
        let label_text = format!("{} {}", call.method, call.path);
        let label = Label {
            name,
            call: &label_text,
        };

        let mut assertions = Vec::new();
        let content = self.judge(&response, label, &mut assertions)?;

        let mut result = match content {
            Some(content) => {
                tracing::info!("Success for {name}!");
                StepResult::passed(name, start.elapsed(), content)
            }
            None => {
                let message = assertions
                    .iter()
                    .find(|a| !a.passed)
                    .and_then(|a| a.message.clone())
                    .unwrap_or_default();
                StepResult::failed(
                    name,
                    start.elapsed(),
                    StepError::new(StepErrorKind::AssertionFailed, message),
                )
            }
        };
        result.assertions = assertions;
        Ok(result)
    }

    /// Run the pipeline; `None` means a comparator failed.
    fn judge(
        &self,
        response: &ApiResponse,
        label: Label<'_>,
        assertions: &mut Vec<AssertionResult>,
    ) -> Result<Option<Value>, RunError> {
        let headers = response.headers_value();
        let leading = [
            (&self.status, Received::Status(response.status)),
            (&self.cookies, Received::Cookies(&response.cookies)),
            (&self.headers, Received::Value(&headers)),
        ];
        for (comparator, received) in leading {
            if let Some(comparator) = comparator
                && !record(assertions, comparator.test(received, label)?)
            {
                return Ok(None);
            }
        }

        let content = response.content();
        for comparator in &self.body {
            if !record(assertions, comparator.test(Received::Value(&content), label)?) {
                return Ok(None);
            }
        }
        Ok(Some(content))
    }
}

fn record(assertions: &mut Vec<AssertionResult>, outcome: MatchOutcome) -> bool {
    let passed = outcome.passed;
    assertions.push(AssertionResult {
        text: outcome.mode.to_string(),
        passed,
        message: outcome.message,
    });
    passed
}

/// Evaluate `uses` and build the call with endpoint and payload resolved.
///
/// A string payload is substituted first and then interpreted, so a
/// placeholder may stand in for a whole JSON value.
///
/// # Errors
///
/// Returns the first [`ExprError`] raised by a `uses` expression.
pub fn prepare_call(case: &TestCase, values: &Value, env: &Value) -> Result<Call, ExprError> {
    let bindings = Bindings::new().bind("values", values).bind("env", env);
    let mut vars = BTreeMap::new();
    for (placeholder, expr) in &case.uses {
        let value = expr.evaluate(&bindings)?;
        vars.insert(placeholder.clone(), render(&value));
    }

    let payload = case.payload.as_ref().map(|payload| match payload {
        Value::String(text) => parse_payload(&substitute(text, &vars)),
        other => substitute_value(other, &vars),
    });

    let cookies = case
        .payload_cookies
        .iter()
        .map(|c| (c.key.clone(), c.value.clone().unwrap_or_default()))
        .collect();

    Ok(Call {
        method: case.method,
        path: substitute(&case.endpoint, &vars),
        query: BTreeMap::new(),
        payload,
        payload_type: case.payload_type,
        requires_auth: case.requires_auth,
        options: RequestOptions {
            headers: case.headers.clone(),
            cookies,
        },
    })
}
