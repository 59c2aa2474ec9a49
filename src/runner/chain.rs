use std::time::Instant;

use serde_json::{Map, Value};

use crate::client::ApiClient;
use crate::config::{AuthTemplate, CaseKind, Headers, TestCase};
use crate::expr::{Bindings, render};
use crate::runner::RunError;
use crate::runner::result::{CaseResult, StepResult};
use crate::runner::single::{SmokeTest, prepare_call};

/// A multi-step case.
///
/// Steps run in order. Each step's content is stored under its name and is
/// visible to later steps through `values`. An authentication step replaces
/// the session headers used by every later step.
#[derive(Debug, Clone, Copy)]
pub struct ChainedTest<'c> {
    case: &'c TestCase,
}

/// Everything a chain run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutcome {
    /// Step name to content, `null` for failed steps.
    pub values: Map<String, Value>,
    pub steps: Vec<StepResult>,
    /// Session headers in effect after the last step.
    pub session: Headers,
}

impl ChainOutcome {
    /// Names of failed steps, authentication excluded.
    pub fn failed_steps(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| !s.authentication && !s.is_passed())
            .map(|s| s.name.as_str())
            .collect()
    }
}

impl<'c> ChainedTest<'c> {
    pub fn build(case: &'c TestCase) -> Self {
        Self { case }
    }

    /// Run every step with fresh values and the client's default session.
    ///
    /// Steps after a failed one still run.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] on a transport failure or when the
    /// authentication step cannot produce a token.
    pub fn run(&self, client: &ApiClient, env: &Value) -> Result<ChainOutcome, RunError> {
        tracing::info!("Running chained test case {}:", self.case.name);

        let mut session = client.default_headers();
        let mut values = Map::new();
        let mut steps = Vec::new();

        for step in self.case.steps() {
            let result = match &step.kind {
                CaseKind::Authentication(template) => {
                    self.authenticate(step, template, client, &mut session, &values, env)?
                }
                _ => SmokeTest::build(step).run(client, &session, &Value::Object(values.clone()), env)?,
            };
            values.insert(
                step.name.clone(),
                result.content.clone().unwrap_or(Value::Null),
            );
            steps.push(result);
        }

        Ok(ChainOutcome {
            values,
            steps,
            session,
        })
    }

    /// Run the chain and fold it into a [`CaseResult`].
    ///
    /// # Errors
    ///
    /// See [`ChainedTest::run`].
    pub fn run_case(&self, client: &ApiClient, env: &Value) -> Result<CaseResult, RunError> {
        let start = Instant::now();
        let outcome = self.run(client, env)?;
        let result = CaseResult::chain(&self.case.name, start.elapsed(), outcome.steps);
        if let Some(error) = &result.error {
            tracing::error!("Chained test case {} failed, {}", self.case.name, error.message);
        }
        Ok(result)
    }

    /// Send the step's call unjudged, pull the token out of the response
    /// and install the formatted headers as the new session.
    fn authenticate(
        &self,
        step: &TestCase,
        template: &AuthTemplate,
        client: &ApiClient,
        session: &mut Headers,
        values: &Map<String, Value>,
        env: &Value,
    ) -> Result<StepResult, RunError> {
        let start = Instant::now();
        let values = Value::Object(values.clone());
        let call = prepare_call(step, &values, env).map_err(|source| RunError::AuthExpression {
            step: step.name.clone(),
            source,
        })?;
        let response = client.send(session, &call)?;

        let res = response.to_value();
        let token = template
            .token_position
            .evaluate(&Bindings::new().bind("res", &res))
            .map_err(|source| RunError::AuthExpression {
                step: step.name.clone(),
                source,
            })?;
        if token.is_null() {
            return Err(RunError::Auth {
                step: step.name.clone(),
                message: format!("'{}' yielded no token", template.token_position),
            });
        }

        let token = render(&token);
        *session = template
            .auth_header
            .iter()
            .map(|(name, format)| (name.clone(), format.replace("{token}", &token)))
            .collect();
        tracing::debug!(step = %step.name, "installed authentication headers");

        let mut result = StepResult::passed(&step.name, start.elapsed(), response.content());
        result.authentication = true;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiResponse;
    use crate::client::testing::ScriptedTransport;
    use crate::config::parse_with_env;
    use serde_json::json;

    const CHAIN: &str = "\
type: api-test
config:
  client:
    base_url: https://api.example.com
    auth_header:
      X-Api-Key: default
tests:
  flow:
    name: flow
    multi_step: true
    steps:
      - name: login
        method: post
        endpoint: /login
        is_authentication: true
        payload: {user: u, password: p}
        auth_header_template:
          token_position: res.json().get('token')
          auth_header:
            Authorization: Bearer {token}
      - name: A
        endpoint: /me
        expects_status_code: 200
      - name: B
        endpoint: /items/{id}
        uses:
          id: values.get('A').get('token')
";

    fn flow() -> TestCase {
        parse_with_env(CHAIN, |_| None).unwrap().tests.remove(0)
    }

    fn client(transport: &ScriptedTransport) -> ApiClient {
        let suite = parse_with_env(CHAIN, |_| None).unwrap();
        ApiClient::new(&suite.client, Box::new(transport.clone()))
    }

    #[test]
    fn values_and_auth_headers_flow_between_steps() {
        let transport = ScriptedTransport::new(vec![
            ApiResponse::new(200).with_json(&json!({"token": "XYZ"})),
            ApiResponse::new(200).with_json(&json!({"token": "XYZ"})),
            ApiResponse::new(200).with_json(&json!({"id": 1})),
        ]);
        let case = flow();
        let outcome = ChainedTest::build(&case)
            .run(&client(&transport), &json!({}))
            .unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].header("x-api-key"), Some("default"));
        assert_eq!(requests[1].header("authorization"), Some("Bearer XYZ"));
        assert_eq!(requests[1].header("x-api-key"), None);
        assert_eq!(requests[2].url, "https://api.example.com/items/XYZ");
        assert_eq!(requests[2].header("authorization"), Some("Bearer XYZ"));

        assert_eq!(outcome.values["login"], json!({"token": "XYZ"}));
        assert_eq!(outcome.values["B"], json!({"id": 1}));
        assert!(outcome.failed_steps().is_empty());
        assert!(outcome.steps[0].authentication);
    }

    #[test]
    fn failed_step_is_null_and_later_steps_still_run() {
        let transport = ScriptedTransport::new(vec![
            ApiResponse::new(200).with_json(&json!({"token": "XYZ"})),
            ApiResponse::new(500),
            ApiResponse::new(200),
        ]);
        let case = flow();
        let outcome = ChainedTest::build(&case)
            .run(&client(&transport), &json!({}))
            .unwrap();

        assert_eq!(outcome.values["A"], Value::Null);
        assert_eq!(outcome.failed_steps(), ["A", "B"]);
        assert_eq!(transport.request_count(), 2);
    }

    #[test]
    fn case_result_names_failed_steps() {
        let transport = ScriptedTransport::new(vec![
            ApiResponse::new(200).with_json(&json!({"token": "XYZ"})),
            ApiResponse::new(401),
            ApiResponse::new(200),
        ]);
        let case = flow();
        let result = ChainedTest::build(&case)
            .run_case(&client(&transport), &json!({}))
            .unwrap();
        assert!(!result.is_passed());
        assert_eq!(result.error.unwrap().message, "failed steps: A, B");
        assert_eq!(result.steps.len(), 3);
    }

    #[test]
    fn missing_token_aborts_the_chain() {
        let transport = ScriptedTransport::new(vec![ApiResponse::new(403).with_json(&json!({"error": "no"}))]);
        let case = flow();
        let err = ChainedTest::build(&case)
            .run(&client(&transport), &json!({}))
            .unwrap_err();
        assert!(matches!(err, RunError::Auth { ref step, .. } if step == "login"));
        assert_eq!(transport.request_count(), 1);
    }

    #[test]
    fn non_json_auth_response_is_an_expression_error() {
        let transport = ScriptedTransport::new(vec![ApiResponse::new(200).with_body("ok")]);
        let case = flow();
        let err = ChainedTest::build(&case)
            .run(&client(&transport), &json!({}))
            .unwrap_err();
        assert!(matches!(err, RunError::AuthExpression { .. }), "{err}");
    }

    #[test]
    fn every_run_starts_from_default_session() {
        let transport = ScriptedTransport::default();
        for _ in 0..2 {
            transport.push(ApiResponse::new(200).with_json(&json!({"token": "XYZ"})));
            transport.push(ApiResponse::new(200).with_json(&json!({"token": "XYZ"})));
            transport.push(ApiResponse::new(200));
        }
        let case = flow();
        let client = client(&transport);
        let chain = ChainedTest::build(&case);
        chain.run(&client, &json!({})).unwrap();
        chain.run(&client, &json!({})).unwrap();

        let requests = transport.requests();
        assert_eq!(requests[3].header("x-api-key"), Some("default"));
        assert_eq!(requests[3].header("authorization"), None);
    }
}
