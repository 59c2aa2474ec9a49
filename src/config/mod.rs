//! Suite documents: the YAML schema, and the validated tree the runner uses.
//!
//! [`SuiteDocument`] mirrors the file as written and round-trips through
//! serde. [`parse`] turns it into a [`TestSuite`], rejecting structurally
//! invalid documents with the offending field path.

pub mod cookie;
pub mod validate;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use cookie::{AgeUnit, CookieConfig, Expiry, MaxAge};

use crate::client::{Method, PayloadType};
use crate::expr::Expr;

/// Header name to value.
pub type Headers = BTreeMap<String, String>;

/// Overlay `overrides` onto `headers`. Header names compare
/// case-insensitively, so an override replaces any spelling of its name.
pub fn overlay_headers(headers: &mut Headers, overrides: &Headers) {
    for (name, value) in overrides {
        headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
        headers.insert(name.clone(), value.clone());
    }
}

/// Default request timeout in seconds when `kwargs.timeout` is absent.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Errors raised while loading a suite document.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid suite document: {0}")]
    Syntax(#[from] serde_yaml::Error),

    #[error("{field}: {message}")]
    Invalid { field: String, message: String },

    #[error("config.env.{name}: environment variable '{var}' is not set")]
    MissingEnv { name: String, var: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// The only supported suite type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SuiteKind {
    #[default]
    #[serde(rename = "api-test")]
    ApiTest,
}

// --- document schema ---

/// A suite file as written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteDocument {
    #[serde(rename = "type")]
    pub kind: SuiteKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<DocumentConfig>,
    /// Test name to body, in file order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<serde_yaml::Mapping>,
}

/// The `config` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientConfig>,
    /// Internal name to environment variable name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

/// `config.client`: how every request in the suite is issued.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default)]
    pub base_url: String,
    /// Header template installed as the default session headers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_header: Option<Headers>,
    #[serde(default, skip_serializing_if = "ClientOptions::is_empty")]
    pub kwargs: ClientOptions,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// `auth_header` merged with `kwargs.headers`, the latter winning.
    pub fn default_headers(&self) -> Headers {
        let mut headers = self.auth_header.clone().unwrap_or_default();
        overlay_headers(&mut headers, &self.kwargs.headers);
        headers
    }

    pub fn timeout_secs(&self) -> u64 {
        self.kwargs.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }
}

/// `config.client.kwargs`: default request options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientOptions {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: Headers,
    /// Seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, String>,
}

impl ClientOptions {
    fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.timeout.is_none() && self.query.is_empty()
    }
}

fn default_true() -> bool {
    true
}

fn is_true(b: &bool) -> bool {
    *b
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// One test or step body as written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestBody {
    /// Required for steps; for top-level tests it overrides the mapping key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub method: Method,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "is_json")]
    pub payload_type: PayloadType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub payload_cookies: Vec<CookieConfig>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: Headers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expects_status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains_not: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_cookies: Vec<CookieConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_header_template: Option<AuthHeaderDocument>,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub requires_auth: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_authentication: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub multi_step: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<TestBody>,
    /// Placeholder name to expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uses: Option<BTreeMap<String, String>>,
}

fn is_json(t: &PayloadType) -> bool {
    *t == PayloadType::Json
}

impl TestBody {
    /// An empty `get` body.
    pub fn new() -> Self {
        Self {
            name: None,
            method: Method::Get,
            endpoint: None,
            payload: None,
            payload_type: PayloadType::Json,
            payload_cookies: Vec::new(),
            headers: Headers::new(),
            expects_status_code: None,
            expected: None,
            contains: None,
            contains_not: None,
            response_cookies: Vec::new(),
            response_headers: None,
            auth_header_template: None,
            requires_auth: true,
            is_authentication: false,
            multi_step: false,
            steps: Vec::new(),
            uses: None,
        }
    }
}

impl Default for TestBody {
    fn default() -> Self {
        Self::new()
    }
}

/// `auth_header_template` as written; both fields are checked at load time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthHeaderDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_header: Option<Headers>,
}

// --- validated tree ---

/// A loaded, validated suite.
#[derive(Debug, Clone, PartialEq)]
pub struct TestSuite {
    pub kind: SuiteKind,
    pub client: ClientConfig,
    /// Internal name to resolved environment value.
    pub env: BTreeMap<String, String>,
    pub tests: Vec<TestCase>,
}

impl TestSuite {
    /// The resolved environment as a JSON object, for the `env` binding.
    pub fn env_value(&self) -> Value {
        Value::Object(
            self.env
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }
}

/// One validated test case or chain step.
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub name: String,
    pub method: Method,
    pub endpoint: String,
    pub payload: Option<Value>,
    pub payload_type: PayloadType,
    pub payload_cookies: Vec<CookieConfig>,
    /// Temporary headers for this call only.
    pub headers: Headers,
    pub requires_auth: bool,
    pub expects_status_code: Option<u16>,
    pub expected: Option<Value>,
    pub contains: Option<Value>,
    pub contains_not: Option<Value>,
    pub response_cookies: Vec<CookieConfig>,
    /// Expected response headers, names lower-cased.
    pub response_headers: Option<Value>,
    pub uses: BTreeMap<String, Expr>,
    pub kind: CaseKind,
}

/// Whether a case is a plain call, an authentication step, or a chain.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseKind {
    Single,
    Authentication(AuthTemplate),
    Chain(Vec<TestCase>),
}

/// How an authentication step turns its response into session headers.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthTemplate {
    /// Evaluated against `res`.
    pub token_position: Expr,
    /// Header name to value format; `{token}` is replaced by the token.
    pub auth_header: Headers,
}

impl TestCase {
    pub fn is_chain(&self) -> bool {
        matches!(self.kind, CaseKind::Chain(_))
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self.kind, CaseKind::Authentication(_))
    }

    pub fn steps(&self) -> &[TestCase] {
        match &self.kind {
            CaseKind::Chain(steps) => steps,
            _ => &[],
        }
    }

    /// `METHOD endpoint`, used in diagnostics.
    pub fn describe_call(&self) -> String {
        format!("{} {}", self.method, self.endpoint)
    }
}

/// Parse and validate a suite, resolving `config.env` from the process
/// environment.
///
/// # Errors
///
/// Returns a [`ConfigError`] for malformed YAML, schema violations, or
/// unset environment variables.
pub fn parse(raw: &str) -> Result<TestSuite, ConfigError> {
    parse_with_env(raw, |var| std::env::var(var).ok())
}

/// Like [`parse`] with an explicit environment lookup.
///
/// # Errors
///
/// See [`parse`].
pub fn parse_with_env(
    raw: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<TestSuite, ConfigError> {
    let document: SuiteDocument = serde_yaml::from_str(raw)?;
    load_document(document, lookup)
}

/// Read and parse a suite file.
///
/// # Errors
///
/// See [`parse`]; also fails if the file cannot be read.
pub fn load_file(path: &Path) -> Result<TestSuite, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&raw)
}

/// Validate an already deserialized document.
///
/// # Errors
///
/// See [`parse`].
pub fn load_document(
    document: SuiteDocument,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<TestSuite, ConfigError> {
    let config = document.config.unwrap_or_default();
    let client = config
        .client
        .ok_or_else(|| ConfigError::invalid("config.client", "is required"))?;

    let mut env = BTreeMap::new();
    for (name, var) in config.env {
        let value = lookup(&var).ok_or_else(|| ConfigError::MissingEnv {
            name: name.clone(),
            var: var.clone(),
        })?;
        env.insert(name, value);
    }

    let mut tests = Vec::new();
    for (key, body) in document.tests.unwrap_or_default() {
        let serde_yaml::Value::String(key) = key else {
            return Err(ConfigError::invalid("tests", "test names must be strings"));
        };
        let field = format!("tests.{key}");
        let body: TestBody = serde_yaml::from_value(body)
            .map_err(|e| ConfigError::invalid(field.clone(), e.to_string()))?;
        tests.push(validate::test_case(body, Some(&key), &field)?);
    }

    Ok(TestSuite {
        kind: document.kind,
        client,
        env,
        tests,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    const MINIMAL: &str = "\
type: api-test
config:
  client:
    base_url: https://example.com/
";

    #[test]
    fn unknown_top_level_key_rejected() {
        let raw = format!("{MINIMAL}test:\n  home:\n    endpoint: /\n");
        let err = parse_with_env(&raw, no_env).unwrap_err();
        assert!(matches!(err, ConfigError::Syntax(_)), "{err}");
        assert!(err.to_string().contains("unknown field `test`"), "{err}");
    }

    #[test]
    fn zero_tests_is_valid() {
        let suite = parse_with_env(MINIMAL, no_env).unwrap();
        assert_eq!(suite.kind, SuiteKind::ApiTest);
        assert_eq!(suite.client.base_url, "https://example.com/");
        assert!(suite.tests.is_empty());
    }

    #[test]
    fn missing_client_fails() {
        let err = parse_with_env("type: api-test\nconfig: {}\ntests: {}\n", no_env).unwrap_err();
        assert_eq!(err.to_string(), "config.client: is required");

        let err = parse_with_env("type: api-test\n", no_env).unwrap_err();
        assert_eq!(err.to_string(), "config.client: is required");
    }

    #[test]
    fn unknown_type_fails() {
        let err = parse_with_env("type: ui-test\nconfig:\n  client: {}\n", no_env).unwrap_err();
        assert!(matches!(err, ConfigError::Syntax(_)));
    }

    #[test]
    fn tests_keep_file_order_and_defaults() {
        let raw = format!(
            "{MINIMAL}tests:\n  zeta:\n    endpoint: /z\n  alpha:\n    method: post\n    endpoint: /a\n    payload: {{foo: bar}}\n"
        );
        let suite = parse_with_env(&raw, no_env).unwrap();
        let names: Vec<&str> = suite.tests.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["zeta", "alpha"]);

        let zeta = &suite.tests[0];
        assert_eq!(zeta.method, Method::Get);
        assert!(zeta.requires_auth);
        assert_eq!(zeta.kind, CaseKind::Single);

        let alpha = &suite.tests[1];
        assert_eq!(alpha.method, Method::Post);
        assert_eq!(alpha.payload, Some(serde_json::json!({"foo": "bar"})));
    }

    #[test]
    fn body_name_overrides_key() {
        let raw = format!("{MINIMAL}tests:\n  key:\n    name: Display Name\n    endpoint: /\n");
        let suite = parse_with_env(&raw, no_env).unwrap();
        assert_eq!(suite.tests[0].name, "Display Name");
    }

    #[test]
    fn env_bindings_resolve_through_lookup() {
        let raw = format!("{MINIMAL}  env:\n    user: SMOKE_USER\n");
        let suite = parse_with_env(&raw, |var| (var == "SMOKE_USER").then(|| "alice".to_owned())).unwrap();
        assert_eq!(suite.env["user"], "alice");
        assert_eq!(suite.env_value(), serde_json::json!({"user": "alice"}));
    }

    #[test]
    fn undefined_env_variable_fails() {
        let raw = format!("{MINIMAL}  env:\n    user: SMOKE_USER\n");
        let err = parse_with_env(&raw, no_env).unwrap_err();
        assert_eq!(
            err.to_string(),
            "config.env.user: environment variable 'SMOKE_USER' is not set"
        );
    }

    #[test]
    fn unknown_test_field_reports_path() {
        let raw = format!("{MINIMAL}tests:\n  t1:\n    endpont: /typo\n");
        let err = parse_with_env(&raw, no_env).unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("tests.t1: "), "{message}");
        assert!(message.contains("endpont"), "{message}");
    }

    #[test]
    fn default_headers_merge_auth_and_kwargs() {
        let raw = "\
type: api-test
config:
  client:
    base_url: https://example.com
    auth_header:
      Authorization: Token abc
    kwargs:
      headers:
        Accept: application/json
      timeout: 5
";
        let suite = parse_with_env(raw, no_env).unwrap();
        let headers = suite.client.default_headers();
        assert_eq!(headers["Authorization"], "Token abc");
        assert_eq!(headers["Accept"], "application/json");
        assert_eq!(suite.client.timeout_secs(), 5);
    }

    #[test]
    fn kwargs_header_replaces_auth_header_of_any_case() {
        let raw = format!(
            "{}    auth_header:\n      Authorization: Token abc\n    kwargs:\n      headers:\n        authorization: Bearer xyz\n",
            MINIMAL
        );
        let headers = parse_with_env(&raw, no_env).unwrap().client.default_headers();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers["authorization"], "Bearer xyz");
    }

    #[test]
    fn timeout_defaults() {
        let suite = parse_with_env(MINIMAL, no_env).unwrap();
        assert_eq!(suite.client.timeout_secs(), DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn document_round_trips_through_yaml() {
        let mut tests = serde_yaml::Mapping::new();
        let body = TestBody {
            endpoint: Some("/".into()),
            expects_status_code: Some(200),
            ..TestBody::new()
        };
        tests.insert("home".into(), serde_yaml::to_value(&body).unwrap());
        let doc = SuiteDocument {
            kind: SuiteKind::ApiTest,
            config: Some(DocumentConfig {
                client: Some(ClientConfig::new("https://example.com")),
                env: BTreeMap::new(),
            }),
            tests: Some(tests),
        };
        let yaml = serde_yaml::to_string(&doc).unwrap();
        assert!(yaml.contains("type: api-test"));
        assert!(!yaml.contains("requires_auth"));
        let back: SuiteDocument = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, doc);
    }
}
