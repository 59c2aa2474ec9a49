//! Turn a recorded HTTP exchange into a one-test suite.
//!
//! The recording proxy emits one JSON object per exchange:
//! `{"Request": {Method, Path, Payload, Protocol, Headers},
//!   "Response": {Status_code, Body, Headers}}`.
//! The generated suite replays the request and expects the recorded status
//! and body.

pub mod rewrite;

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::client::{Method, response::collapse_whitespace};
use crate::config::{ClientConfig, DocumentConfig, Headers, SuiteDocument, SuiteKind, TestBody};
use crate::expr::parse_payload;

pub use self::rewrite::{RequestRule, RewriteConfig};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid capture record: {0}")]
    Record(String),

    #[error("invalid rewrite config: {0}")]
    Rewrite(String),

    #[error("invalid keep pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    #[error("request path '{path}' is not an absolute URL")]
    Url { path: String },

    #[error("failed to decompress response body: {0}")]
    Gzip(String),

    #[error("failed to serialize suite: {0}")]
    Serialize(String),
}

/// One recorded exchange.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CaptureRecord {
    #[serde(rename = "Request")]
    pub request: CapturedRequest,
    #[serde(rename = "Response")]
    pub response: CapturedResponse,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CapturedRequest {
    #[serde(rename = "Method")]
    pub method: String,
    /// Absolute URL including the query.
    #[serde(rename = "Path")]
    pub path: String,
    #[serde(rename = "Payload")]
    pub payload: Value,
    #[serde(rename = "Protocol")]
    pub protocol: String,
    #[serde(rename = "Headers")]
    pub headers: BTreeMap<String, HeaderValues>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CapturedResponse {
    #[serde(rename = "Status_code")]
    pub status_code: u16,
    #[serde(rename = "Body")]
    pub body: Value,
    #[serde(rename = "Headers")]
    pub headers: BTreeMap<String, HeaderValues>,
}

/// A recorded header: one value or a list of values.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum HeaderValues {
    One(String),
    Many(Vec<String>),
}

impl HeaderValues {
    pub fn joined(&self) -> String {
        match self {
            Self::One(value) => value.clone(),
            Self::Many(values) => values.join(", "),
        }
    }
}

impl CaptureRecord {
    /// Parse one JSON record.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Record`] if a required field is missing.
    pub fn parse(raw: &str) -> Result<Self, CaptureError> {
        serde_json::from_str(raw).map_err(|e| CaptureError::Record(e.to_string()))
    }

    fn request_header(&self, name: &str) -> Option<String> {
        self.request
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.joined())
    }
}

/// What converting one record produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutput {
    Suite {
        test_name: String,
        document: SuiteDocument,
    },
    /// The rewrite config excludes this request.
    Skipped { method: String, path: String },
}

/// Converts records under one rewrite policy.
#[derive(Debug, Clone, Default)]
pub struct CaptureConverter {
    rewrite: RewriteConfig,
}

impl CaptureConverter {
    pub fn new(rewrite: RewriteConfig) -> Self {
        Self { rewrite }
    }

    /// Build the suite for `record`, or report that it is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError`] if the URL is not absolute, the body cannot
    /// be decoded, or a `keep` pattern is invalid.
    pub fn convert(&self, record: &CaptureRecord) -> Result<CaptureOutput, CaptureError> {
        let url = Url::parse(&record.request.path).map_err(|_| CaptureError::Url {
            path: record.request.path.clone(),
        })?;
        let path = url.path();
        let method_name = record.request.method.to_ascii_lowercase();

        if self.rewrite.is_skipped(path, &method_name) {
            tracing::warn!("Skipping {} {path}", record.request.method.to_ascii_uppercase());
            return Ok(CaptureOutput::Skipped {
                method: record.request.method.to_ascii_uppercase(),
                path: path.to_owned(),
            });
        }

        let method: Method = method_name
            .parse()
            .map_err(CaptureError::Record)?;
        let host = url.host_str().unwrap_or_default();
        let test_name = format!(
            "{method_name}-{}{}",
            host.replace('.', "_"),
            path.replace('/', "__")
        );

        let mut base_url = format!("{}://{host}", url.scheme());
        if let Some(port) = url.port() {
            base_url.push_str(&format!(":{port}"));
        }
        let endpoint = match url.query() {
            Some(query) => format!("{path}?{query}"),
            None => path.to_owned(),
        };

        let rule = self.rewrite.rule(path, &method_name);
        let payload = self.build_payload(record, rule);
        let contains = self.build_body(record, rule)?;

        let mut headers: Headers = self.rewrite.headers.clone();
        headers.extend(record.request.headers.iter().map(|(k, v)| (k.clone(), v.joined())));

        let body = TestBody {
            name: Some(test_name.clone()),
            method,
            endpoint: Some(endpoint),
            payload,
            headers,
            expects_status_code: Some(record.response.status_code),
            contains,
            ..TestBody::new()
        };
        let body = serde_yaml::to_value(&body).map_err(|e| CaptureError::Serialize(e.to_string()))?;

        let mut tests = serde_yaml::Mapping::new();
        tests.insert(serde_yaml::Value::String(test_name.clone()), body);

        let document = SuiteDocument {
            kind: SuiteKind::ApiTest,
            config: Some(DocumentConfig {
                client: Some(ClientConfig::new(base_url)),
                ..DocumentConfig::default()
            }),
            tests: Some(tests),
        };
        Ok(CaptureOutput::Suite {
            test_name,
            document,
        })
    }

    /// Convert `record` and write the suite to `target`. Nothing is written
    /// for a skipped record.
    ///
    /// # Errors
    ///
    /// See [`CaptureConverter::convert`]; also fails if `target` cannot be
    /// written.
    pub fn write(&self, record: &CaptureRecord, target: &Path) -> Result<CaptureOutput, CaptureError> {
        let output = self.convert(record)?;
        if let CaptureOutput::Suite { document, .. } = &output {
            let yaml = serde_yaml::to_string(document).map_err(|e| CaptureError::Serialize(e.to_string()))?;
            std::fs::write(target, yaml).map_err(|source| CaptureError::Io {
                path: target.to_path_buf(),
                source,
            })?;
        }
        Ok(output)
    }

    fn build_payload(&self, record: &CaptureRecord, rule: Option<&RequestRule>) -> Option<Value> {
        let payload = match &record.request.payload {
            Value::String(text) if text.is_empty() => return None,
            Value::String(text) => parse_payload(text),
            Value::Null => return None,
            Value::Object(fields) if fields.is_empty() => return None,
            other => other.clone(),
        };
        Some(match rule {
            Some(rule) => rule.clean_payload(payload),
            None => payload,
        })
    }

    fn build_body(&self, record: &CaptureRecord, rule: Option<&RequestRule>) -> Result<Option<Value>, CaptureError> {
        let text = match &record.response.body {
            Value::Null => return Ok(None),
            Value::String(raw) => {
                let mut bytes = decode_base64(raw).unwrap_or_else(|| raw.as_bytes().to_vec());
                let accepts_zip = record
                    .request_header("Accept-Encoding")
                    .is_some_and(|enc| enc.contains("zip"));
                if accepts_zip && is_gzip(&bytes) {
                    bytes = gunzip(&bytes)?;
                }
                String::from_utf8_lossy(&bytes).into_owned()
            }
            structured => {
                return Ok(Some(clean(rule, structured.clone())?));
            }
        };

        if text.trim().is_empty() {
            return Ok(None);
        }
        let body = if text.to_ascii_lowercase().contains("<html") {
            Value::String(collapse_whitespace(&text))
        } else {
            match parse_payload(&text) {
                Value::String(s) => Value::String(collapse_whitespace(&s)),
                structured => structured,
            }
        };
        Ok(Some(clean(rule, body)?))
    }
}

fn clean(rule: Option<&RequestRule>, body: Value) -> Result<Value, CaptureError> {
    match rule {
        Some(rule) => rule.clean_response(body),
        None => Ok(body),
    }
}

/// Decode `raw` if it is canonical base64 of UTF-8 text or a gzip stream.
fn decode_base64(raw: &str) -> Option<Vec<u8>> {
    if raw.is_empty() {
        return None;
    }
    let bytes = STANDARD.decode(raw).ok()?;
    if STANDARD.encode(&bytes) != raw {
        return None;
    }
    (is_gzip(&bytes) || std::str::from_utf8(&bytes).is_ok()).then_some(bytes)
}

fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0x1f, 0x8b])
}

fn gunzip(bytes: &[u8]) -> Result<Vec<u8>, CaptureError> {
    let mut out = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut out)
        .map_err(|e| CaptureError::Gzip(e.to_string()))?;
    Ok(out)
}
