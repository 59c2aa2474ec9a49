use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::capture::CaptureError;
use crate::expr::render;

/// How captured exchanges are filtered and cleaned before they become
/// test cases. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RewriteConfig {
    /// Path to upper-case methods that are never captured.
    pub skip: BTreeMap<String, Vec<String>>,
    /// Paths containing any of these substrings are never captured.
    pub skip_files: Vec<String>,
    /// Headers added to every generated test; recorded headers win.
    pub headers: BTreeMap<String, String>,
    /// Path to lower-case method to rule.
    pub requests: BTreeMap<String, BTreeMap<String, RequestRule>>,
}

/// Cleaning rules for one path and method.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RequestRule {
    /// Top-level response keys to drop.
    pub ignore_response: Vec<String>,
    /// Regexes; when present the body is replaced by their matches.
    pub keep: Vec<String>,
    /// Payload keys to overwrite, only where already present.
    pub payload: Map<String, Value>,
}

impl RewriteConfig {
    /// Parse a rewrite config document.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Rewrite`] for malformed YAML or unknown keys.
    pub fn parse(raw: &str) -> Result<Self, CaptureError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).map_err(|e| CaptureError::Rewrite(e.to_string()))
    }

    /// Read a rewrite config; a missing file means no rewriting.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Io`] if the file exists but cannot be read,
    /// or [`CaptureError::Rewrite`] if it does not parse.
    pub fn from_file(path: &Path) -> Result<Self, CaptureError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::parse(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(CaptureError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Whether a request to `path` with `method` is left out.
    pub fn is_skipped(&self, path: &str, method: &str) -> bool {
        let method = method.to_ascii_uppercase();
        if self
            .skip
            .get(path)
            .is_some_and(|methods| methods.iter().any(|m| m.eq_ignore_ascii_case(&method)))
        {
            return true;
        }
        self.skip_files.iter().any(|fragment| path.contains(fragment.as_str()))
    }

    pub fn rule(&self, path: &str, method: &str) -> Option<&RequestRule> {
        self.requests.get(path)?.get(&method.to_ascii_lowercase())
    }
}

impl RequestRule {
    /// Drop ignored keys, then apply `keep` extraction.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Pattern`] for an invalid `keep` regex.
    pub fn clean_response(&self, body: Value) -> Result<Value, CaptureError> {
        let body = self.drop_ignored(body);
        self.keep_matches(body)
    }

    fn drop_ignored(&self, body: Value) -> Value {
        match body {
            Value::Object(mut fields) => {
                for key in &self.ignore_response {
                    fields.remove(key);
                }
                Value::Object(fields)
            }
            other => other,
        }
    }

    /// Replace the body by every match of every `keep` pattern. A pattern
    /// with a capture group contributes the group instead of the match.
    fn keep_matches(&self, body: Value) -> Result<Value, CaptureError> {
        if self.keep.is_empty() {
            return Ok(body);
        }
        let text = render(&body);
        let mut found = Vec::new();
        for pattern in &self.keep {
            let re = Regex::new(pattern).map_err(|e| CaptureError::Pattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            for caps in re.captures_iter(&text) {
                if let Some(m) = caps.get(1).or_else(|| caps.get(0)) {
                    found.push(Value::String(m.as_str().to_owned()));
                }
            }
        }
        Ok(Value::Array(found))
    }

    /// Overwrite payload keys that are already present.
    pub fn clean_payload(&self, payload: Value) -> Value {
        match payload {
            Value::Object(mut fields) => {
                for (key, replacement) in &self.payload {
                    if let Some(slot) = fields.get_mut(key) {
                        *slot = replacement.clone();
                    }
                }
                Value::Object(fields)
            }
            other => other,
        }
    }
}
