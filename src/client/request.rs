use std::collections::BTreeMap;

use serde_json::Value;
use url::Url;

use crate::client::{Method, PayloadType};
use crate::config::Headers;
use crate::expr::render;

/// A fully resolved HTTP request ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRequest {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub body: Option<RequestBody>,
}

impl ResolvedRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Host part of the URL, if it has one.
    pub fn host(&self) -> Option<String> {
        Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned))
    }
}

/// Serialized request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// JSON text.
    Json(String),
    /// Form fields, sent url-encoded.
    Form(Vec<(String, String)>),
    /// Raw text, sent as is.
    Text(String),
}

impl RequestBody {
    /// Build a body from a payload value.
    pub fn from_payload(payload: &Value, payload_type: PayloadType) -> Self {
        match (payload_type, payload) {
            (PayloadType::Json, value) => Self::Json(value.to_string()),
            (PayloadType::Multipart, Value::Object(fields)) => Self::Form(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), render(v)))
                    .collect(),
            ),
            (PayloadType::Multipart, other) => Self::Text(render(other)),
        }
    }

    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            Self::Json(_) => Some("application/json"),
            Self::Form(_) => Some("application/x-www-form-urlencoded"),
            Self::Text(_) => None,
        }
    }

    /// The bytes that go on the wire.
    pub fn encode(&self) -> String {
        match self {
            Self::Json(text) | Self::Text(text) => text.clone(),
            Self::Form(fields) => url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(fields)
                .finish(),
        }
    }
}

/// Resolve `path` against `base` the way a browser resolves a link.
///
/// `https://example.com/foo/` + `bar/` gives `https://example.com/foo/bar/`,
/// while `/bar` replaces the whole path. A base that is not an absolute URL
/// is simply prefixed.
pub fn join_url(base: &str, path: &str) -> String {
    match Url::parse(base).and_then(|b| b.join(path)) {
        Ok(url) => url.to_string(),
        Err(_) => format!("{base}{path}"),
    }
}

/// Append query parameters to `url`, keeping any it already has.
pub fn append_query(url: &str, query: &BTreeMap<String, String>) -> String {
    if query.is_empty() {
        return url.to_owned();
    }
    if let Ok(mut parsed) = Url::parse(url) {
        parsed.query_pairs_mut().extend_pairs(query);
        return parsed.to_string();
    }
    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(query)
        .finish();
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{url}{sep}{encoded}")
}

/// Render request cookies as one `Cookie` header value.
pub fn cookie_header(cookies: &BTreeMap<String, String>) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }
    let pairs: Vec<String> = cookies.iter().map(|(k, v)| format!("{k}={v}")).collect();
    Some(pairs.join("; "))
}
