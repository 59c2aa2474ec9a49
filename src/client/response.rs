use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde_json::{Map, Value, json};

use crate::config::Headers;

/// Captured HTTP response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// Header names lower-cased; repeated headers joined with `, `.
    pub headers: Headers,
    pub body: String,
    pub cookies: Vec<ResponseCookie>,
}

/// A cookie set by the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: Option<String>,
    /// `None` for a session cookie.
    pub expires: Option<DateTime<Utc>>,
}

impl ApiResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_json(self, value: &Value) -> Self {
        self.with_header("content-type", "application/json")
            .with_body(value.to_string())
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_cookie(mut self, cookie: ResponseCookie) -> Self {
        self.cookies.push(cookie);
        self
    }

    /// The body parsed as JSON, if it is JSON.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }

    /// The body as structured content: parsed JSON, or the text with
    /// whitespace runs collapsed.
    pub fn content(&self) -> Value {
        self.json()
            .unwrap_or_else(|| Value::String(collapse_whitespace(&self.body)))
    }

    pub fn headers_value(&self) -> Value {
        Value::Object(
            self.headers
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }

    /// The raw response as seen by `token_position` through `res`.
    ///
    /// Exposes `json` (null unless the body is JSON), `text`, `content`,
    /// `status_code`, `headers` and `cookies` (name to value).
    pub fn to_value(&self) -> Value {
        let cookies: Map<String, Value> = self
            .cookies
            .iter()
            .map(|c| (c.name.clone(), Value::String(c.value.clone())))
            .collect();
        json!({
            "json": self.json().unwrap_or(Value::Null),
            "text": self.body,
            "content": self.content(),
            "status_code": self.status,
            "headers": self.headers_value(),
            "cookies": cookies,
        })
    }
}

/// Collapse every whitespace run to one space and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse one `Set-Cookie` header value.
///
/// The domain defaults to `request_host` and loses a leading dot.
/// `Max-Age` takes precedence over `Expires`; a cookie with neither is a
/// session cookie. Returns `None` if there is no `name=value` pair.
pub fn parse_set_cookie(header: &str, request_host: &str, now: DateTime<Utc>) -> Option<ResponseCookie> {
    let mut parts = header.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut cookie = ResponseCookie {
        name: name.to_owned(),
        value: value.trim().trim_matches('"').to_owned(),
        domain: request_host.to_ascii_lowercase(),
        path: None,
        expires: None,
    };
    let mut max_age: Option<i64> = None;

    for attr in parts {
        let (key, val) = match attr.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (attr.trim(), ""),
        };
        match key.to_ascii_lowercase().as_str() {
            "domain" if !val.is_empty() => {
                cookie.domain = val.trim_start_matches('.').to_ascii_lowercase();
            }
            "path" if !val.is_empty() => cookie.path = Some(val.to_owned()),
            "max-age" => max_age = val.parse().ok().or(max_age),
            "expires" => {
                if let Some(at) = parse_cookie_date(val) {
                    cookie.expires = Some(at);
                }
            }
            _ => {}
        }
    }

    if let Some(secs) = max_age {
        cookie.expires = TimeDelta::try_seconds(secs).and_then(|d| now.checked_add_signed(d));
    }
    Some(cookie)
}

/// Cookie dates: RFC 1123 (`Wed, 21 Oct 2015 07:28:00 GMT`) or the older
/// dashed form (`Wed, 21-Oct-2015 07:28:00 GMT`).
fn parse_cookie_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc2822(value) {
        return Some(at.with_timezone(&Utc));
    }
    ["%a, %d-%b-%Y %H:%M:%S GMT", "%a, %d %b %Y %H:%M:%S GMT", "%A, %d-%b-%y %H:%M:%S GMT"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}
