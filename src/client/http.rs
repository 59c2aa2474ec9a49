use std::time::Duration;

use chrono::Utc;

use crate::client::request::ResolvedRequest;
use crate::client::response::{ApiResponse, parse_set_cookie};
use crate::client::{Method, Transport, TransportError};
use crate::config::Headers;

/// Blocking HTTP transport backed by `ureq`.
///
/// Status codes are never treated as errors; a 404 is a response like any
/// other. Cookies are not stored between calls.
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::config::Config::builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build();

        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: &ResolvedRequest) -> Result<ApiResponse, TransportError> {
        let url = request.url.as_str();
        let body = request.body.as_ref().map(|b| b.encode());

        let result = match request.method {
            Method::Get | Method::Delete => {
                let mut req = if request.method == Method::Get {
                    self.agent.get(url)
                } else {
                    self.agent.delete(url)
                };
                for (key, value) in &request.headers {
                    req = req.header(key, value);
                }
                req.call()
            }
            Method::Post | Method::Put | Method::Patch => {
                let mut req = match request.method {
                    Method::Post => self.agent.post(url),
                    Method::Put => self.agent.put(url),
                    _ => self.agent.patch(url),
                };
                for (key, value) in &request.headers {
                    req = req.header(key, value);
                }
                if let Some(body) = &body {
                    req.send(body.as_bytes())
                } else {
                    req.send_empty()
                }
            }
        };

        let mut resp = result.map_err(|e| TransportError::Request {
            method: request.method,
            url: request.url.clone(),
            message: e.to_string(),
        })?;

        let status = resp.status().as_u16();
        let host = request.host().unwrap_or_default();
        let now = Utc::now();

        let mut headers = Headers::new();
        let mut cookies = Vec::new();
        for (name, value) in resp.headers() {
            let Ok(value) = value.to_str() else {
                continue;
            };
            let name = name.as_str().to_ascii_lowercase();
            if name == "set-cookie"
                && let Some(cookie) = parse_set_cookie(value, &host, now)
            {
                cookies.push(cookie);
            }
            headers
                .entry(name)
                .and_modify(|joined: &mut String| {
                    joined.push_str(", ");
                    joined.push_str(value);
                })
                .or_insert_with(|| value.to_owned());
        }

        let body = resp
            .body_mut()
            .read_to_string()
            .map_err(|e| TransportError::Body {
                url: request.url.clone(),
                message: e.to_string(),
            })?;

        tracing::debug!(status, url = %request.url, "received response");

        Ok(ApiResponse {
            status,
            headers,
            body,
            cookies,
        })
    }
}
