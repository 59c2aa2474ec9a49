//! HTTP client used by test cases.
//!
//! [`ApiClient`] resolves calls against the suite's base URL and default
//! options and hands a [`ResolvedRequest`] to a [`Transport`]. Session
//! headers are owned by the caller and passed into every call, so an
//! authentication step can swap them without touching the client.

pub mod http;
pub mod method;
pub mod request;
pub mod response;
#[doc(hidden)]
pub mod testing;

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::config::{ClientConfig, Headers, overlay_headers};
use crate::expr::render;

pub use self::http::HttpTransport;
pub use self::method::{Method, PayloadType};
pub use self::request::{RequestBody, ResolvedRequest};
pub use self::response::{ApiResponse, ResponseCookie};

use self::request::{append_query, cookie_header, join_url};

/// Failure to complete an HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("{method} {url} failed: {message}")]
    Request {
        method: Method,
        url: String,
        message: String,
    },

    #[error("failed to read response body from {url}: {message}")]
    Body { url: String, message: String },
}

/// Sends resolved requests.
pub trait Transport: Send + Sync {
    /// Execute one request and return the full response, whatever its
    /// status code.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when no response could be obtained.
    fn execute(&self, request: &ResolvedRequest) -> Result<ApiResponse, TransportError>;
}

/// Per-call options: temporary headers and request cookies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    /// Overlay the session headers for this call only.
    pub headers: Headers,
    pub cookies: BTreeMap<String, String>,
}

/// One call before resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub payload: Option<Value>,
    pub payload_type: PayloadType,
    /// When false, no session headers are sent.
    pub requires_auth: bool,
    pub options: RequestOptions,
}

impl Call {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: BTreeMap::new(),
            payload: None,
            payload_type: PayloadType::default(),
            requires_auth: true,
            options: RequestOptions::default(),
        }
    }
}

/// Client bound to one suite's `config.client` section.
pub struct ApiClient {
    base_url: String,
    default_headers: Headers,
    default_query: BTreeMap<String, String>,
    transport: Box<dyn Transport>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, transport: Box<dyn Transport>) -> Self {
        Self {
            base_url: config.base_url.clone(),
            default_headers: config.default_headers(),
            default_query: config.kwargs.query.clone(),
            transport,
        }
    }

    /// Client over a real [`HttpTransport`] using the configured timeout.
    pub fn with_http(config: &ClientConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs());
        Self::new(config, Box::new(HttpTransport::new(timeout)))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The session headers a fresh chain starts with.
    pub fn default_headers(&self) -> Headers {
        self.default_headers.clone()
    }

    /// Build the concrete request for `call` under `session` headers.
    ///
    /// An object payload on a bodiless verb becomes query parameters.
    pub fn resolve(&self, session: &Headers, call: &Call) -> ResolvedRequest {
        let mut headers = if call.requires_auth {
            session.clone()
        } else {
            Headers::new()
        };
        overlay_headers(&mut headers, &call.options.headers);

        if let Some(cookie) = cookie_header(&call.options.cookies) {
            overlay_headers(&mut headers, &Headers::from([("Cookie".to_owned(), cookie)]));
        }

        let mut query = self.default_query.clone();
        query.extend(call.query.clone());

        let body = match &call.payload {
            Some(payload) if call.method.has_body() => {
                Some(request::RequestBody::from_payload(payload, call.payload_type))
            }
            Some(Value::Object(fields)) => {
                query.extend(fields.iter().map(|(k, v)| (k.clone(), render(v))));
                None
            }
            _ => None,
        };

        if let Some(content_type) = body.as_ref().and_then(RequestBody::content_type)
            && !headers.keys().any(|k| k.eq_ignore_ascii_case("content-type"))
        {
            headers.insert("Content-Type".to_owned(), content_type.to_owned());
        }

        let url = append_query(&join_url(&self.base_url, &call.path), &query);

        ResolvedRequest {
            method: call.method,
            url,
            headers,
            body,
        }
    }

    /// Resolve and execute `call`.
    ///
    /// # Errors
    ///
    /// Propagates the transport's [`TransportError`].
    pub fn send(&self, session: &Headers, call: &Call) -> Result<ApiResponse, TransportError> {
        let request = self.resolve(session, call);
        tracing::debug!(method = %request.method, url = %request.url, "sending request");
        self.transport.execute(&request)
    }

    /// `GET path` with query parameters.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::send`].
    pub fn get(
        &self,
        session: &Headers,
        path: &str,
        query: BTreeMap<String, String>,
        requires_auth: bool,
        options: RequestOptions,
    ) -> Result<ApiResponse, TransportError> {
        let call = Call {
            query,
            requires_auth,
            options,
            ..Call::new(Method::Get, path)
        };
        self.send(session, &call)
    }

    /// `DELETE path` with query parameters.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::send`].
    pub fn delete(
        &self,
        session: &Headers,
        path: &str,
        query: BTreeMap<String, String>,
        requires_auth: bool,
        options: RequestOptions,
    ) -> Result<ApiResponse, TransportError> {
        let call = Call {
            query,
            requires_auth,
            options,
            ..Call::new(Method::Delete, path)
        };
        self.send(session, &call)
    }

    /// `POST path` with a body.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::send`].
    pub fn post(
        &self,
        session: &Headers,
        path: &str,
        data: Option<Value>,
        payload_type: PayloadType,
        requires_auth: bool,
        options: RequestOptions,
    ) -> Result<ApiResponse, TransportError> {
        self.with_body(Method::Post, session, path, data, payload_type, requires_auth, options)
    }

    /// `PUT path` with a body.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::send`].
    pub fn put(
        &self,
        session: &Headers,
        path: &str,
        data: Option<Value>,
        payload_type: PayloadType,
        requires_auth: bool,
        options: RequestOptions,
    ) -> Result<ApiResponse, TransportError> {
        self.with_body(Method::Put, session, path, data, payload_type, requires_auth, options)
    }

    /// `PATCH path` with a body.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::send`].
    pub fn patch(
        &self,
        session: &Headers,
        path: &str,
        data: Option<Value>,
        payload_type: PayloadType,
        requires_auth: bool,
        options: RequestOptions,
    ) -> Result<ApiResponse, TransportError> {
        self.with_body(Method::Patch, session, path, data, payload_type, requires_auth, options)
    }

    #[allow(clippy::too_many_arguments)]
    fn with_body(
        &self,
        method: Method,
        session: &Headers,
        path: &str,
        data: Option<Value>,
        payload_type: PayloadType,
        requires_auth: bool,
        options: RequestOptions,
    ) -> Result<ApiResponse, TransportError> {
        let call = Call {
            payload: data,
            payload_type,
            requires_auth,
            options,
            ..Call::new(method, path)
        };
        self.send(session, &call)
    }
}
