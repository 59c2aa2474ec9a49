//! Scripted transport for deterministic tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::client::request::ResolvedRequest;
use crate::client::response::ApiResponse;
use crate::client::{Transport, TransportError};

/// Transport that answers with pre-scripted responses, in order, and
/// records every request it receives.
///
/// Clones share state, so a test can hand one clone to an
/// [`ApiClient`](crate::client::ApiClient) and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

#[derive(Debug, Default)]
struct ScriptState {
    responses: VecDeque<Result<ApiResponse, String>>,
    requests: Vec<ResolvedRequest>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<ApiResponse>) -> Self {
        let transport = Self::default();
        for response in responses {
            transport.push(response);
        }
        transport
    }

    /// Queue a response.
    pub fn push(&self, response: ApiResponse) {
        self.lock().responses.push_back(Ok(response));
    }

    /// Queue a transport failure.
    pub fn push_error(&self, message: impl Into<String>) {
        self.lock().responses.push_back(Err(message.into()));
    }

    /// Every request executed so far.
    pub fn requests(&self) -> Vec<ResolvedRequest> {
        self.lock().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    /// Responses still queued.
    pub fn remaining(&self) -> usize {
        self.lock().responses.len()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, request: &ResolvedRequest) -> Result<ApiResponse, TransportError> {
        let mut state = self.lock();
        state.requests.push(request.clone());
        match state.responses.pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(TransportError::Request {
                method: request.method,
                url: request.url.clone(),
                message,
            }),
            None => Err(TransportError::Request {
                method: request.method,
                url: request.url.clone(),
                message: "no scripted response left".to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Method;
    use crate::config::Headers;

    fn request(url: &str) -> ResolvedRequest {
        ResolvedRequest {
            method: Method::Get,
            url: url.into(),
            headers: Headers::new(),
            body: None,
        }
    }

    #[test]
    fn answers_in_order_and_records_requests() {
        let transport = ScriptedTransport::new(vec![ApiResponse::new(200), ApiResponse::new(404)]);
        assert_eq!(transport.execute(&request("/a")).unwrap().status, 200);
        assert_eq!(transport.execute(&request("/b")).unwrap().status, 404);

        let urls: Vec<String> = transport.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(urls, ["/a", "/b"]);
        assert_eq!(transport.remaining(), 0);
    }

    #[test]
    fn exhausted_script_is_an_error() {
        let transport = ScriptedTransport::default();
        let err = transport.execute(&request("/a")).unwrap_err();
        assert!(err.to_string().contains("no scripted response left"));
        assert_eq!(transport.request_count(), 1);
    }

    #[test]
    fn clones_share_state() {
        let transport = ScriptedTransport::default();
        let handle = transport.clone();
        transport.push_error("connection refused");
        let err = handle.execute(&request("/a")).unwrap_err();
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(transport.request_count(), 1);
    }
}
