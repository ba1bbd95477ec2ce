//! HTTP backend abstraction.
//!
//! Clients describe calls as [`ApiRequest`] values and hand them to an
//! [`HttpBackend`]. Production uses [`ReqwestBackend`]; tests script
//! responses with `testing::FakeBackend`. Retry is layered on top by the
//! clients, so a fake sees every attempt.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use infergate_core::redact;
use serde_json::Value;
use url::Url;

use crate::error::{ProviderError, ProviderResult};

/// Raw body chunks of a streaming response.
pub type ByteStream = Pin<Box<dyn Stream<Item = ProviderResult<Bytes>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One outbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub const fn get(url: Url) -> Self {
        Self {
            method: Method::Get,
            url,
            body: None,
        }
    }

    pub const fn post(url: Url, body: Value) -> Self {
        Self {
            method: Method::Post,
            url,
            body: Some(body),
        }
    }

    /// POST without a body.
    pub const fn post_empty(url: Url) -> Self {
        Self {
            method: Method::Post,
            url,
            body: None,
        }
    }
}

// ============================================================================
// HTTP Backend Trait
// ============================================================================

/// Transport for provider calls.
///
/// Implementations map non-2xx responses to [`ProviderError::Status`] and
/// never retry on their own.
#[async_trait]
pub trait HttpBackend: Send + Sync {
    /// Send a request and decode the JSON body.
    async fn send_json(&self, request: &ApiRequest) -> ProviderResult<Value>;

    /// Send a request and return the body as a byte stream.
    async fn send_stream(&self, request: &ApiRequest) -> ProviderResult<ByteStream>;
}

// ============================================================================
// Reqwest Backend
// ============================================================================

/// Production backend using reqwest.
pub struct ReqwestBackend {
    client: reqwest::Client,
    request_timeout: Duration,
    auth_token: Option<String>,
}

impl std::fmt::Debug for ReqwestBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestBackend")
            .field("request_timeout", &self.request_timeout)
            .field("authenticated", &self.auth_token.is_some())
            .finish_non_exhaustive()
    }
}

impl ReqwestBackend {
    /// `request_timeout` bounds each non-streaming call.
    pub fn new(
        user_agent: &str,
        request_timeout: Duration,
        auth_token: Option<String>,
    ) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ProviderError::Client(e.to_string()))?;

        Ok(Self {
            client,
            request_timeout,
            auth_token,
        })
    }

    fn build_request(&self, request: &ApiRequest) -> reqwest::RequestBuilder {
        let mut builder = match request.method {
            Method::Get => self.client.get(request.url.as_str()),
            Method::Post => self.client.post(request.url.as_str()),
        };
        if let Some(ref token) = self.auth_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        builder
    }

    /// Turn a non-2xx response into a status error with a redacted body.
    async fn check_status(url: &Url, response: reqwest::Response) -> ProviderResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = upstream_message(&body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        });
        Err(ProviderError::Status {
            status: status.as_u16(),
            url: url.to_string(),
            message: redact(&message),
        })
    }
}

/// Pull a human-readable message out of an error body.
fn upstream_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    let Ok(json) = serde_json::from_str::<Value>(trimmed) else {
        return Some(trimmed.to_string());
    };
    ["detail", "error", "message", "title"]
        .iter()
        .find_map(|field| match json.get(field)? {
            Value::String(s) => Some(s.clone()),
            Value::Object(inner) => inner
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .or_else(|| Some(trimmed.to_string()))
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn send_json(&self, request: &ApiRequest) -> ProviderResult<Value> {
        let response = self
            .build_request(request)
            .timeout(self.request_timeout)
            .send()
            .await?;
        let response = Self::check_status(&request.url, response).await?;
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn send_stream(&self, request: &ApiRequest) -> ProviderResult<ByteStream> {
        let response = self.build_request(request).send().await?;
        let response = Self::check_status(&request.url, response).await?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ProviderError::from))
            .boxed())
    }
}

// ============================================================================
// Fake Backend for Testing
// ============================================================================

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Canned response for the fake backend.
    #[derive(Debug, Clone)]
    pub enum CannedResponse {
        Json(Value),
        Status(u16, String),
        Network(String),
        /// Body chunks for `send_stream`.
        Stream(Vec<String>),
    }

    struct Route {
        method: Method,
        path_suffix: String,
        responses: VecDeque<CannedResponse>,
    }

    /// A fake HTTP backend with scripted per-route responses.
    ///
    /// Responses for a route are consumed in order; the last one repeats.
    #[derive(Default)]
    pub struct FakeBackend {
        routes: Mutex<Vec<Route>>,
        calls: Mutex<Vec<ApiRequest>>,
    }

    impl FakeBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a response for requests whose path ends with `path_suffix`.
        pub fn with_response(self, method: Method, path_suffix: &str, response: CannedResponse) -> Self {
            {
                let mut routes = self.routes.lock().unwrap();
                if let Some(route) = routes
                    .iter_mut()
                    .find(|r| r.method == method && r.path_suffix == path_suffix)
                {
                    route.responses.push_back(response);
                } else {
                    routes.push(Route {
                        method,
                        path_suffix: path_suffix.to_string(),
                        responses: VecDeque::from([response]),
                    });
                }
            }
            self
        }

        pub fn calls(&self) -> Vec<ApiRequest> {
            self.calls.lock().unwrap().clone()
        }

        /// Number of calls whose path ends with `path_suffix`.
        pub fn call_count(&self, method: Method, path_suffix: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|call| call.method == method && call.url.path().ends_with(path_suffix))
                .count()
        }

        fn next_response(&self, request: &ApiRequest) -> CannedResponse {
            self.calls.lock().unwrap().push(request.clone());
            let mut routes = self.routes.lock().unwrap();
            let route = routes.iter_mut().find(|r| {
                r.method == request.method && request.url.path().ends_with(&r.path_suffix)
            });
            match route {
                Some(route) if route.responses.len() > 1 => {
                    route.responses.pop_front().unwrap()
                }
                Some(route) => route.responses.front().cloned().unwrap(),
                None => CannedResponse::Status(404, format!("no route for {}", request.url.path())),
            }
        }

        fn fail(request: &ApiRequest, response: CannedResponse) -> ProviderError {
            match response {
                CannedResponse::Status(status, message) => ProviderError::Status {
                    status,
                    url: request.url.to_string(),
                    message,
                },
                CannedResponse::Network(message) => ProviderError::Network(message),
                other => ProviderError::Decode(format!("unexpected canned response {other:?}")),
            }
        }
    }

    #[async_trait]
    impl HttpBackend for FakeBackend {
        async fn send_json(&self, request: &ApiRequest) -> ProviderResult<Value> {
            match self.next_response(request) {
                CannedResponse::Json(json) => Ok(json),
                other => Err(Self::fail(request, other)),
            }
        }

        async fn send_stream(&self, request: &ApiRequest) -> ProviderResult<ByteStream> {
            match self.next_response(request) {
                CannedResponse::Stream(chunks) => Ok(futures_util::stream::iter(
                    chunks.into_iter().map(|c| Ok(Bytes::from(c))),
                )
                .boxed()),
                other => Err(Self::fail(request, other)),
            }
        }
    }
}
