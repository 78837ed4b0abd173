//! HTTP Transport
//!
//! The terminal pipeline stage: sends a request over the network.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

use crate::core::http::{HttpHeaders, HttpMethod, HttpRequest, HttpResponse, ResponseBody};
use crate::error::{ConfigurationError, PipelineError, PipelineResult, TransportError};

/// HTTP transport interface (for dependency injection).
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send an HTTP request.
    async fn send(&self, request: &HttpRequest) -> PipelineResult<HttpResponse>;
}

/// Default transport timeout.
pub const DEFAULT_TRANSPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// reqwest-based HTTP transport.
pub struct ReqwestHttpTransport {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl ReqwestHttpTransport {
    /// Create new transport with default settings.
    pub fn new() -> PipelineResult<Self> {
        Self::with_timeout(DEFAULT_TRANSPORT_TIMEOUT)
    }

    /// Create transport with a custom default timeout.
    pub fn with_timeout(timeout: Duration) -> PipelineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigurationError::InvalidValue {
                field: "transport".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            default_timeout: timeout,
        })
    }

    fn map_error(error: reqwest::Error, timeout: Duration) -> PipelineError {
        let error = if error.is_timeout() {
            TransportError::Timeout { timeout }
        } else if error.is_builder() {
            TransportError::Request {
                message: error.to_string(),
            }
        } else {
            TransportError::ConnectionFailed {
                message: error.to_string(),
            }
        };
        error.into()
    }
}

fn reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

/// Copy reqwest headers, keeping values that are not valid UTF-8 in lossy form.
fn convert_headers(source: &reqwest::header::HeaderMap) -> HttpHeaders {
    let mut headers = HttpHeaders::new();
    for (name, value) in source {
        headers.add(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
    }
    headers
}

#[async_trait]
impl HttpTransport for ReqwestHttpTransport {
    async fn send(&self, request: &HttpRequest) -> PipelineResult<HttpResponse> {
        let timeout = request.timeout.unwrap_or(self.default_timeout);

        let mut req_builder = self
            .client
            .request(reqwest_method(request.method), request.url.clone())
            .timeout(timeout);

        for (name, value) in request.headers.iter() {
            req_builder = req_builder.header(name, value);
        }

        if let Some(body) = &request.body {
            req_builder = req_builder.body(body.clone());
        }

        let response = req_builder
            .send()
            .await
            .map_err(|e| Self::map_error(e, timeout))?;

        let status = response.status().as_u16();

        let headers = convert_headers(response.headers());

        let body = response
            .bytes_stream()
            .map(|chunk| {
                chunk.map_err(|e| {
                    PipelineError::from(TransportError::Body {
                        message: e.to_string(),
                    })
                })
            })
            .boxed();

        Ok(HttpResponse::new(status, headers, ResponseBody::Stream(body)))
    }
}

/// Canned response for [`MockHttpTransport`].
#[derive(Clone, Debug)]
pub struct MockResponse {
    pub status: u16,
    pub headers: HttpHeaders,
    pub body: Bytes,
}

impl MockResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HttpHeaders::new(),
            body: Bytes::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// JSON body with a matching content type.
    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self::new(status)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
    }

    pub(crate) fn into_response(self) -> HttpResponse {
        HttpResponse::buffered(self.status, self.headers, self.body)
    }
}

enum MockReply {
    Response(MockResponse),
    Error(TransportError),
}

/// Mock HTTP transport for testing. Replies are served in the order queued.
#[derive(Default)]
pub struct MockHttpTransport {
    replies: Mutex<VecDeque<MockReply>>,
    request_history: Mutex<Vec<HttpRequest>>,
    default_response: Mutex<Option<MockResponse>>,
}

impl MockHttpTransport {
    /// Create new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response to return.
    pub fn queue_response(&self, response: MockResponse) -> &Self {
        self.replies.lock().push_back(MockReply::Response(response));
        self
    }

    /// Queue a transport failure.
    pub fn queue_error(&self, error: TransportError) -> &Self {
        self.replies.lock().push_back(MockReply::Error(error));
        self
    }

    /// Set default response when queue is empty.
    pub fn set_default_response(&self, response: MockResponse) -> &Self {
        *self.default_response.lock() = Some(response);
        self
    }

    /// Get request history.
    pub fn get_requests(&self) -> Vec<HttpRequest> {
        self.request_history.lock().clone()
    }

    /// Get last request.
    pub fn get_last_request(&self) -> Option<HttpRequest> {
        self.request_history.lock().last().cloned()
    }

    pub fn request_count(&self) -> usize {
        self.request_history.lock().len()
    }
}

#[async_trait]
impl HttpTransport for MockHttpTransport {
    async fn send(&self, request: &HttpRequest) -> PipelineResult<HttpResponse> {
        self.request_history.lock().push(request.clone());

        let reply = self.replies.lock().pop_front().or_else(|| {
            self.default_response
                .lock()
                .clone()
                .map(MockReply::Response)
        });

        match reply {
            Some(MockReply::Response(response)) => Ok(response.into_response()),
            Some(MockReply::Error(error)) => Err(error.into()),
            None => Err(TransportError::ConnectionFailed {
                message: "No mock response available".to_string(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_transport() {
        let transport = MockHttpTransport::new();
        transport.queue_response(MockResponse::json(200, &serde_json::json!({"key": "value"})));

        let request = HttpRequest::parse(HttpMethod::Get, "https://example.com").unwrap();

        let mut response = transport.send(&request).await.unwrap();
        assert_eq!(response.status(), 200);
        assert!(response.text().await.unwrap().contains("value"));

        let history = transport.get_requests();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].url.as_str(), "https://example.com/");
    }

    #[tokio::test]
    async fn test_mock_transport_replies_in_order() {
        let transport = MockHttpTransport::new();
        transport
            .queue_response(MockResponse::new(503))
            .queue_error(TransportError::ConnectionFailed {
                message: "reset".to_string(),
            })
            .queue_response(MockResponse::ok());

        let request = HttpRequest::parse(HttpMethod::Get, "https://example.com").unwrap();
        assert_eq!(transport.send(&request).await.unwrap().status(), 503);
        assert!(transport.send(&request).await.is_err());
        assert_eq!(transport.send(&request).await.unwrap().status(), 200);
        assert!(transport.send(&request).await.is_err());
        assert_eq!(transport.request_count(), 4);
    }

    #[tokio::test]
    async fn test_mock_default_response() {
        let transport = MockHttpTransport::new();
        transport.set_default_response(MockResponse::new(204));

        let request = HttpRequest::parse(HttpMethod::Delete, "https://example.com/x").unwrap();
        assert_eq!(transport.send(&request).await.unwrap().status(), 204);
        assert_eq!(transport.send(&request).await.unwrap().status(), 204);
    }

    #[test]
    fn test_convert_headers_keeps_non_utf8_values() {
        use reqwest::header::{HeaderMap, HeaderValue};

        let mut source = HeaderMap::new();
        source.insert("x-ms-request-id", HeaderValue::from_static("abc"));
        source.insert("x-file-name", HeaderValue::from_bytes(b"caf\xe9").unwrap());
        source.append("vary", HeaderValue::from_static("accept"));
        source.append("vary", HeaderValue::from_static("origin"));

        let headers = convert_headers(&source);
        assert_eq!(headers.get("x-ms-request-id"), Some("abc"));
        assert_eq!(headers.get("x-file-name"), Some("caf\u{fffd}"));
        assert_eq!(headers.get_values("vary"), vec!["accept", "origin"]);
    }
}
