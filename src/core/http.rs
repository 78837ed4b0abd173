//! HTTP Model
//!
//! Request, response and header types that flow through the pipeline.

use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::core::serializer::{JsonSerializer, Serializer};
use crate::error::{
    ConfigurationError, PipelineError, PipelineResult, SerializationError, TransportError,
};

/// HTTP method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Whether repeating the request has no additional side effects.
    pub fn is_idempotent(&self) -> bool {
        !matches!(self, Self::Post | Self::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single header: the name as first supplied and its concatenated value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpHeader {
    name: String,
    value: String,
}

impl HttpHeader {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// The value split on commas.
    pub fn values(&self) -> Vec<&str> {
        self.value.split(',').map(str::trim).collect()
    }
}

/// Header collection with case-insensitive lookup.
///
/// Each name maps to one concatenated value. [`HttpHeaders::add`] appends to
/// the existing value with a comma, so repeated values keep their order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpHeaders {
    entries: HashMap<String, HttpHeader>,
}

impl HttpHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, replacing any existing value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        self.entries.insert(
            name.to_ascii_lowercase(),
            HttpHeader {
                name,
                value: value.into(),
            },
        );
        self
    }

    /// Append a value to a header, creating it if absent.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        match self.entries.get_mut(&name.to_ascii_lowercase()) {
            Some(existing) => {
                existing.value.push(',');
                existing.value.push_str(&value);
            }
            None => {
                self.set(name, value);
            }
        }
        self
    }

    /// Builder-style [`HttpHeaders::set`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.header(name).map(HttpHeader::value)
    }

    pub fn get_values(&self, name: &str) -> Vec<&str> {
        self.header(name).map(HttpHeader::values).unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&HttpHeader> {
        self.entries.get(&name.to_ascii_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries
            .remove(&name.to_ascii_lowercase())
            .map(|h| h.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(name, value)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.values().map(|h| (h.name(), h.value()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HttpHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.add(name, value);
        }
        headers
    }
}

/// HTTP request definition.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Request URL.
    pub url: Url,
    /// Request headers.
    pub headers: HttpHeaders,
    /// Request body.
    pub body: Option<Bytes>,
    /// Per-request timeout, overriding the transport default.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HttpHeaders::new(),
            body: None,
            timeout: None,
        }
    }

    /// Parse `url` and build a request for it.
    pub fn parse(method: HttpMethod, url: &str) -> PipelineResult<Self> {
        let url = Url::parse(url).map_err(|_| ConfigurationError::InvalidUrl {
            url: url.to_string(),
        })?;
        Ok(Self::new(method, url))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Streaming response body.
pub type BodyStream = BoxStream<'static, PipelineResult<Bytes>>;

/// Response body, either still on the wire or buffered in memory.
///
/// A stream that fails while being read becomes `Failed`, and every later
/// read reports the same error.
pub enum ResponseBody {
    Empty,
    Buffered(Bytes),
    Stream(BodyStream),
    Failed(TransportError),
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Buffered(b) => write!(f, "Buffered({} bytes)", b.len()),
            Self::Stream(_) => f.write_str("Stream"),
            Self::Failed(e) => write!(f, "Failed({})", e),
        }
    }
}

/// HTTP response definition.
#[derive(Debug)]
pub struct HttpResponse {
    status: u16,
    headers: HttpHeaders,
    body: ResponseBody,
    request: Option<Arc<HttpRequest>>,
}

impl HttpResponse {
    pub fn new(status: u16, headers: HttpHeaders, body: ResponseBody) -> Self {
        Self {
            status,
            headers,
            body,
            request: None,
        }
    }

    /// Response with an in-memory body.
    pub fn buffered(status: u16, headers: HttpHeaders, body: impl Into<Bytes>) -> Self {
        Self::new(status, headers, ResponseBody::Buffered(body.into()))
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HttpHeaders {
        &mut self.headers
    }

    /// The request that produced this response, for diagnostics.
    pub fn request(&self) -> Option<&HttpRequest> {
        self.request.as_deref()
    }

    pub(crate) fn with_request(mut self, request: Arc<HttpRequest>) -> Self {
        self.request = Some(request);
        self
    }

    pub fn is_buffered(&self) -> bool {
        matches!(self.body, ResponseBody::Empty | ResponseBody::Buffered(_))
    }

    /// Read the whole body, buffering it so later calls return the same bytes.
    /// A read that fails keeps failing.
    pub async fn body_bytes(&mut self) -> PipelineResult<Bytes> {
        let bytes = match std::mem::replace(&mut self.body, ResponseBody::Empty) {
            ResponseBody::Empty => Bytes::new(),
            ResponseBody::Buffered(bytes) => bytes,
            ResponseBody::Failed(error) => {
                self.body = ResponseBody::Failed(error.clone());
                return Err(error.into());
            }
            ResponseBody::Stream(mut stream) => {
                let mut buffer = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    match chunk {
                        Ok(bytes) => buffer.extend_from_slice(&bytes),
                        Err(error) => {
                            let failure = match &error {
                                PipelineError::Transport(e) => e.clone(),
                                other => TransportError::Body {
                                    message: other.to_string(),
                                },
                            };
                            self.body = ResponseBody::Failed(failure);
                            return Err(error);
                        }
                    }
                }
                buffer.freeze()
            }
        };
        self.body = ResponseBody::Buffered(bytes.clone());
        Ok(bytes)
    }

    /// Read the body as UTF-8 text.
    pub async fn text(&mut self) -> PipelineResult<String> {
        let bytes = self.body_bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| {
            PipelineError::Serialization(SerializationError::Decode {
                message: e.to_string(),
            })
        })
    }

    /// Deserialize a JSON body.
    pub async fn json<T: DeserializeOwned>(&mut self) -> PipelineResult<T> {
        let bytes = self.body_bytes().await?;
        JsonSerializer.deserialize(&bytes)
    }

    /// Take the body, leaving the response empty.
    pub fn into_body(self) -> ResponseBody {
        self.body
    }
}
