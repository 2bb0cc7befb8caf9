//! Parsed request handed to the dispatcher.
//!
//! # Responsibilities
//! - Carry method, URI, headers, raw body and decoded payload
//! - Decode JSON payloads when the content type says so
//! - Stamp a request ID on every request as early as possible
//!
//! # Design Decisions
//! - Request ID added by a tower layer so tracing sees it too
//! - An incoming `x-request-id` is preserved, never replaced
//! - Invalid JSON falls back to text instead of failing the request

use std::task::{Context, Poll};

use axum::body::Bytes;
use axum::http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, Method, Uri};
use serde::Serialize;
use serde_json::Value;
use tower::{Layer, Service};
use uuid::Uuid;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Unique identifier for a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a new UUID v4 request ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decoded request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    /// No body.
    Empty,
    /// Body declared as JSON and parsed successfully.
    Json(Value),
    /// UTF-8 body.
    Text(String),
    /// Anything else.
    Binary(Vec<u8>),
}

impl Payload {
    /// Decode `body` according to its content type.
    pub fn parse(content_type: Option<&str>, body: &[u8]) -> Self {
        if body.is_empty() {
            return Payload::Empty;
        }

        if content_type.is_some_and(is_json_media_type) {
            if let Ok(value) = serde_json::from_slice(body) {
                return Payload::Json(value);
            }
        }

        match std::str::from_utf8(body) {
            Ok(text) => Payload::Text(text.to_string()),
            Err(_) => Payload::Binary(body.to_vec()),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }
}

fn is_json_media_type(content_type: &str) -> bool {
    let media = content_type.split(';').next().unwrap_or_default().trim();
    media.eq_ignore_ascii_case("application/json") || media.ends_with("+json")
}

/// A request as seen by the routing core.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    payload: Payload,
}

impl Request {
    /// Create a body-less request.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            payload: Payload::Empty,
        }
    }

    /// Build from HTTP request parts and a collected body.
    pub fn from_parts(parts: Parts, body: Bytes) -> Self {
        let mut request = Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body: Bytes::new(),
            payload: Payload::Empty,
        };
        request.set_body(body);
        request
    }

    /// Add a header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self.set_body(self.body.clone());
        self
    }

    /// Replace the body, re-decoding the payload.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.set_body(body.into());
        self
    }

    fn set_body(&mut self, body: Bytes) {
        let content_type = self
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        self.payload = Payload::parse(content_type, &body);
        self.body = body;
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// The `x-request-id` header, if present and valid UTF-8.
    pub fn request_id(&self) -> Option<&str> {
        self.headers.get(X_REQUEST_ID).and_then(|v| v.to_str().ok())
    }
}

/// Tower layer that stamps `x-request-id` on requests lacking one.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdLayer;

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdService { inner }
    }
}

/// Service produced by [`RequestIdLayer`].
#[derive(Debug, Clone)]
pub struct RequestIdService<S> {
    inner: S,
}

impl<S, B> Service<axum::http::Request<B>> for RequestIdService<S>
where
    S: Service<axum::http::Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: axum::http::Request<B>) -> Self::Future {
        if !req.headers().contains_key(X_REQUEST_ID) {
            let id = RequestId::new();
            if let Ok(value) = HeaderValue::from_str(id.as_str()) {
                req.headers_mut().insert(X_REQUEST_ID, value);
            }
        }
        self.inner.call(req)
    }
}
