//! Response produced by handlers and middleware.
//!
//! # Responsibilities
//! - Hold status, headers and body of the single response per request
//! - Encode text and JSON bodies with the matching content type
//! - Map dispatch errors to HTTP status codes
//!
//! # Design Decisions
//! - Bodies are fully buffered; streaming is out of scope
//! - Error replies carry the error's display text as plain text

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::{RouteError, RouteResult};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const APPLICATION_JSON: &str = "application/json";

/// A finalized response.
#[derive(Debug, Clone)]
pub struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Reply {
    /// Empty response with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// `200 OK` with a plain-text body.
    pub fn text(body: impl Into<String>) -> Self {
        Self::new(StatusCode::OK)
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN))
            .with_body(body.into())
    }

    /// `200 OK` with `value` encoded as JSON.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> RouteResult<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::new(StatusCode::OK)
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON))
            .with_body(body))
    }

    /// Reply describing a dispatch error.
    pub fn from_error(err: &RouteError) -> Self {
        let mut reply = Self::text(err.to_string());
        reply.status = err.status();
        reply
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body decoded as UTF-8, lossily.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
