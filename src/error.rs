//! Error taxonomy for registration and dispatch.
//!
//! Registration-time variants abort startup. Dispatch-time variants are always
//! resolved into an HTTP response by the dispatcher, never dropped.

use std::time::Duration;

use axum::http::{Method, StatusCode};
use thiserror::Error;

/// Errors produced while registering routes or dispatching requests.
#[derive(Debug, Error)]
pub enum RouteError {
    /// Route pattern could not be compiled.
    #[error("Invalid route pattern `{pattern}`: {reason}")]
    PatternCompile { pattern: String, reason: &'static str },

    /// HTTP method string could not be parsed.
    #[error("Invalid HTTP method `{0}`")]
    InvalidMethod(String),

    /// No route matched and no not-found handler is installed.
    #[error("No route for {method} {path}")]
    NotFound { method: Method, path: String },

    /// A response was already sent for this request.
    #[error("Response already sent")]
    DoubleResponse,

    /// Middleware returned without continuing the chain or responding.
    #[error("Middleware #{index} returned without continuing or responding")]
    MiddlewareStall { index: usize },

    /// Handler returned without responding or forwarding.
    #[error("Handler for `{route}` returned without responding")]
    Unanswered { route: String },

    /// The response deadline expired.
    #[error("No response within {0:?}")]
    Timeout(Duration),

    /// Request body exceeds the configured limit.
    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// Response body could not be encoded.
    #[error("Failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),

    /// Handler-defined failure with an explicit status.
    #[error("{message}")]
    Custom { status: StatusCode, message: String },
}

impl RouteError {
    /// Build a handler-defined error.
    pub fn custom(status: StatusCode, message: impl Into<String>) -> Self {
        RouteError::Custom {
            status,
            message: message.into(),
        }
    }

    /// HTTP status this error resolves to.
    pub fn status(&self) -> StatusCode {
        match self {
            RouteError::NotFound { .. } => StatusCode::NOT_FOUND,
            RouteError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            RouteError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            RouteError::Custom { status, .. } => *status,
            RouteError::PatternCompile { .. }
            | RouteError::InvalidMethod(_)
            | RouteError::DoubleResponse
            | RouteError::MiddlewareStall { .. }
            | RouteError::Unanswered { .. }
            | RouteError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Result type for routing operations.
pub type RouteResult<T> = Result<T, RouteError>;
