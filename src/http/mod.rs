//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, body limit)
//!     → request.rs (request ID, decode payload)
//!     → [dispatcher runs decorators, middleware, handler]
//!     → response.rs (status, headers, body)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{Payload, Request, RequestId, RequestIdLayer, X_REQUEST_ID};
pub use response::Reply;
pub use server::{AppState, HttpServer, ServerHandle};
