//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatch of one request:
//!     → timeouts.rs (bound the whole decorator/middleware/handler pipeline)
//!     → On expiry: pipeline dropped, 504 Gateway Timeout
//! ```
//!
//! # Design Decisions
//! - Every request has a deadline; a hung middleware cannot hold a connection forever
//! - No retries: handlers are not assumed idempotent

pub mod timeouts;
