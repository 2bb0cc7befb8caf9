//! Middleware pipeline.
//!
//! # Data Flow
//! ```text
//! RequestContext (route bound, decorators applied)
//!     → chain.rs (select entries by scope, in registration order)
//!     → entry 0 → next.run → entry 1 → ... → endpoint (route handler)
//!     → unwinds back through code after each next.run
//! ```

pub mod chain;

pub use chain::{middleware, Endpoint, MiddlewareChain, MiddlewareEntry, MiddlewareFn, Next};
