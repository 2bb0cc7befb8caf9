//! Request dispatch.
//!
//! # Data Flow
//! ```text
//! Request
//!     → dispatcher.rs (route lookup, scope of the owning application)
//!     → request decorators (root first)
//!     → middleware chain (root first, registration order)
//!     → handler (may forward to the next ordinary candidate)
//!     → context.rs (resolve outcome into a single Reply)
//! ```

pub mod context;
pub mod dispatcher;

pub use context::RequestContext;
pub use dispatcher::Dispatcher;
