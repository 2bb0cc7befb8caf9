//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → split_path (normalize segments)
//!     → router.rs (function routes mounted over the path, longest first)
//!     → router.rs (ordinary routes, most specific first)
//!     → matcher.rs (literal and `:param` segments)
//!     → Return: RouteMatch or no match
//!
//! Route Compilation (at registration):
//!     url string
//!     → Pattern::compile (reject bad params)
//!     → joined with every ancestor prefix when the app is frozen
//! ```
//!
//! # Design Decisions
//! - Routes compiled at registration, immutable at runtime
//! - No regex in hot path (segment comparison only)
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod router;

pub use matcher::{split_path, MatchMode, Params, PathMatch, Pattern, Segment};
pub use router::{handler, HandlerFn, Route, RouteId, RouteKind, RouteMatch, RouteTable, ScopeId};
