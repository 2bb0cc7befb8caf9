//! Application composition.
//!
//! # Data Flow
//! ```text
//! Application::new()
//!     → route / function / use_middleware / decorate (root)
//!     → register_at(prefix, builder) → child Application (isolated)
//!     → controller(c) → child Application from an action table
//!     → into_dispatcher() → flattened, immutable Dispatcher
//! ```

pub mod application;
pub mod controller;
pub mod decorators;

pub use application::Application;
pub use controller::{Action, ActionFn, Controller};
pub use decorators::{Attachments, DecoratorRegistry, RequestDecoratorFn};
