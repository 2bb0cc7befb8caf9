//! HTTP routing and middleware engine with plugin composition.

pub mod app;
pub mod config;
pub mod demo;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod middleware;
pub mod observability;
pub mod resilience;
pub mod routing;

pub use app::{Application, Attachments, Controller};
pub use config::ServerConfig;
pub use dispatch::{Dispatcher, RequestContext};
pub use error::{RouteError, RouteResult};
pub use http::{HttpServer, Reply, Request, ServerHandle};
pub use lifecycle::Shutdown;
pub use middleware::{middleware, Next};
pub use routing::handler;
