//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router that hands every request to the dispatcher
//! - Wire up middleware (tracing, request ID)
//! - Enforce the request body limit
//! - Bind server to listener and shut it down gracefully

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Request as HttpRequest, State},
    http::HeaderName,
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::app::Application;
use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::error::{RouteError, RouteResult};
use crate::http::request::{Request, RequestIdLayer, X_REQUEST_ID};
use crate::http::response::Reply;
use crate::lifecycle::shutdown::{recv_shutdown, Shutdown};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub max_body_size: usize,
}

/// HTTP front end for a frozen application.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
}

impl HttpServer {
    /// Freeze `app` and build the server around it.
    pub fn new(config: ServerConfig, app: Application) -> RouteResult<Self> {
        let dispatcher = Arc::new(
            app.into_dispatcher()?
                .with_deadline(config.timeouts.request()),
        );

        let state = AppState {
            dispatcher: Arc::clone(&dispatcher),
            max_body_size: config.limits.max_body_size,
        };

        let router = Self::build_router(state);
        Ok(Self {
            router,
            config,
            dispatcher,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .fallback(dispatch_handler)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(RequestIdLayer)
    }

    /// Run the server on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.dispatcher.routes().len(),
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(recv_shutdown(shutdown))
            .await?;

        tracing::info!(address = %addr, "HTTP server stopped");
        Ok(())
    }

    /// Bind the configured address and serve in the background.
    pub async fn listen(self) -> Result<ServerHandle, std::io::Error> {
        let listener = TcpListener::bind(&self.config.listener.bind_address).await?;
        self.listen_on(listener)
    }

    /// Serve on an already bound listener in the background.
    pub fn listen_on(self, listener: TcpListener) -> Result<ServerHandle, std::io::Error> {
        let local_addr = listener.local_addr()?;
        let shutdown = Shutdown::new();
        let task = tokio::spawn(self.run(listener, shutdown.subscribe()));

        tracing::info!(address = %local_addr, "Listening for connections");
        Ok(ServerHandle {
            local_addr,
            shutdown,
            task: Some(task),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}

/// A server running in the background.
///
/// Dropping the handle stops the server without waiting for it.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Shutdown,
    task: Option<JoinHandle<Result<(), std::io::Error>>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, let in-flight requests finish, and wait for exit.
    pub async fn close(mut self) -> Result<(), std::io::Error> {
        self.shutdown.trigger();
        match self.task.take() {
            Some(task) => task.await.map_err(std::io::Error::other)?,
            None => Ok(()),
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.shutdown.trigger();
        }
    }
}

/// Hand every request to the dispatcher.
async fn dispatch_handler(State(state): State<AppState>, request: HttpRequest) -> Response {
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let err = RouteError::PayloadTooLarge {
                limit: state.max_body_size,
            };
            tracing::warn!(
                method = %parts.method,
                path = %parts.uri.path(),
                error = %e,
                "Rejected request body"
            );
            let mut reply = Reply::from_error(&err);
            if let Some(id) = parts.headers.get(X_REQUEST_ID) {
                reply = reply.with_header(HeaderName::from_static(X_REQUEST_ID), id.clone());
            }
            return reply.into_response();
        }
    };

    let request = Request::from_parts(parts, body);
    state.dispatcher.dispatch(request).await.into_response()
}
