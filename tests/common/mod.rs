//! Shared utilities for integration tests.

#![allow(dead_code)]

use axum::http::{Method, Uri};
use plugin_router::config::ServerConfig;
use plugin_router::{Application, Dispatcher, HttpServer, Reply, Request, ServerHandle};

/// Serve `app` on an ephemeral local port.
pub async fn start_server(app: Application) -> ServerHandle {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    start_server_with(config, app).await
}

/// Serve `app` with a custom configuration.
pub async fn start_server_with(config: ServerConfig, app: Application) -> ServerHandle {
    HttpServer::new(config, app)
        .unwrap()
        .listen()
        .await
        .unwrap()
}

/// Base URL of a running server.
pub fn url(handle: &ServerHandle, path: &str) -> String {
    format!("http://{}{}", handle.local_addr(), path)
}

/// Dispatch a body-less request straight through `dispatcher`.
pub async fn call(dispatcher: &Dispatcher, method: Method, path: &str) -> Reply {
    let uri: Uri = path.parse().unwrap();
    dispatcher.dispatch(Request::new(method, uri)).await
}

/// Dispatch a GET and return the body text.
pub async fn get_text(dispatcher: &Dispatcher, path: &str) -> String {
    call(dispatcher, Method::GET, path).await.body_text()
}
