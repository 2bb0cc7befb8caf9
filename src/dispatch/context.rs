//! Per-request state shared by decorators, middleware and handlers.

use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use serde::Serialize;

use crate::app::Attachments;
use crate::error::{RouteError, RouteResult};
use crate::http::{Payload, Reply, Request, RequestId, X_REQUEST_ID};
use crate::routing::Params;

/// Furthest pipeline step a request has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    Routing,
    Middleware(usize),
    Handler,
}

/// Mutable state for one request.
///
/// Created when the request arrives and consumed when the reply is produced.
/// The response slot is write-once: a second `send`/`json`/`respond` is
/// rejected with [`RouteError::DoubleResponse`] and the first reply is kept.
pub struct RequestContext {
    request: Request,
    request_id: String,
    params: Params,
    function_params: Vec<String>,
    matched_route: Option<String>,
    attachments: Attachments,
    decorations: Arc<Attachments>,
    response: Option<Reply>,
    forward_requested: bool,
    stage: Stage,
}

impl RequestContext {
    pub fn new(request: Request) -> Self {
        let request_id = request
            .request_id()
            .map(str::to_string)
            .unwrap_or_else(|| RequestId::new().to_string());

        Self {
            request,
            request_id,
            params: Params::new(),
            function_params: Vec::new(),
            matched_route: None,
            attachments: Attachments::new(),
            decorations: Arc::new(Attachments::new()),
            response: None,
            forward_requested: false,
            stage: Stage::Routing,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    pub fn uri(&self) -> &Uri {
        self.request.uri()
    }

    pub fn path(&self) -> &str {
        self.request.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.request.headers()
    }

    /// Header value as text, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.headers().get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        self.request.body()
    }

    pub fn payload(&self) -> &Payload {
        self.request.payload()
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Named path parameter bound by the matched route or a middleware scope.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Trailing segments captured by a function route.
    pub fn function_params(&self) -> &[String] {
        &self.function_params
    }

    /// Pattern of the route currently handling the request.
    pub fn matched_route(&self) -> Option<&str> {
        self.matched_route.as_deref()
    }

    /// Attach a value for later middleware and the handler.
    pub fn insert<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) {
        self.attachments.insert(key, value);
    }

    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        self.attachments.get(key)
    }

    pub fn get_arc<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        self.attachments.get_arc(key)
    }

    pub fn attachments(&self) -> &Attachments {
        &self.attachments
    }

    /// Instance decoration of the application that owns the matched route.
    pub fn decoration<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        self.decorations.get(key)
    }

    pub fn decorations(&self) -> &Attachments {
        &self.decorations
    }

    /// Send a `200 OK` plain-text response.
    pub fn send(&mut self, body: impl Into<String>) -> RouteResult<()> {
        self.respond(Reply::text(body))
    }

    /// Send a `200 OK` JSON response.
    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) -> RouteResult<()> {
        let reply = Reply::json(value)?;
        self.respond(reply)
    }

    /// Finalize the response.
    pub fn respond(&mut self, reply: Reply) -> RouteResult<()> {
        if self.response.is_some() {
            tracing::warn!(
                request_id = %self.request_id,
                path = %self.request.path(),
                "Rejected second response"
            );
            return Err(RouteError::DoubleResponse);
        }
        self.response = Some(reply);
        Ok(())
    }

    /// Decline the request so the dispatcher re-routes it through the
    /// ordinary routes that have not handled it yet.
    pub fn forward(&mut self) -> RouteResult<()> {
        if self.response.is_some() {
            return Err(RouteError::DoubleResponse);
        }
        self.forward_requested = true;
        Ok(())
    }

    pub fn is_finalized(&self) -> bool {
        self.response.is_some()
    }

    pub fn response(&self) -> Option<&Reply> {
        self.response.as_ref()
    }

    pub(crate) fn bind_route(&mut self, params: Params, function_params: Vec<String>, pattern: &str) {
        self.params = params;
        self.function_params = function_params;
        self.matched_route = Some(pattern.to_string());
    }

    /// Merge scope bindings without overriding route bindings.
    pub(crate) fn add_params(&mut self, params: Params) {
        self.params.fill_from(params);
    }

    pub(crate) fn set_decorations(&mut self, decorations: Arc<Attachments>) {
        self.decorations = decorations;
    }

    pub(crate) fn enter(&mut self, stage: Stage) {
        self.stage = stage;
    }

    #[cfg(test)]
    pub(crate) fn stage(&self) -> Stage {
        self.stage
    }

    pub(crate) fn take_forward(&mut self) -> bool {
        std::mem::take(&mut self.forward_requested)
    }

    /// Resolve the pipeline outcome into the reply sent to the client.
    pub(crate) fn into_reply(self, outcome: RouteResult<()>) -> Reply {
        let route = self
            .matched_route
            .unwrap_or_else(|| self.request.path().to_string());

        let reply = match (self.response, outcome) {
            (Some(reply), Ok(())) => reply,
            (Some(reply), Err(err)) => {
                tracing::error!(
                    request_id = %self.request_id,
                    route = %route,
                    error = %err,
                    "Error after response was sent"
                );
                reply
            }
            (None, Err(err)) => {
                match &err {
                    RouteError::NotFound { .. } => {
                        tracing::debug!(request_id = %self.request_id, error = %err, "Not found")
                    }
                    _ => tracing::error!(
                        request_id = %self.request_id,
                        route = %route,
                        error = %err,
                        "Request failed"
                    ),
                }
                Reply::from_error(&err)
            }
            (None, Ok(())) => {
                let err = match self.stage {
                    Stage::Middleware(index) => RouteError::MiddlewareStall { index },
                    Stage::Routing | Stage::Handler => RouteError::Unanswered { route },
                };
                tracing::warn!(request_id = %self.request_id, error = %err, "Request left unanswered");
                Reply::from_error(&err)
            }
        };

        match HeaderValue::from_str(&self.request_id) {
            Ok(value) => reply.with_header(HeaderName::from_static(X_REQUEST_ID), value),
            Err(_) => reply,
        }
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", self.request.method())
            .field("path", &self.request.path())
            .field("request_id", &self.request_id)
            .field("params", &self.params)
            .field("function_params", &self.function_params)
            .field("attachments", &self.attachments)
            .field("finalized", &self.response.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn ctx(path: &'static str) -> RequestContext {
        RequestContext::new(Request::new(Method::GET, Uri::from_static(path)))
    }

    #[test]
    fn test_second_response_rejected() {
        let mut ctx = ctx("/");
        ctx.send("first").unwrap();
        assert!(matches!(ctx.send("second"), Err(RouteError::DoubleResponse)));
        assert!(matches!(ctx.forward(), Err(RouteError::DoubleResponse)));

        let reply = ctx.into_reply(Ok(()));
        assert_eq!(reply.body_text(), "first");
    }

    #[test]
    fn test_unanswered_handler_is_an_error() {
        let mut ctx = ctx("/quiet");
        ctx.enter(Stage::Handler);
        let reply = ctx.into_reply(Ok(()));
        assert_eq!(reply.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_request_id_echoed() {
        let request = Request::new(Method::GET, Uri::from_static("/")).with_header(
            HeaderName::from_static(X_REQUEST_ID),
            HeaderValue::from_static("abc-123"),
        );
        let mut ctx = RequestContext::new(request);
        assert_eq!(ctx.request_id(), "abc-123");
        ctx.send("ok").unwrap();
        let reply = ctx.into_reply(Ok(()));
        assert_eq!(reply.headers().get(X_REQUEST_ID).unwrap(), "abc-123");
    }

    #[test]
    fn test_scope_params_do_not_override_route_params() {
        let mut ctx = ctx("/ok/agus");
        let mut route = Params::new();
        route.insert("user", "agus");
        ctx.bind_route(route, Vec::new(), "/ok/:user");

        let mut scope = Params::new();
        scope.insert("user", "other");
        scope.insert("extra", "1");
        ctx.add_params(scope);

        assert_eq!(ctx.param("user"), Some("agus"));
        assert_eq!(ctx.param("extra"), Some("1"));
    }
}
