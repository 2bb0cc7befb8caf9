//! Application builder and plugin tree.
//!
//! # Responsibilities
//! - Register routes, function routes and middleware
//! - Nest plugins under an optional prefix, isolated from their siblings
//! - Hold instance decorations and request decorators
//! - Freeze the finished tree into a [`Dispatcher`]
//!
//! # Design Decisions
//! - Registration needs `&mut Application`, so nothing can change once the
//!   tree is consumed by `into_dispatcher`
//! - Patterns are compiled at registration; errors surface immediately
//! - One registration clock per tree, so precedence ties follow the order
//!   routes were written in, across plugins

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::Method;

use crate::app::decorators::{Attachments, DecoratorRegistry};
use crate::dispatch::{Dispatcher, RequestContext};
use crate::error::{RouteError, RouteResult};
use crate::middleware::{MiddlewareChain, MiddlewareEntry, MiddlewareFn};
use crate::routing::{HandlerFn, Pattern, Route, RouteKind};

/// A composition unit: the root server or one plugin.
pub struct Application {
    pub(crate) prefix: Pattern,
    pub(crate) routes: Vec<Route>,
    pub(crate) middleware: MiddlewareChain,
    pub(crate) decorators: DecoratorRegistry,
    pub(crate) children: Vec<Application>,
    pub(crate) not_found: Option<HandlerFn>,
    /// Decorations of the ancestors at the time this plugin was created.
    pub(crate) inherited: Attachments,
    clock: Arc<AtomicUsize>,
}

impl Application {
    /// Create an empty root application.
    pub fn new() -> Self {
        Self {
            prefix: Pattern::root(),
            routes: Vec::new(),
            middleware: MiddlewareChain::new(),
            decorators: DecoratorRegistry::new(),
            children: Vec::new(),
            not_found: None,
            inherited: Attachments::new(),
            clock: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn child(&self, prefix: Pattern) -> Self {
        let mut inherited = self.inherited.clone();
        inherited.extend(self.decorators.instance());
        Self {
            prefix,
            routes: Vec::new(),
            middleware: MiddlewareChain::new(),
            decorators: DecoratorRegistry::new(),
            children: Vec::new(),
            not_found: None,
            inherited,
            clock: Arc::clone(&self.clock),
        }
    }

    fn tick(&self) -> usize {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Prefix relative to the parent application.
    pub fn prefix(&self) -> &Pattern {
        &self.prefix
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn middleware(&self) -> &MiddlewareChain {
        &self.middleware
    }

    pub fn children(&self) -> &[Application] {
        &self.children
    }

    // ===== Routes =====

    /// Register an ordinary route.
    pub fn route(&mut self, method: Method, url: &str, handler: HandlerFn) -> RouteResult<&mut Self> {
        let pattern = Pattern::compile(url)?;
        tracing::debug!(method = %method, pattern = %pattern, "Registering route");
        let order = self.tick();
        self.routes.push(Route::new(
            Some(method),
            pattern,
            RouteKind::Ordinary,
            handler,
            order,
        ));
        Ok(self)
    }

    /// Register an ordinary route with the method given as text.
    pub fn route_str(&mut self, method: &str, url: &str, handler: HandlerFn) -> RouteResult<&mut Self> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| RouteError::InvalidMethod(method.to_string()))?;
        self.route(method, url, handler)
    }

    pub fn get(&mut self, url: &str, handler: HandlerFn) -> RouteResult<&mut Self> {
        self.route(Method::GET, url, handler)
    }

    pub fn post(&mut self, url: &str, handler: HandlerFn) -> RouteResult<&mut Self> {
        self.route(Method::POST, url, handler)
    }

    pub fn put(&mut self, url: &str, handler: HandlerFn) -> RouteResult<&mut Self> {
        self.route(Method::PUT, url, handler)
    }

    pub fn patch(&mut self, url: &str, handler: HandlerFn) -> RouteResult<&mut Self> {
        self.route(Method::PATCH, url, handler)
    }

    pub fn delete(&mut self, url: &str, handler: HandlerFn) -> RouteResult<&mut Self> {
        self.route(Method::DELETE, url, handler)
    }

    pub fn head(&mut self, url: &str, handler: HandlerFn) -> RouteResult<&mut Self> {
        self.route(Method::HEAD, url, handler)
    }

    pub fn options(&mut self, url: &str, handler: HandlerFn) -> RouteResult<&mut Self> {
        self.route(Method::OPTIONS, url, handler)
    }

    /// Register a function route.
    ///
    /// Matches any method and any path that starts with `url`; the segments
    /// after it are available through [`RequestContext::function_params`].
    /// It is tried before ordinary routes on the same paths, which it
    /// reaches by calling [`RequestContext::forward`].
    pub fn function(&mut self, url: &str, handler: HandlerFn) -> RouteResult<&mut Self> {
        let pattern = Pattern::compile(url)?;
        tracing::debug!(pattern = %pattern, "Registering function route");
        let order = self.tick();
        self.routes.push(Route::new(
            None,
            pattern,
            RouteKind::Function,
            handler,
            order,
        ));
        Ok(self)
    }

    /// Handler for requests no route answers.
    ///
    /// Applies to this application's prefix and below, unless a nested plugin
    /// installs its own.
    pub fn not_found(&mut self, handler: HandlerFn) -> &mut Self {
        self.not_found = Some(handler);
        self
    }

    // ===== Middleware =====

    /// Add middleware for every request reaching this application.
    pub fn use_middleware(&mut self, handler: MiddlewareFn) -> &mut Self {
        self.middleware.register(MiddlewareEntry::global(handler));
        self
    }

    /// Add middleware for paths starting with `prefix`.
    pub fn use_middleware_at(&mut self, prefix: &str, handler: MiddlewareFn) -> RouteResult<&mut Self> {
        let scope = Pattern::compile(prefix)?;
        self.middleware.register(MiddlewareEntry::scoped(scope, handler));
        Ok(self)
    }

    // ===== Plugins =====

    /// Register a plugin without a prefix.
    pub fn register<F>(&mut self, builder: F) -> RouteResult<&mut Self>
    where
        F: FnOnce(&mut Application) -> RouteResult<()>,
    {
        self.register_at("", builder)
    }

    /// Register a plugin under `prefix`.
    ///
    /// If `builder` fails the plugin is discarded and the error returned.
    pub fn register_at<F>(&mut self, prefix: &str, builder: F) -> RouteResult<&mut Self>
    where
        F: FnOnce(&mut Application) -> RouteResult<()>,
    {
        let mut plugin = self.child(Pattern::compile(prefix)?);
        builder(&mut plugin)?;
        self.attach(plugin);
        Ok(self)
    }

    /// Register a plugin whose setup is asynchronous.
    ///
    /// The plugin only becomes part of the tree once `builder` resolves.
    pub async fn register_async<F, Fut>(&mut self, prefix: &str, builder: F) -> RouteResult<&mut Self>
    where
        F: FnOnce(Application) -> Fut,
        Fut: Future<Output = RouteResult<Application>>,
    {
        let plugin = self.child(Pattern::compile(prefix)?);
        let plugin = builder(plugin).await?;
        self.attach(plugin);
        Ok(self)
    }

    fn attach(&mut self, plugin: Application) {
        tracing::debug!(
            prefix = %plugin.prefix,
            routes = plugin.routes.len(),
            middleware = plugin.middleware.len(),
            plugins = plugin.children.len(),
            "Registered plugin"
        );
        self.children.push(plugin);
    }

    // ===== Decorators =====

    /// Decorate this application instance; visible as soon as this returns.
    pub fn decorate<F>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce(&mut Attachments),
    {
        self.decorators.decorate(f);
        self
    }

    /// Decorate every request handled by this application.
    pub fn decorate_request<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&mut RequestContext) + Send + Sync + 'static,
    {
        self.decorators.decorate_request(f);
        self
    }

    /// Instance decoration of this application or one of its ancestors.
    ///
    /// Ancestor decorations are those present when this plugin was
    /// registered; request handlers see the same set.
    pub fn decoration<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        self.decorators
            .instance()
            .get(key)
            .or_else(|| self.inherited.get(key))
    }

    pub fn decorations(&self) -> &Attachments {
        self.decorators.instance()
    }

    pub fn has_decoration(&self, key: &str) -> bool {
        self.decorators.instance().contains(key) || self.inherited.contains(key)
    }

    // ===== Freeze =====

    /// Freeze the tree into an immutable dispatcher.
    pub fn into_dispatcher(self) -> RouteResult<Dispatcher> {
        Dispatcher::from_application(self)
    }
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("prefix", &self.prefix.as_str())
            .field("routes", &self.routes)
            .field("middleware", &self.middleware.len())
            .field("decorators", &self.decorators)
            .field("children", &self.children)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::middleware;
    use crate::routing::handler;

    fn hello() -> HandlerFn {
        handler(|ctx| Box::pin(async move { ctx.send("hello") }))
    }

    #[test]
    fn test_route_registration() {
        let mut app = Application::new();
        app.get("/", hello())
            .unwrap()
            .post("/login/user/:name", hello())
            .unwrap();

        assert_eq!(app.routes().len(), 2);
        assert_eq!(app.routes()[1].method(), Some(&Method::POST));
        assert_eq!(app.routes()[1].pattern().as_str(), "/login/user/:name");
        assert!(app.routes()[0].order() < app.routes()[1].order());
    }

    #[test]
    fn test_bad_pattern_rejected() {
        let mut app = Application::new();
        assert!(matches!(
            app.get("/users/:id/:id", hello()),
            Err(RouteError::PatternCompile { .. })
        ));
        assert!(app.routes().is_empty());
    }

    #[test]
    fn test_route_str_method() {
        let mut app = Application::new();
        app.route_str("get", "/", hello()).unwrap();
        assert_eq!(app.routes()[0].method(), Some(&Method::GET));
        assert!(matches!(
            app.route_str("NOT A METHOD", "/", hello()),
            Err(RouteError::InvalidMethod(_))
        ));
    }

    #[test]
    fn test_function_route_has_no_method() {
        let mut app = Application::new();
        app.function("/prefix/function", hello()).unwrap();
        assert_eq!(app.routes()[0].method(), None);
        assert_eq!(app.routes()[0].kind(), RouteKind::Function);
    }

    #[test]
    fn test_plugin_routes_stay_in_plugin() {
        let mut app = Application::new();
        app.register_at("v1", |plugin| {
            plugin.get("/ok", hello())?;
            Ok(())
        })
        .unwrap();

        assert!(app.routes().is_empty());
        assert_eq!(app.children().len(), 1);
        assert_eq!(app.children()[0].prefix().as_str(), "/v1");
        assert_eq!(app.children()[0].routes().len(), 1);
    }

    #[test]
    fn test_failed_plugin_is_discarded() {
        let mut app = Application::new();
        let result = app.register(|plugin| {
            plugin.get("/ok", hello())?;
            plugin.get("/:bad/:bad", hello())?;
            Ok(())
        });
        assert!(result.is_err());
        assert!(app.children().is_empty());
    }

    #[test]
    fn test_registration_order_spans_plugins() {
        let mut app = Application::new();
        app.get("/a", hello()).unwrap();
        app.register(|plugin| {
            plugin.get("/b", hello())?;
            Ok(())
        })
        .unwrap();
        app.get("/c", hello()).unwrap();

        let b = app.children()[0].routes()[0].order();
        assert!(app.routes()[0].order() < b);
        assert!(b < app.routes()[1].order());
    }

    #[test]
    fn test_decorate_instance() {
        let mut app = Application::new();
        app.decorate(|instance| instance.insert("ok", "ok".to_string()));
        assert_eq!(app.decoration::<String>("ok").map(String::as_str), Some("ok"));
    }

    #[test]
    fn test_plugin_sees_parent_decorations_but_not_siblings() {
        let mut app = Application::new();
        app.decorate(|instance| instance.insert("root", 1u32));
        app.register(|first| {
            assert_eq!(first.decoration::<u32>("root"), Some(&1));
            first.decorate(|instance| instance.insert("first", 2u32));
            Ok(())
        })
        .unwrap();
        app.register(|second| {
            assert!(!second.has_decoration("first"));
            Ok(())
        })
        .unwrap();

        assert!(!app.has_decoration("first"));
    }

    #[tokio::test]
    async fn test_register_async() {
        let mut app = Application::new();
        app.register_async("v2", |mut plugin| async move {
            tokio::task::yield_now().await;
            plugin.get("/ok", hello())?;
            Ok(plugin)
        })
        .await
        .unwrap();

        assert_eq!(app.children()[0].prefix().as_str(), "/v2");
        assert_eq!(app.children()[0].routes().len(), 1);
    }

    #[test]
    fn test_scoped_middleware_pattern_checked() {
        let mut app = Application::new();
        let noop = middleware(|ctx, next| Box::pin(async move { next.run(ctx).await }));
        app.use_middleware(noop.clone());
        app.use_middleware_at("/ok/:user", noop.clone()).unwrap();
        assert!(app.use_middleware_at("/:", noop).is_err());
        assert_eq!(app.middleware().len(), 2);
    }
}
