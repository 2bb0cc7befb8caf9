//! Request dispatch over a frozen application tree.
//!
//! # Responsibilities
//! - Flatten the application tree into one route table and a scope arena
//! - Per request: lookup → request decorators → middleware → handler
//! - Re-route forwarded requests through the remaining ordinary routes
//! - Resolve every outcome, including deadline expiry, into a reply
//!
//! # Design Decisions
//! - Immutable after construction; shared across requests behind `Arc`
//! - Each scope stores its full middleware chain (ancestors first), so
//!   a request never walks the tree
//! - Forwarding never re-runs middleware or request decorators; a forward
//!   into another plugin runs only what that plugin adds

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::Method;
use futures_util::future::BoxFuture;

use crate::app::{Application, Attachments, RequestDecoratorFn};
use crate::dispatch::RequestContext;
use crate::error::{RouteError, RouteResult};
use crate::http::{Reply, Request};
use crate::middleware::{Endpoint, MiddlewareChain};
use crate::observability::metrics;
use crate::resilience::timeouts::{with_deadline, DEFAULT_REQUEST_TIMEOUT};
use crate::routing::{split_path, HandlerFn, MatchMode, Pattern, RouteId, RouteMatch, RouteTable, ScopeId};

/// Frozen form of one application in the tree.
struct Scope {
    parent: Option<ScopeId>,
    depth: usize,
    /// Full prefix from the root.
    prefix: Pattern,
    /// Ancestors' entries followed by this scope's own, rebased to full paths.
    middleware: MiddlewareChain,
    request_decorators: Vec<RequestDecoratorFn>,
    decorations: Arc<Attachments>,
    /// Own not-found handler, or the nearest ancestor's.
    not_found: Option<HandlerFn>,
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("parent", &self.parent)
            .field("prefix", &self.prefix.as_str())
            .field("middleware", &self.middleware.len())
            .field("request_decorators", &self.request_decorators.len())
            .field("decorations", &self.decorations)
            .field("not_found", &self.not_found.is_some())
            .finish()
    }
}

/// Routes requests through a frozen application tree.
#[derive(Debug)]
pub struct Dispatcher {
    routes: RouteTable,
    scopes: Vec<Scope>,
    deadline: Duration,
}

impl Dispatcher {
    /// Flatten `app` and its plugins.
    pub fn from_application(app: Application) -> RouteResult<Self> {
        let mut routes = RouteTable::new();
        let mut scopes = Vec::new();
        flatten(app, None, &mut scopes, &mut routes)?;

        tracing::info!(
            routes = routes.len(),
            scopes = scopes.len(),
            "Dispatcher ready"
        );

        Ok(Self {
            routes,
            scopes,
            deadline: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Set the response deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Every route with its full pattern.
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Number of applications in the frozen tree, root included.
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// Full prefix of a scope and of its parent.
    pub fn scope_prefix(&self, scope: ScopeId) -> Option<(&Pattern, Option<ScopeId>)> {
        self.scopes.get(scope).map(|s| (&s.prefix, s.parent))
    }

    /// Dispatch one request and produce its reply.
    pub async fn dispatch(&self, request: Request) -> Reply {
        let start = Instant::now();
        let method = request.method().clone();
        let mut ctx = RequestContext::new(request);

        let outcome = with_deadline(self.deadline, self.handle(&mut ctx)).await;

        let route = ctx
            .matched_route()
            .unwrap_or(metrics::UNMATCHED_ROUTE)
            .to_string();
        let reply = ctx.into_reply(outcome);

        tracing::debug!(
            method = %method,
            route = %route,
            status = reply.status().as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Request dispatched"
        );
        metrics::record_request(method.as_str(), reply.status().as_u16(), &route, start.elapsed());
        reply
    }

    async fn handle(&self, ctx: &mut RequestContext) -> RouteResult<()> {
        let path = ctx.path().to_string();
        let segments = split_path(&path);
        let method = ctx.method().clone();

        let Some(found) = self.routes.lookup(&method, &segments) else {
            return self.handle_miss(ctx, &segments).await;
        };

        let route = found.id;
        let scope = self.bind(ctx, found);
        tracing::debug!(
            request_id = %ctx.request_id(),
            route = ctx.matched_route().unwrap_or_default(),
            "Route matched"
        );

        let owner = &self.scopes[scope];
        decorate(ctx, &owner.request_decorators);

        let endpoint = RouteEndpoint {
            dispatcher: self,
            entered: vec![scope],
            route,
            declined: Vec::new(),
            path: &segments,
        };
        owner.middleware.run(ctx, &segments, &endpoint).await
    }

    /// Bind a lookup result to the context, returning the owning scope.
    fn bind(&self, ctx: &mut RequestContext, found: RouteMatch) -> ScopeId {
        let route = &self.routes[found.id];
        ctx.bind_route(found.params, found.function_params, route.pattern().as_str());
        ctx.set_decorations(Arc::clone(&self.scopes[route.scope()].decorations));
        route.scope()
    }

    /// Run the matched handler, following forwards until one answers.
    ///
    /// `entered` lists the scopes whose middleware chains already ran for
    /// this request.
    async fn invoke(
        &self,
        ctx: &mut RequestContext,
        mut entered: Vec<ScopeId>,
        first: RouteId,
        mut declined: Vec<RouteId>,
        path: &[&str],
    ) -> RouteResult<()> {
        let method = ctx.method().clone();
        let mut current = first;

        loop {
            let route = &self.routes[current];
            (route.handler())(ctx).await?;

            if !ctx.take_forward() {
                return Ok(());
            }
            declined.push(current);

            let Some(next) = self.routes.lookup_ordinary(&method, path, &declined) else {
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    from = %route.pattern(),
                    "Forward found no remaining route"
                );
                let scope = self.fallback_scope(path);
                return match &self.scopes[scope].not_found {
                    Some(handler) => handler(ctx).await,
                    None => Err(not_found(&method, ctx.path())),
                };
            };

            tracing::debug!(
                request_id = %ctx.request_id(),
                from = %route.pattern(),
                to = next.id,
                "Forwarding request"
            );
            current = next.id;
            let target = self.bind(ctx, next);
            if entered.contains(&target) {
                continue;
            }

            // Entering another plugin: run what it adds beyond the chains
            // this request already went through.
            let shared = &self.scopes[self.entered_ancestor(&entered, target)];
            let owner = &self.scopes[target];
            decorate(
                ctx,
                owner
                    .request_decorators
                    .get(shared.request_decorators.len()..)
                    .unwrap_or_default(),
            );
            let pending = owner.middleware.tail(shared.middleware.len());
            entered.push(target);
            if pending.is_empty() {
                continue;
            }

            let endpoint = RouteEndpoint {
                dispatcher: self,
                entered,
                route: current,
                declined,
                path,
            };
            return pending.run(ctx, path, &endpoint).await;
        }
    }

    /// No route matched: run the nearest not-found handler behind its
    /// scope's middleware.
    async fn handle_miss(&self, ctx: &mut RequestContext, path: &[&str]) -> RouteResult<()> {
        let scope = &self.scopes[self.fallback_scope(path)];
        tracing::warn!(
            request_id = %ctx.request_id(),
            method = %ctx.method(),
            path = %ctx.path(),
            fallback = %scope.prefix,
            "No route matched"
        );

        ctx.set_decorations(Arc::clone(&scope.decorations));
        decorate(ctx, &scope.request_decorators);

        let endpoint = NotFoundEndpoint {
            handler: scope.not_found.as_ref(),
        };
        scope.middleware.run(ctx, path, &endpoint).await
    }

    /// Deepest scope covering `path` that has a not-found handler, else the root.
    fn fallback_scope(&self, path: &[&str]) -> ScopeId {
        self.scopes
            .iter()
            .enumerate()
            .filter(|(_, s)| s.not_found.is_some())
            .filter(|(_, s)| s.prefix.match_segments(path, MatchMode::Prefix).is_some())
            .max_by(|(a_id, a), (b_id, b)| a.depth.cmp(&b.depth).then(b_id.cmp(a_id)))
            .map(|(id, _)| id)
            .unwrap_or(0)
    }

    /// Whether `ancestor` is `scope` or one of its ancestors.
    fn is_ancestor(&self, ancestor: ScopeId, scope: ScopeId) -> bool {
        let mut current = Some(scope);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.scopes[id].parent;
        }
        false
    }

    /// Deepest ancestor of `target`, itself included, whose middleware
    /// already ran as part of an entered scope's chain.
    fn entered_ancestor(&self, entered: &[ScopeId], target: ScopeId) -> ScopeId {
        let mut current = Some(target);
        while let Some(id) = current {
            if entered.iter().any(|&scope| self.is_ancestor(id, scope)) {
                return id;
            }
            current = self.scopes[id].parent;
        }
        0
    }
}

fn decorate(ctx: &mut RequestContext, decorators: &[RequestDecoratorFn]) {
    for decorator in decorators {
        decorator(ctx);
    }
}

fn not_found(method: &Method, path: &str) -> RouteError {
    RouteError::NotFound {
        method: method.clone(),
        path: path.to_string(),
    }
}

fn flatten(
    app: Application,
    parent: Option<ScopeId>,
    scopes: &mut Vec<Scope>,
    routes: &mut RouteTable,
) -> RouteResult<()> {
    let Application {
        prefix: own_prefix,
        routes: own_routes,
        middleware: own_middleware,
        decorators,
        children,
        not_found,
        inherited,
        ..
    } = app;

    let (prefix, mut middleware, mut request_decorators, inherited_not_found, depth) =
        match parent.and_then(|p| scopes.get(p)) {
            Some(up) => (
                up.prefix.join(&own_prefix)?,
                up.middleware.clone(),
                up.request_decorators.clone(),
                up.not_found.clone(),
                up.depth + 1,
            ),
            None => (own_prefix, MiddlewareChain::new(), Vec::new(), None, 0),
        };

    for entry in own_middleware.iter() {
        middleware.register(entry.rebase(&prefix)?);
    }
    request_decorators.extend(decorators.request_decorators().iter().cloned());
    // Ancestor decorations as the plugin saw them when it was registered
    let mut decorations = inherited;
    decorations.extend(decorators.instance());

    let id = scopes.len();
    for route in &own_routes {
        routes.add(route.rebase(&prefix, id)?);
    }

    scopes.push(Scope {
        parent,
        depth,
        prefix,
        middleware,
        request_decorators,
        decorations: Arc::new(decorations),
        not_found: not_found.or(inherited_not_found),
    });

    for child in children {
        flatten(child, Some(id), scopes, routes)?;
    }
    Ok(())
}

/// Endpoint running the matched route's handler.
struct RouteEndpoint<'p> {
    dispatcher: &'p Dispatcher,
    entered: Vec<ScopeId>,
    route: RouteId,
    declined: Vec<RouteId>,
    path: &'p [&'p str],
}

impl Endpoint for RouteEndpoint<'_> {
    fn call<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, RouteResult<()>> {
        Box::pin(self.dispatcher.invoke(
            ctx,
            self.entered.clone(),
            self.route,
            self.declined.clone(),
            self.path,
        ))
    }
}

/// Endpoint running a not-found handler, or failing with `NotFound`.
struct NotFoundEndpoint<'p> {
    handler: Option<&'p HandlerFn>,
}

impl Endpoint for NotFoundEndpoint<'_> {
    fn call<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, RouteResult<()>> {
        match self.handler {
            Some(handler) => handler(ctx),
            None => {
                let err = not_found(ctx.method(), ctx.path());
                Box::pin(async move { Err(err) })
            }
        }
    }
}
