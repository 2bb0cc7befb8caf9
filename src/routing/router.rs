//! Route storage and lookup.
//!
//! # Responsibilities
//! - Store compiled routes in registration order
//! - Look up the best route for a method and path
//! - Return the matched route or an explicit no-match
//!
//! # Design Decisions
//! - Immutable once frozen into a dispatcher (shared without locks)
//! - O(n) scan over routes (acceptable for typical route counts)
//! - Most specific pattern wins; registration order breaks ties
//! - A function route covering the path gets first refusal; ordinary routes
//!   answer when it forwards or when no function route covers the path

use std::cmp::Ordering;
use std::sync::Arc;

use axum::http::Method;
use futures_util::future::BoxFuture;

use crate::dispatch::RequestContext;
use crate::error::RouteResult;
use crate::routing::matcher::{MatchMode, Params, PathMatch, Pattern};

/// Async request handler.
///
/// Handlers finalize the response through the context (`send`, `json`,
/// `respond`) or decline it with `forward`.
pub type HandlerFn =
    Arc<dyn for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, RouteResult<()>> + Send + Sync>;

/// Wrap a closure as a [`HandlerFn`].
///
/// The explicit bound lets closures written as
/// `|ctx| Box::pin(async move { ... })` infer their higher-ranked signature.
pub fn handler<F>(f: F) -> HandlerFn
where
    F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, RouteResult<()>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Index of a route inside its table.
pub type RouteId = usize;

/// Index of the application scope that owns a route.
pub type ScopeId = usize;

/// How a route consumes the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// Pattern must cover the whole path.
    Ordinary,
    /// Trailing segments become the function-parameter list.
    Function,
}

/// A registered route.
#[derive(Clone)]
pub struct Route {
    method: Option<Method>,
    pattern: Pattern,
    kind: RouteKind,
    handler: HandlerFn,
    scope: ScopeId,
    order: usize,
}

impl Route {
    /// Create a route. `method: None` answers every method.
    ///
    /// `order` is the global registration sequence number used to break
    /// precedence ties.
    pub fn new(
        method: Option<Method>,
        pattern: Pattern,
        kind: RouteKind,
        handler: HandlerFn,
        order: usize,
    ) -> Self {
        Self {
            method,
            pattern,
            kind,
            handler,
            scope: 0,
            order,
        }
    }

    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn kind(&self) -> RouteKind {
        self.kind
    }

    pub fn handler(&self) -> &HandlerFn {
        &self.handler
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Copy of this route mounted under `prefix` and owned by `scope`.
    pub(crate) fn rebase(&self, prefix: &Pattern, scope: ScopeId) -> RouteResult<Route> {
        Ok(Route {
            method: self.method.clone(),
            pattern: prefix.join(&self.pattern)?,
            kind: self.kind,
            handler: Arc::clone(&self.handler),
            scope,
            order: self.order,
        })
    }

    fn answers(&self, method: &Method) -> bool {
        self.method.as_ref().map_or(true, |m| m == method)
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern.as_str())
            .field("kind", &self.kind)
            .field("scope", &self.scope)
            .field("order", &self.order)
            .finish()
    }
}

impl std::ops::Index<RouteId> for RouteTable {
    type Output = Route;

    fn index(&self, id: RouteId) -> &Route {
        &self.routes[id]
    }
}

/// A successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub id: RouteId,
    pub params: Params,
    /// Trailing segments for function routes, empty otherwise.
    pub function_params: Vec<String>,
}

/// Ordered collection of routes.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route, returning its id.
    pub fn add(&mut self, route: Route) -> RouteId {
        self.routes.push(route);
        self.routes.len() - 1
    }

    pub fn get(&self, id: RouteId) -> Option<&Route> {
        self.routes.get(id)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    /// Find the route for `method` and the split request `path`.
    ///
    /// Function routes mounted over the path are tried first. The ordinary
    /// routes are reached by forwarding, or directly when none is mounted.
    pub fn lookup(&self, method: &Method, path: &[&str]) -> Option<RouteMatch> {
        self.lookup_function(method, path)
            .or_else(|| self.lookup_ordinary(method, path, &[]))
    }

    /// Best ordinary route, skipping the ids in `exclude`.
    pub fn lookup_ordinary(
        &self,
        method: &Method,
        path: &[&str],
        exclude: &[RouteId],
    ) -> Option<RouteMatch> {
        let mut best: Option<(RouteId, PathMatch)> = None;

        for (id, route) in self.routes.iter().enumerate() {
            if route.kind != RouteKind::Ordinary
                || !route.answers(method)
                || exclude.contains(&id)
            {
                continue;
            }
            let Some(m) = route.pattern.match_segments(path, MatchMode::Exact) else {
                continue;
            };
            let better = match &best {
                None => true,
                Some((current, _)) => {
                    let current = &self.routes[*current];
                    match route.pattern.specificity_cmp(&current.pattern) {
                        Ordering::Greater => true,
                        Ordering::Less => false,
                        Ordering::Equal => route.order < current.order,
                    }
                }
            };
            if better {
                best = Some((id, m));
            }
        }

        best.map(|(id, m)| RouteMatch {
            id,
            params: m.params,
            function_params: Vec::new(),
        })
    }

    fn lookup_function(&self, method: &Method, path: &[&str]) -> Option<RouteMatch> {
        let mut best: Option<(RouteId, PathMatch)> = None;

        for (id, route) in self.routes.iter().enumerate() {
            if route.kind != RouteKind::Function || !route.answers(method) {
                continue;
            }
            let Some(m) = route.pattern.match_segments(path, MatchMode::Prefix) else {
                continue;
            };
            let better = match &best {
                None => true,
                Some((current, _)) => {
                    let current = &self.routes[*current];
                    let ordering = route
                        .pattern
                        .len()
                        .cmp(&current.pattern.len())
                        .then_with(|| route.pattern.specificity_cmp(&current.pattern));
                    match ordering {
                        Ordering::Greater => true,
                        Ordering::Less => false,
                        Ordering::Equal => route.order < current.order,
                    }
                }
            };
            if better {
                best = Some((id, m));
            }
        }

        best.map(|(id, m)| RouteMatch {
            id,
            params: m.params,
            function_params: m.rest,
        })
    }
}
