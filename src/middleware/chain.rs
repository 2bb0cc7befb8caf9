//! Ordered middleware execution with explicit continuation.
//!
//! # Responsibilities
//! - Store middleware entries in registration order
//! - Select the entries whose scope covers the request path
//! - Run them one at a time, each handing control on through [`Next`]
//! - Stop as soon as a response has been sent
//!
//! # Design Decisions
//! - An entry only starts after the previous one called `next.run(ctx)`
//! - The finalized check happens before every step, including the handler
//! - Scope matching is segment-wise: `/ok` covers `/ok/x` but not `/okay`

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::dispatch::context::Stage;
use crate::dispatch::RequestContext;
use crate::error::RouteResult;
use crate::routing::matcher::{MatchMode, Params, Pattern};

/// Async middleware: receives the context and the continuation.
pub type MiddlewareFn = Arc<
    dyn for<'a> Fn(&'a mut RequestContext, Next<'a>) -> BoxFuture<'a, RouteResult<()>>
        + Send
        + Sync,
>;

/// Wrap a closure as a [`MiddlewareFn`].
pub fn middleware<F>(f: F) -> MiddlewareFn
where
    F: for<'a> Fn(&'a mut RequestContext, Next<'a>) -> BoxFuture<'a, RouteResult<()>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Final step of a chain, run once every selected entry has continued.
pub trait Endpoint: Send + Sync {
    fn call<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, RouteResult<()>>;
}

/// A middleware and the path scope it applies to.
#[derive(Clone)]
pub struct MiddlewareEntry {
    scope: Option<Pattern>,
    handler: MiddlewareFn,
}

impl MiddlewareEntry {
    /// Entry that runs for every request.
    pub fn global(handler: MiddlewareFn) -> Self {
        Self {
            scope: None,
            handler,
        }
    }

    /// Entry that runs only for paths starting with `scope`.
    pub fn scoped(scope: Pattern, handler: MiddlewareFn) -> Self {
        Self {
            scope: Some(scope),
            handler,
        }
    }

    pub fn scope(&self) -> Option<&Pattern> {
        self.scope.as_ref()
    }

    /// Copy of this entry with its scope mounted under `prefix`.
    pub(crate) fn rebase(&self, prefix: &Pattern) -> RouteResult<Self> {
        let scope = match &self.scope {
            Some(scope) => Some(prefix.join(scope)?),
            None if prefix.is_empty() => None,
            None => Some(prefix.clone()),
        };
        Ok(Self {
            scope,
            handler: Arc::clone(&self.handler),
        })
    }

    /// Parameters bound by the scope when it covers `path`.
    fn selects(&self, path: &[&str]) -> Option<Params> {
        match &self.scope {
            None => Some(Params::new()),
            Some(scope) => scope
                .match_segments(path, MatchMode::Prefix)
                .map(|m| m.params),
        }
    }
}

impl std::fmt::Debug for MiddlewareEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareEntry")
            .field("scope", &self.scope.as_ref().map(Pattern::as_str))
            .finish()
    }
}

/// Middleware entries in registration order.
#[derive(Debug, Clone, Default)]
pub struct MiddlewareChain {
    entries: Vec<MiddlewareEntry>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entry: MiddlewareEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MiddlewareEntry> {
        self.entries.iter()
    }

    /// Entries registered after the first `skip`.
    pub(crate) fn tail(&self, skip: usize) -> MiddlewareChain {
        MiddlewareChain {
            entries: self.entries.get(skip..).unwrap_or_default().to_vec(),
        }
    }

    /// Entries applying to `path`, in order, plus the parameters their scopes bind.
    pub fn select(&self, path: &[&str]) -> (Vec<MiddlewareFn>, Params) {
        let mut selected = Vec::new();
        let mut params = Params::new();
        for entry in &self.entries {
            if let Some(bound) = entry.selects(path) {
                params.fill_from(bound);
                selected.push(Arc::clone(&entry.handler));
            }
        }
        (selected, params)
    }

    /// Run the entries covering `path`, then `endpoint`.
    pub async fn run(
        &self,
        ctx: &mut RequestContext,
        path: &[&str],
        endpoint: &dyn Endpoint,
    ) -> RouteResult<()> {
        let (selected, params) = self.select(path);
        ctx.add_params(params);

        tracing::debug!(
            request_id = %ctx.request_id(),
            middleware_count = selected.len(),
            path = %ctx.path(),
            "Executing middleware chain"
        );

        let next = Next {
            chain: &selected,
            endpoint,
            index: 0,
        };
        next.run(ctx).await
    }
}

/// Continuation handed to each middleware.
///
/// Calling [`Next::run`] starts the following entry (or the endpoint) and
/// resolves once the rest of the chain has finished. Dropping it without
/// calling `run` stops the chain.
pub struct Next<'a> {
    chain: &'a [MiddlewareFn],
    endpoint: &'a dyn Endpoint,
    index: usize,
}

impl<'a> Next<'a> {
    /// Continue with the rest of the chain.
    pub fn run<'b>(self, ctx: &'b mut RequestContext) -> BoxFuture<'b, RouteResult<()>>
    where
        'a: 'b,
    {
        Box::pin(async move {
            if ctx.is_finalized() {
                tracing::trace!(
                    request_id = %ctx.request_id(),
                    index = self.index,
                    "Response already sent, stopping chain"
                );
                return Ok(());
            }

            match self.chain.split_first() {
                Some((current, rest)) => {
                    tracing::trace!(index = self.index, "Executing middleware");
                    ctx.enter(Stage::Middleware(self.index));
                    let next = Next {
                        chain: rest,
                        endpoint: self.endpoint,
                        index: self.index + 1,
                    };
                    current(ctx, next).await
                }
                None => {
                    tracing::trace!("Middleware chain complete, calling handler");
                    ctx.enter(Stage::Handler);
                    self.endpoint.call(ctx).await
                }
            }
        })
    }

    /// Position of the entry that received this continuation.
    pub fn index(&self) -> usize {
        self.index.saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Request;
    use crate::routing::matcher::split_path;
    use axum::http::{Method, StatusCode, Uri};
    use std::sync::Mutex;

    struct SendEndpoint(&'static str);

    impl Endpoint for SendEndpoint {
        fn call<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, RouteResult<()>> {
            Box::pin(async move { ctx.send(self.0) })
        }
    }

    fn ctx(path: &'static str) -> RequestContext {
        RequestContext::new(Request::new(Method::GET, Uri::from_static(path)))
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> MiddlewareFn {
        let log = Arc::clone(log);
        middleware(move |ctx, next| {
            log.lock().unwrap().push(name);
            Box::pin(async move { next.run(ctx).await })
        })
    }

    #[tokio::test]
    async fn test_runs_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = MiddlewareChain::new();
        chain.register(MiddlewareEntry::global(recorder(&log, "a")));
        chain.register(MiddlewareEntry::global(recorder(&log, "b")));
        chain.register(MiddlewareEntry::global(recorder(&log, "c")));

        let mut ctx = ctx("/");
        chain
            .run(&mut ctx, &split_path("/"), &SendEndpoint("done"))
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(ctx.response().unwrap().body_text(), "done");
    }

    #[tokio::test]
    async fn test_tail_runs_later_entries_only() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = MiddlewareChain::new();
        chain.register(MiddlewareEntry::global(recorder(&log, "a")));
        chain.register(MiddlewareEntry::global(recorder(&log, "b")));

        let mut ctx = ctx("/");
        chain
            .tail(1)
            .run(&mut ctx, &split_path("/"), &SendEndpoint("done"))
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["b"]);
        assert!(chain.tail(5).is_empty());
    }

    #[tokio::test]
    async fn test_scope_is_segment_prefix() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = MiddlewareChain::new();
        chain.register(MiddlewareEntry::scoped(
            Pattern::compile("/ok").unwrap(),
            recorder(&log, "ok"),
        ));

        for path in ["/ok", "/ok/nested", "/okay", "/"] {
            let mut ctx = ctx(path);
            chain
                .run(&mut ctx, &split_path(path), &SendEndpoint("done"))
                .await
                .unwrap();
        }

        assert_eq!(*log.lock().unwrap(), vec!["ok", "ok"]);
    }

    #[tokio::test]
    async fn test_scope_binds_params() {
        let mut chain = MiddlewareChain::new();
        chain.register(MiddlewareEntry::scoped(
            Pattern::compile("/ok/:user").unwrap(),
            middleware(|ctx, next| {
                Box::pin(async move {
                    let user = ctx.param("user").unwrap_or_default().to_string();
                    ctx.insert("ok", user);
                    next.run(ctx).await
                })
            }),
        ));

        let mut ctx = ctx("/ok/agus");
        chain
            .run(&mut ctx, &split_path("/ok/agus"), &SendEndpoint("done"))
            .await
            .unwrap();
        assert_eq!(ctx.get::<String>("ok").map(String::as_str), Some("agus"));
    }

    #[tokio::test]
    async fn test_response_in_middleware_stops_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = MiddlewareChain::new();
        chain.register(MiddlewareEntry::global(middleware(|ctx, next| {
            Box::pin(async move {
                ctx.respond(crate::http::Reply::new(StatusCode::UNAUTHORIZED))?;
                next.run(ctx).await
            })
        })));
        chain.register(MiddlewareEntry::global(recorder(&log, "after")));

        let mut ctx = ctx("/");
        chain
            .run(&mut ctx, &split_path("/"), &SendEndpoint("handler"))
            .await
            .unwrap();

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(ctx.response().unwrap().status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_code_after_next_runs_after_handler() {
        let mut chain = MiddlewareChain::new();
        chain.register(MiddlewareEntry::global(middleware(|ctx, next| {
            Box::pin(async move {
                next.run(&mut *ctx).await?;
                let seen = ctx.is_finalized();
                ctx.insert("seen_response", seen);
                Ok(())
            })
        })));

        let mut ctx = ctx("/");
        chain
            .run(&mut ctx, &split_path("/"), &SendEndpoint("done"))
            .await
            .unwrap();
        assert_eq!(ctx.get::<bool>("seen_response"), Some(&true));
    }

    #[tokio::test]
    async fn test_dropped_continuation_leaves_request_unanswered() {
        let mut chain = MiddlewareChain::new();
        chain.register(MiddlewareEntry::global(recorder(
            &Arc::new(Mutex::new(Vec::new())),
            "first",
        )));
        chain.register(MiddlewareEntry::global(middleware(|_ctx, _next| {
            Box::pin(async move { Ok(()) })
        })));

        let mut ctx = ctx("/");
        chain
            .run(&mut ctx, &split_path("/"), &SendEndpoint("handler"))
            .await
            .unwrap();

        assert!(!ctx.is_finalized());
        assert_eq!(ctx.stage(), Stage::Middleware(1));
    }
}
