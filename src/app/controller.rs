//! Controllers: a type declaring a prefix and a table of actions.
//!
//! Registration is a plain pass over [`Controller::actions`] at startup,
//! mounting each action as an ordinary route inside a plugin.

use std::sync::Arc;

use axum::http::Method;

use crate::app::Application;
use crate::dispatch::RequestContext;
use crate::error::RouteResult;
use crate::routing::handler;

/// Synchronous controller method.
pub type ActionFn<C> = fn(&C, &mut RequestContext) -> RouteResult<()>;

/// One routed method of a controller.
pub struct Action<C> {
    pub method: Method,
    /// Path below the controller prefix. Empty for the prefix itself.
    pub url: &'static str,
    pub handler: ActionFn<C>,
}

impl<C> Action<C> {
    pub fn new(method: Method, url: &'static str, handler: ActionFn<C>) -> Self {
        Self {
            method,
            url,
            handler,
        }
    }

    pub fn get(url: &'static str, handler: ActionFn<C>) -> Self {
        Self::new(Method::GET, url, handler)
    }

    pub fn post(url: &'static str, handler: ActionFn<C>) -> Self {
        Self::new(Method::POST, url, handler)
    }
}

/// A group of routes sharing a prefix and an instance.
pub trait Controller: Send + Sync + 'static {
    /// Prefix every action is mounted under.
    fn prefix(&self) -> &str {
        ""
    }

    fn actions(&self) -> Vec<Action<Self>>
    where
        Self: Sized;
}

impl Application {
    /// Mount `controller` as a plugin under its prefix.
    pub fn controller<C: Controller>(&mut self, controller: C) -> RouteResult<&mut Self> {
        let actions = controller.actions();
        let prefix = controller.prefix().to_string();
        let controller = Arc::new(controller);

        self.register_at(&prefix, move |plugin| {
            for action in actions {
                let controller = Arc::clone(&controller);
                let method = action.handler;
                plugin.route(
                    action.method,
                    action.url,
                    handler(move |ctx| {
                        let result = method(&controller, ctx);
                        Box::pin(std::future::ready(result))
                    }),
                )?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::RouteKind;

    struct Greeter {
        greeting: &'static str,
    }

    impl Greeter {
        fn greet(&self, ctx: &mut RequestContext) -> RouteResult<()> {
            ctx.send(self.greeting)
        }
    }

    impl Controller for Greeter {
        fn prefix(&self) -> &str {
            "greet"
        }

        fn actions(&self) -> Vec<Action<Self>> {
            vec![Action::get("", Greeter::greet), Action::post("/again", Greeter::greet)]
        }
    }

    #[test]
    fn test_controller_mounts_under_prefix() {
        let mut app = Application::new();
        app.controller(Greeter { greeting: "hey" }).unwrap();

        let plugin = &app.children()[0];
        assert_eq!(plugin.prefix().as_str(), "/greet");
        assert_eq!(plugin.routes().len(), 2);
        assert_eq!(plugin.routes()[0].pattern().as_str(), "/");
        assert_eq!(plugin.routes()[1].method(), Some(&Method::POST));
        assert_eq!(plugin.routes()[1].kind(), RouteKind::Ordinary);
    }
}
