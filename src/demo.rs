//! Application served by the binary.
//!
//! Mounts the `Hello` controller under `/v1`, a payload echo, a greeting
//! with a path parameter, and a function route listing its arguments.

use axum::http::StatusCode;

use crate::app::{Action, Application, Controller};
use crate::dispatch::RequestContext;
use crate::error::{RouteError, RouteResult};
use crate::http::Payload;
use crate::routing::handler;

/// Greeting controller mounted at `v1`.
pub struct Hello;

impl Hello {
    fn hello(&self, ctx: &mut RequestContext) -> RouteResult<()> {
        ctx.send("hello")
    }

    fn hi(&self, ctx: &mut RequestContext) -> RouteResult<()> {
        ctx.send("hi")
    }
}

impl Controller for Hello {
    fn prefix(&self) -> &str {
        "v1"
    }

    fn actions(&self) -> Vec<Action<Self>> {
        vec![Action::get("", Hello::hello), Action::get("/hi", Hello::hi)]
    }
}

/// Build the demo application.
pub fn application() -> RouteResult<Application> {
    let mut app = Application::new();

    app.controller(Hello)?;

    app.get(
        "/",
        handler(|ctx| Box::pin(async move { ctx.send("hello") })),
    )?;

    app.post(
        "/",
        handler(|ctx| {
            Box::pin(async move {
                match ctx.payload().clone() {
                    Payload::Json(value) => ctx.json(&value),
                    Payload::Text(text) => ctx.send(text),
                    Payload::Empty => ctx.send(""),
                    Payload::Binary(_) => Err(RouteError::custom(
                        StatusCode::UNSUPPORTED_MEDIA_TYPE,
                        "Binary payloads are not echoed",
                    )),
                }
            })
        }),
    )?;

    app.get(
        "/login/user/:name",
        handler(|ctx| {
            Box::pin(async move {
                let name = ctx.param("name").unwrap_or_default().to_string();
                ctx.send(format!("hello, {name}"))
            })
        }),
    )?;

    app.function(
        "/fn",
        handler(|ctx| {
            Box::pin(async move {
                let args = ctx.function_params().to_vec();
                ctx.json(&args)
            })
        }),
    )?;

    Ok(app)
}
