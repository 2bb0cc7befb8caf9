//! End-to-end tests over a live server.

use plugin_router::http::Payload;
use plugin_router::{handler, middleware, Application, RequestContext, RouteResult};
use reqwest::StatusCode;
use serde_json::json;

mod common;

type SendOk = fn(&mut RequestContext, &str) -> RouteResult<()>;

fn send_ok(ctx: &mut RequestContext, payload: &str) -> RouteResult<()> {
    ctx.send(payload)
}

#[tokio::test]
async fn test_get() {
    let mut app = Application::new();
    app.get("/", handler(|ctx| Box::pin(async move { ctx.send("hello") })))
        .unwrap();
    let server = common::start_server(app).await;

    let text = reqwest::get(common::url(&server, "/"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(text, "hello");
    server.close().await.unwrap();
}

#[tokio::test]
async fn test_post_echoes_json_payload() {
    let mut app = Application::new();
    app.post(
        "/",
        handler(|ctx| {
            Box::pin(async move {
                match ctx.payload().clone() {
                    Payload::Json(value) => ctx.json(&value),
                    other => ctx.send(format!("{other:?}")),
                }
            })
        }),
    )
    .unwrap();
    let server = common::start_server(app).await;

    let text = reqwest::Client::new()
        .post(common::url(&server, "/"))
        .json(&json!({ "msg": "hello" }))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(text, r#"{"msg":"hello"}"#);
    server.close().await.unwrap();
}

#[tokio::test]
async fn test_get_user() {
    let mut app = Application::new();
    app.get(
        "/login/user/:name",
        handler(|ctx| {
            Box::pin(async move {
                let name = ctx.param("name").unwrap_or_default().to_string();
                ctx.send(format!("hello, {name}"))
            })
        }),
    )
    .unwrap();
    let server = common::start_server(app).await;

    let text = reqwest::get(common::url(&server, "/login/user/agus"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(text, "hello, agus");
    server.close().await.unwrap();
}

#[tokio::test]
async fn test_middleware() {
    let mut app = Application::new();
    app.use_middleware(middleware(|ctx, next| {
        Box::pin(async move {
            ctx.insert::<SendOk>("send_ok", send_ok);
            next.run(ctx).await
        })
    }));
    app.get(
        "/",
        handler(|ctx| {
            Box::pin(async move {
                let send = ctx.get::<SendOk>("send_ok").copied();
                match send {
                    Some(send) => send(ctx, "plugin"),
                    None => ctx.send("missing"),
                }
            })
        }),
    )
    .unwrap();
    let server = common::start_server(app).await;

    let text = reqwest::get(common::url(&server, "/"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(text, "plugin");
    server.close().await.unwrap();
}

#[tokio::test]
async fn test_middleware_with_url() {
    let mut app = Application::new();
    app.use_middleware_at(
        "/ok",
        middleware(|ctx, next| {
            Box::pin(async move {
                ctx.insert::<SendOk>("send_ok", send_ok);
                next.run(ctx).await
            })
        }),
    )
    .unwrap()
    .get(
        "/ok",
        handler(|ctx| {
            Box::pin(async move {
                match ctx.get::<SendOk>("send_ok").copied() {
                    Some(send) => send(ctx, "MIDDLEWARE"),
                    None => ctx.send("missing"),
                }
            })
        }),
    )
    .unwrap()
    .get(
        "/other",
        handler(|ctx| {
            Box::pin(async move {
                let seen = ctx.get::<SendOk>("send_ok").is_some();
                ctx.send(seen.to_string())
            })
        }),
    )
    .unwrap();
    let server = common::start_server(app).await;

    let text = reqwest::get(common::url(&server, "/ok"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(text, "MIDDLEWARE");

    let text = reqwest::get(common::url(&server, "/other"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(text, "false");
    server.close().await.unwrap();
}

#[tokio::test]
async fn test_middleware_with_url_parameter() {
    let mut app = Application::new();
    app.use_middleware_at(
        "/ok/:user",
        middleware(|ctx, next| {
            Box::pin(async move {
                let user = ctx.param("user").unwrap_or_default().to_string();
                ctx.insert("ok", user);
                next.run(ctx).await
            })
        }),
    )
    .unwrap()
    .get(
        "/ok/:user",
        handler(|ctx| {
            Box::pin(async move {
                let ok = ctx.get::<String>("ok").cloned().unwrap_or_default();
                ctx.send(ok)
            })
        }),
    )
    .unwrap();
    let server = common::start_server(app).await;

    let text = reqwest::get(common::url(&server, "/ok/agus"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(text, "agus");
    server.close().await.unwrap();
}

#[tokio::test]
async fn test_decorate_instance() {
    let mut app = Application::new();
    app.decorate(|instance| instance.insert("ok", "ok".to_string()));
    assert_eq!(app.decoration::<String>("ok").map(String::as_str), Some("ok"));
}

#[tokio::test]
async fn test_decorate_request() {
    let mut app = Application::new();
    app.decorate_request(|ctx| ctx.insert("ok", "ok".to_string()))
        .get(
            "/",
            handler(|ctx| {
                Box::pin(async move {
                    let ok = ctx.get::<String>("ok").cloned().unwrap_or_default();
                    ctx.send(ok)
                })
            }),
        )
        .unwrap();
    let server = common::start_server(app).await;

    let text = reqwest::get(common::url(&server, "/"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(text, "ok");
    server.close().await.unwrap();
}

#[tokio::test]
async fn test_plugin() {
    let mut app = Application::new();
    app.register(|plugin| {
        plugin.get("/ok", handler(|ctx| Box::pin(async move { ctx.send("PLUGIN") })))?;
        Ok(())
    })
    .unwrap();
    let server = common::start_server(app).await;

    let text = reqwest::get(common::url(&server, "/ok"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(text, "PLUGIN");
    server.close().await.unwrap();
}

#[tokio::test]
async fn test_plugin_with_prefix() {
    let mut app = Application::new();
    app.register_at("v1", |plugin| {
        plugin.get("/ok", handler(|ctx| Box::pin(async move { ctx.send("PLUGIN") })))?;
        Ok(())
    })
    .unwrap();
    let server = common::start_server(app).await;

    let response = reqwest::get(common::url(&server, "/v1/ok")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "PLUGIN");

    let response = reqwest::get(common::url(&server, "/ok")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    server.close().await.unwrap();
}

fn list_function_params() -> plugin_router::routing::HandlerFn {
    handler(|ctx| {
        Box::pin(async move {
            let args = ctx.function_params().to_vec();
            ctx.json(&args)
        })
    })
}

#[tokio::test]
async fn test_function() {
    let mut app = Application::new();
    app.function(
        "/prefix/function",
        handler(|ctx| {
            Box::pin(async move {
                if !ctx.path().contains("/prefix/function") {
                    return ctx.forward();
                }
                let args = ctx.function_params().to_vec();
                ctx.json(&args)
            })
        }),
    )
    .unwrap();
    let server = common::start_server(app).await;

    let text = reqwest::get(common::url(&server, "/prefix/function/ok"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(text, r#"["ok"]"#);
    server.close().await.unwrap();
}

#[tokio::test]
async fn test_function_with_url_params() {
    let cases = [
        ("/:prefix/function", "/bebas/function/ok"),
        ("/prefix/:function", "/prefix/bebas/ok"),
        ("/:prefix/:function", "/merdeka/bebas/ok"),
    ];

    for (pattern, path) in cases {
        let mut app = Application::new();
        app.function(pattern, list_function_params()).unwrap();
        let server = common::start_server(app).await;

        let text = reqwest::get(common::url(&server, path))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(text, r#"["ok"]"#, "pattern {pattern} on {path}");
        server.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_controller() {
    let mut app = Application::new();
    app.controller(plugin_router::demo::Hello).unwrap();
    let server = common::start_server(app).await;

    let text = reqwest::get(common::url(&server, "/v1"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(text, "hello");

    let text = reqwest::get(common::url(&server, "/v1/hi"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(text, "hi");
    server.close().await.unwrap();
}

#[tokio::test]
async fn test_request_id_echoed() {
    let server = common::start_server(plugin_router::demo::application().unwrap()).await;
    let client = reqwest::Client::new();

    let response = client
        .get(common::url(&server, "/"))
        .header("x-request-id", "req-42")
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-42");

    let response = client.get(common::url(&server, "/")).send().await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));
    server.close().await.unwrap();
}

#[tokio::test]
async fn test_body_limit() {
    let mut config = plugin_router::ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.limits.max_body_size = 8;
    let server = common::start_server_with(config, plugin_router::demo::application().unwrap()).await;

    let response = reqwest::Client::new()
        .post(common::url(&server, "/"))
        .body("this body is far too long")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    server.close().await.unwrap();
}
