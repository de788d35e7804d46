//! Minimal trellis example: a users controller with interceptors, a
//! fallback route and an error handler.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users
//!   curl http://localhost:3000/users/42                       # 401, no token
//!   curl -H 'authorization: demo' http://localhost:3000/users/42
//!   curl -H 'authorization: demo' -X POST http://localhost:3000/users -d 'alice'
//!   curl -H 'authorization: demo' -X DELETE http://localhost:3000/users/0
//!   curl http://localhost:3000/nowhere

use std::sync::Arc;
use std::time::Instant;

use http::StatusCode;
use tracing::info;
use tracing_subscriber::EnvFilter;
use trellis::middleware::{around_fn, before_fn, Filters};
use trellis::{
    ActionResult, Controller, ControllerRegistry, Dispatcher, Error, Exchange, HandlerRef, Response, Router, Server,
    Settings,
};

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_toml_str(
        r#"
        [http]
        bind_address = "0.0.0.0:3000"
        [http.threads]
        min = 4
        max = 64
        [trace]
        enable = true
        "#,
    )?;

    let routes = Router::new()
        .get("/users",        HandlerRef::new("users", "index"))
        .get("/users/:id",    HandlerRef::new("users", "show"))
        .post("/users",       HandlerRef::new("users", "create"))
        .delete("/users/:id", HandlerRef::new("users", "destroy"))
        .freeze()?;

    let controllers = ControllerRegistry::new()
        .register("users", Users::default)
        .register("pages", Pages::default);

    let dispatcher = Dispatcher::builder(routes, controllers)
        .settings(&settings)
        .default_handler(HandlerRef::new("pages", "not_found"))
        .error_handler(HandlerRef::new("pages", "error"))
        .build();

    Server::from_settings(&settings)?.run(Arc::new(dispatcher))
}

#[derive(Default)]
struct Users;

impl Controller for Users {
    fn call(&mut self, action: &str, ex: &mut Exchange) -> ActionResult {
        match action {
            "index" => ex.render(Response::json(r#"[{"id":"1","name":"alice"}]"#)),
            "show" => {
                let id = ex.request().param("id").unwrap_or("unknown").to_owned();
                ex.render(Response::json(format!(r#"{{"id":"{id}","name":"alice"}}"#)))
            }
            "create" => {
                if ex.request().body().is_empty() {
                    return Err(Error::http(StatusCode::BAD_REQUEST, "empty body").into());
                }
                ex.render(
                    Response::builder()
                        .status(StatusCode::CREATED)
                        .header("location", "/users/99")
                        .json(r#"{"id":"99"}"#),
                )
            }
            "destroy" => {
                let id: u32 = ex.request().param("id").unwrap_or_default().parse().map_err(Error::action)?;
                if id == 0 {
                    return Err(Error::action("user 0 is reserved").into());
                }
                ex.render(StatusCode::NO_CONTENT)
            }
            other => Err(Error::unknown_action("users", other).into()),
        }
    }

    fn filters(&self) -> Filters {
        Filters::new()
            .before_except(&["index"], before_fn(|ex| {
                if ex.request().header("authorization").is_none() {
                    return Err(Error::http(StatusCode::UNAUTHORIZED, "login required").into());
                }
                Ok(())
            }))
            .around(around_fn(|ex, next| {
                let started = Instant::now();
                let result = next.run(ex);
                info!(path = ex.request().path(), elapsed_us = started.elapsed().as_micros() as u64, "users action");
                result
            }))
    }
}

/// Fallback and error pages.
#[derive(Default)]
struct Pages;

impl Controller for Pages {
    fn call(&mut self, action: &str, ex: &mut Exchange) -> ActionResult {
        match action {
            "not_found" => {
                let body = format!(r#"{{"error":"nothing at {}"}}"#, ex.request().path());
                ex.render(Response::builder().status(StatusCode::NOT_FOUND).json(body))
            }
            other => Err(Error::unknown_action("pages", other).into()),
        }
    }

    fn rescue(&mut self, action: &str, error: &Error, ex: &mut Exchange) -> ActionResult {
        match action {
            "error" => {
                let body = format!(r#"{{"error":"{}"}}"#, error.public_message());
                ex.render(Response::builder().status(error.status()).json(body))
            }
            other => Err(Error::unknown_action("pages", other).into()),
        }
    }
}
