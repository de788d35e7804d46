//! # trellis
//!
//! Routing, interceptor chains and a request lifecycle for thread-per-request
//! HTTP services.
//!
//! ## The pieces
//!
//! - **Path trie**: segment-by-segment matching with literal, `:param` and
//!   `*` wildcard segments. Literal beats parameter beats wildcard, and a
//!   choice is never revisited.
//! - **Router**: one trie per method, built at startup and then frozen into
//!   a read-only [`RouteTable`].
//! - **Interceptors**: before-filters and around-filters declared per
//!   controller, scoped with only/except lists and planned once per action.
//! - **Dispatcher**: runs one request on one worker thread, from route
//!   resolution through rollback and error handling to exactly one flushed
//!   response, with start/finish hooks on either side.
//!
//! The HTTP transport ([`Server`]) is hyper on tokio; requests run on tokio's
//! blocking pool so actions are plain synchronous code.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use trellis::{ActionResult, Controller, ControllerRegistry, Dispatcher, Error, Exchange, HandlerRef, Router, Server};
//!
//! #[derive(Default)]
//! struct Users;
//!
//! impl Controller for Users {
//!     fn call(&mut self, action: &str, ex: &mut Exchange) -> ActionResult {
//!         match action {
//!             "show" => {
//!                 let id = ex.request().param("id").unwrap_or("unknown").to_owned();
//!                 ex.render(format!(r#"{{"id":"{id}"}}"#))
//!             }
//!             other => Err(Error::unknown_action("users", other).into()),
//!         }
//!     }
//! }
//!
//! fn main() -> Result<(), Error> {
//!     let routes = Router::new()
//!         .get("/users/:id", HandlerRef::new("users", "show"))
//!         .freeze()?;
//!     let controllers = ControllerRegistry::new().register("users", Users::default);
//!     let dispatcher = Dispatcher::builder(routes, controllers).build();
//!
//!     Server::bind("0.0.0.0:3000")?.run(Arc::new(dispatcher))
//! }
//! ```

mod config;
mod controller;
mod dispatcher;
mod error;
mod exchange;
mod method;
mod request;
mod response;
mod router;
mod server;
mod sink;
mod transaction;

pub mod hooks;
pub mod middleware;
pub mod scope;
pub mod trie;

pub use config::{ConfigError, HttpSettings, Settings, ThreadSettings, TraceSettings, TransactionSettings};
pub use controller::{Controller, ControllerFactory, ControllerRegistry};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{ActionResult, BoxError, Error, Halt};
pub use exchange::Exchange;
pub use hooks::ProcessInfo;
pub use method::Method;
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::{HandlerRef, Route, RouteTable, Router};
pub use server::{serve_on, Server};
pub use sink::{ResponseSink, ResponseWriter};
pub use transaction::TransactionManager;
