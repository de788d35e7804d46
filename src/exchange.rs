//! The request/response pair threaded through every interceptor and action.

use std::sync::Arc;

use crate::error::{ActionResult, Halt};
use crate::request::Request;
use crate::response::IntoResponse;
use crate::sink::ResponseSink;

/// One request's context and its response sink.
///
/// Owned by the worker thread handling the request and passed by `&mut` to
/// every interceptor, action and error handler. Never shared between
/// requests.
#[derive(Debug)]
pub struct Exchange {
    request: Arc<Request>,
    response: ResponseSink,
}

impl Exchange {
    pub fn new(request: Arc<Request>, response: ResponseSink) -> Self {
        Self { request, response }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn response(&self) -> &ResponseSink {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut ResponseSink {
        &mut self.response
    }

    /// Stages `body` without ending the action.
    pub fn respond(&mut self, body: impl IntoResponse) {
        self.response.stage(body.into_response());
    }

    /// Stages `body` and finishes rendering.
    ///
    /// Returns the render-finished signal, which unwinds out of the action and
    /// every enclosing interceptor without counting as a failure:
    ///
    /// ```rust
    /// use trellis::{ActionResult, Exchange};
    ///
    /// fn show(ex: &mut Exchange) -> ActionResult {
    ///     let id = ex.request().param("id").unwrap_or("unknown").to_owned();
    ///     ex.render(format!("user {id}"))
    /// }
    /// ```
    pub fn render(&mut self, body: impl IntoResponse) -> ActionResult {
        self.respond(body);
        Err(Halt::Rendered)
    }
}
