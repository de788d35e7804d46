//! Unified error type and the action control-flow signal.
//!
//! Two things travel up the call tree out of an action:
//!
//! - [`Halt::Rendered`]: the action staged its output and wants everything
//!   above it (remaining interceptors, post-logic) skipped. This is *not* a
//!   failure; the dispatcher treats it as normal completion.
//! - [`Halt::Failed`]: a genuine failure carrying an [`Error`].
//!
//! `?` on any `Result<_, Error>` inside an action converts into
//! `Halt::Failed` automatically.

use std::any::Any;

use http::StatusCode;

use crate::config::ConfigError;
use crate::method::Method;

/// Any error an action or collaborator may surface.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// What every action, interceptor and error handler returns.
pub type ActionResult = Result<(), Halt>;

/// The error type returned by trellis' fallible operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Registration for a method the router has no tree for. Fatal at startup.
    #[error("can't handle [{method}] for path [{pattern}]")]
    UnsupportedMethod { method: Method, pattern: String },

    /// A route pattern the path trie cannot represent. Fatal at startup.
    #[error("invalid pattern [{pattern}]: {reason}")]
    InvalidPattern { pattern: String, reason: &'static str },

    /// Nothing matched and no default handler is configured.
    #[error("no route for [{path}]")]
    RouteNotFound { path: String },

    /// An action, interceptor or controller failed.
    #[error("action failed: {0}")]
    Action(#[source] BoxError),

    /// An action deliberately failed with a specific status.
    #[error("{message}")]
    Http { status: StatusCode, message: String },

    #[error("unknown controller `{0}`")]
    UnknownController(String),

    #[error("controller `{controller}` has no action `{action}`")]
    UnknownAction { controller: String, action: String },

    /// A panic caught at the dispatcher boundary.
    #[error("panicked: {0}")]
    Panicked(String),

    /// The configured error handler itself failed.
    #[error("error handler failed: {source}")]
    Secondary {
        #[source]
        source: Box<Error>,
    },

    /// Rolling back the transactional resource failed. Never reaches a client.
    #[error("rollback failed: {0}")]
    Rollback(#[source] BoxError),

    /// `send()` was called on a sink that already flushed.
    #[error("response already sent")]
    AlreadySent,

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wraps an arbitrary error as an action failure.
    ///
    /// ```rust
    /// use trellis::Error;
    ///
    /// let parsed: Result<u32, Error> = "x".parse::<u32>().map_err(Error::action);
    /// assert!(parsed.is_err());
    /// ```
    pub fn action(err: impl Into<BoxError>) -> Self {
        Self::Action(err.into())
    }

    /// An intentional failure with an explicit status, e.g. `403` from an auth check.
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Http { status, message: message.into() }
    }

    pub fn unknown_action(controller: &str, action: &str) -> Self {
        Self::UnknownAction {
            controller: controller.to_owned(),
            action: action.to_owned(),
        }
    }

    /// The status a generic failure response for this error carries.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Http { status, .. } => *status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Body text for a generic failure response.
    ///
    /// Client errors echo the message; server errors only expose the canonical
    /// reason phrase so internals never leak into the response.
    pub fn public_message(&self) -> String {
        let status = self.status();
        if status.is_client_error() {
            self.to_string()
        } else {
            status.canonical_reason().unwrap_or("Internal Server Error").to_owned()
        }
    }
}

/// Why an action stopped early.
#[derive(Debug)]
pub enum Halt {
    /// Output is staged and rendering is finished. Normal completion.
    Rendered,
    /// A genuine failure.
    Failed(Error),
}

impl Halt {
    /// `None` for the render-finished signal, the failure otherwise.
    pub fn into_error(self) -> Option<Error> {
        match self {
            Self::Rendered => None,
            Self::Failed(e) => Some(e),
        }
    }
}

impl From<Error> for Halt {
    fn from(e: Error) -> Self {
        Self::Failed(e)
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let not_found = Error::RouteNotFound { path: "/nope".into() };
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
        assert_eq!(not_found.public_message(), "no route for [/nope]");

        let forbidden = Error::http(StatusCode::FORBIDDEN, "go away");
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

        let boom = Error::action("database exploded");
        assert_eq!(boom.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(boom.public_message(), "Internal Server Error");
    }

    #[test]
    fn rendered_is_not_an_error() {
        assert!(Halt::Rendered.into_error().is_none());
        let halt: Halt = Error::Panicked("x".into()).into();
        assert!(matches!(halt.into_error(), Some(Error::Panicked(_))));
    }

    #[test]
    fn panic_payloads() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(7_u8)), "non-string panic payload");
    }
}
