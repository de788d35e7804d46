//! Per-method path tries and route resolution.
//!
//! Routing has two phases. A mutable [`Router`] collects registrations at
//! startup. [`Router::freeze`] turns it into an immutable [`RouteTable`]
//! that is shared across worker threads without locks.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Error;
use crate::method::Method;
use crate::request::Request;
use crate::trie::PathTrie;

/// Opaque reference to an action: a controller name plus an action name.
///
/// The controller name is what the [`ControllerFactory`](crate::ControllerFactory)
/// is asked to instantiate. Actions run inside a transaction scope unless
/// marked with [`without_transaction`](HandlerRef::without_transaction), in
/// which case a failure never triggers a rollback.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct HandlerRef {
    controller: Arc<str>,
    action: Arc<str>,
    transactional: bool,
}

impl HandlerRef {
    pub fn new(controller: impl Into<Arc<str>>, action: impl Into<Arc<str>>) -> Self {
        Self {
            controller: controller.into(),
            action: action.into(),
            transactional: true,
        }
    }

    /// Exempts the action from rollback on failure.
    pub fn without_transaction(mut self) -> Self {
        self.transactional = false;
        self
    }

    pub fn controller(&self) -> &str { &self.controller }
    pub fn action(&self) -> &str { &self.action }
    pub fn is_transactional(&self) -> bool { self.transactional }
}

impl fmt::Display for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.controller, self.action)
    }
}

/// A registered (method, pattern, handler) binding.
#[derive(Clone, Debug)]
pub struct Route {
    pub method: Method,
    pub pattern: String,
    pub handler: HandlerRef,
}

/// The application router, in its registration phase.
///
/// One path trie per routable method. Each registration returns `self` so
/// calls chain. The chaining helpers keep the first registration error and
/// [`freeze`](Router::freeze) reports it:
///
/// ```rust
/// use trellis::{HandlerRef, Method, Router};
///
/// # fn main() -> Result<(), trellis::Error> {
/// let routes = Router::new()
///     .on(Method::Get,    "/users/:id", HandlerRef::new("users", "show"))?
///     .on(Method::Delete, "/users/:id", HandlerRef::new("users", "destroy"))?
///     .freeze()?;
/// assert_eq!(routes.len(), 2);
/// # Ok(())
/// # }
/// ```
pub struct Router {
    tries: HashMap<Method, PathTrie<Route>>,
    rejected: Option<Error>,
}

impl Router {
    pub fn new() -> Self {
        let tries = Method::ROUTABLE
            .into_iter()
            .map(|m| (m, PathTrie::new()))
            .collect();
        Self { tries, rejected: None }
    }

    /// Registers `handler` for `method` + `pattern`.
    ///
    /// Registering the same method and pattern again replaces the earlier
    /// handler. Methods outside `GET`, `POST`, `PUT`, `DELETE`, `HEAD` and
    /// `OPTIONS` fail with [`Error::UnsupportedMethod`]. A pattern with
    /// segments after `*`, or with an unnamed parameter, fails with
    /// [`Error::InvalidPattern`] and leaves the router unchanged.
    pub fn on(mut self, method: Method, pattern: &str, handler: HandlerRef) -> Result<Self, Error> {
        self.register(method, pattern, handler)?;
        Ok(self)
    }

    /// Non-consuming form of [`on`](Router::on).
    pub fn register(&mut self, method: Method, pattern: &str, handler: HandlerRef) -> Result<(), Error> {
        let trie = self.tries.get_mut(&method).ok_or_else(|| Error::UnsupportedMethod {
            method,
            pattern: pattern.to_owned(),
        })?;
        let route = Route { method, pattern: pattern.to_owned(), handler: handler.clone() };
        if let Some(old) = trie.insert(pattern, route)? {
            debug!(%method, pattern, replaced = %old.handler, "route overwritten");
        }
        debug!(%method, pattern, handler = %handler, "route registered");
        Ok(())
    }

    pub fn get(self, pattern: &str, handler: HandlerRef) -> Self {
        self.routable(Method::Get, pattern, handler)
    }

    pub fn post(self, pattern: &str, handler: HandlerRef) -> Self {
        self.routable(Method::Post, pattern, handler)
    }

    pub fn put(self, pattern: &str, handler: HandlerRef) -> Self {
        self.routable(Method::Put, pattern, handler)
    }

    pub fn delete(self, pattern: &str, handler: HandlerRef) -> Self {
        self.routable(Method::Delete, pattern, handler)
    }

    pub fn head(self, pattern: &str, handler: HandlerRef) -> Self {
        self.routable(Method::Head, pattern, handler)
    }

    pub fn options(self, pattern: &str, handler: HandlerRef) -> Self {
        self.routable(Method::Options, pattern, handler)
    }

    fn routable(mut self, method: Method, pattern: &str, handler: HandlerRef) -> Self {
        if let Err(e) = self.register(method, pattern, handler) {
            warn!(%method, pattern, "route rejected: {e}");
            self.rejected.get_or_insert(e);
        }
        self
    }

    /// Ends the registration phase.
    ///
    /// Fails with the first error a chaining helper such as
    /// [`get`](Router::get) swallowed.
    pub fn freeze(self) -> Result<RouteTable, Error> {
        match self.rejected {
            Some(e) => Err(e),
            None => Ok(RouteTable { tries: self.tries }),
        }
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

/// The frozen routing table. Read-only; share it behind an `Arc`.
pub struct RouteTable {
    tries: HashMap<Method, PathTrie<Route>>,
}

impl RouteTable {
    /// Finds the route for `request` and merges the extracted path
    /// parameters into it.
    ///
    /// Parameters already on the request (from the query string) win over
    /// path parameters of the same name. On no match the request is left
    /// untouched.
    pub fn resolve(&self, request: &mut Request) -> Option<&Route> {
        let trie = self.tries.get(&request.method())?;
        let mut extracted = HashMap::new();
        let route = trie.retrieve(request.path(), &mut extracted)?;
        request.merge_params(extracted);
        Some(route)
    }

    /// Total number of registered routes across all methods.
    pub fn len(&self) -> usize {
        self.tries.values().map(PathTrie::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users(action: &str) -> HandlerRef {
        HandlerRef::new("users", action)
    }

    #[test]
    fn rejects_unroutable_methods() {
        let err = Router::new()
            .on(Method::Patch, "/users/:id", users("update"))
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnsupportedMethod { method: Method::Patch, .. }));
        assert_eq!(err.to_string(), "can't handle [PATCH] for path [/users/:id]");
    }

    #[test]
    fn resolves_per_method() {
        let routes = Router::new()
            .get("/users/:id", users("show"))
            .delete("/users/:id", users("destroy"))
            .freeze()
            .unwrap();

        let mut get = Request::new(Method::Get, "/users/42");
        assert_eq!(routes.resolve(&mut get).unwrap().handler, users("show"));
        assert_eq!(get.param("id"), Some("42"));

        let mut delete = Request::new(Method::Delete, "/users/42");
        assert_eq!(routes.resolve(&mut delete).unwrap().handler, users("destroy"));

        let mut put = Request::new(Method::Put, "/users/42");
        assert!(routes.resolve(&mut put).is_none());
        assert!(put.params().is_empty());
    }

    #[test]
    fn query_params_win_over_path_params() {
        let routes = Router::new().get("/users/:id", users("show")).freeze().unwrap();

        let mut req = Request::new(Method::Get, "/users/42?id=7");
        routes.resolve(&mut req).unwrap();
        assert_eq!(req.param("id"), Some("7"));

        let mut req = Request::new(Method::Get, "/users/42?other=x");
        routes.resolve(&mut req).unwrap();
        assert_eq!(req.param("id"), Some("42"));
        assert_eq!(req.param("other"), Some("x"));
    }

    #[test]
    fn literal_route_beats_parameter_route() {
        let routes = Router::new()
            .get("/users/:id", users("show"))
            .get("/users/active", users("active"))
            .freeze()
            .unwrap();

        let mut req = Request::new(Method::Get, "/users/active");
        assert_eq!(routes.resolve(&mut req).unwrap().handler, users("active"));
        assert_eq!(req.param("id"), None);
    }

    #[test]
    fn last_registration_wins() {
        let routes = Router::new()
            .get("/", HandlerRef::new("home", "old"))
            .get("/", HandlerRef::new("home", "new"))
            .freeze()
            .unwrap();
        assert_eq!(routes.len(), 1);
        let mut req = Request::new(Method::Get, "/");
        assert_eq!(routes.resolve(&mut req).unwrap().handler.action(), "new");
    }

    #[test]
    fn rejects_segments_after_wildcard() {
        let mut router = Router::new().get("/files/*", HandlerRef::new("files", "tail"));
        let err = router
            .register(Method::Get, "/files/*/meta", HandlerRef::new("files", "meta"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { ref pattern, .. } if pattern == "/files/*/meta"));

        let routes = router.freeze().unwrap();
        assert_eq!(routes.len(), 1);
        let mut req = Request::new(Method::Get, "/files/a/meta");
        assert_eq!(routes.resolve(&mut req).unwrap().handler.action(), "tail");
        assert_eq!(req.param("*"), Some("a/meta"));
    }

    #[test]
    fn chained_invalid_pattern_fails_freeze() {
        let err = Router::new()
            .get("/files/*", HandlerRef::new("files", "tail"))
            .get("/files/*/meta", HandlerRef::new("files", "meta"))
            .freeze()
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "invalid pattern [/files/*/meta]: segments after a wildcard");
    }

    #[test]
    fn rejects_unnamed_parameters() {
        let err = Router::new().on(Method::Get, "/users/:", users("show")).err().unwrap();
        assert!(matches!(err, Error::InvalidPattern { ref pattern, .. } if pattern == "/users/:"));

        let err = Router::new().put("/users/{}", users("update")).freeze().err().unwrap();
        assert_eq!(err.to_string(), "invalid pattern [/users/{}]: empty parameter name");
    }
}
