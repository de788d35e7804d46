//! Incoming HTTP request: the per-request context handed to controllers.

use std::collections::HashMap;

use bytes::Bytes;
use http::HeaderMap;
use url::form_urlencoded;

use crate::method::Method;
use crate::router::HandlerRef;

/// An incoming HTTP request.
///
/// The parameter map starts out holding the decoded query string. Route
/// resolution then adds path parameters, but never over a key the query
/// string already supplied. The dispatcher also records which action the
/// request resolved to before anything observes it.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    params: HashMap<String, String>,
    handler: Option<HandlerRef>,
}

impl Request {
    /// Builds a request from a method and a request target such as
    /// `/users/42?verbose=1`.
    ///
    /// ```rust
    /// use trellis::{Method, Request};
    ///
    /// let req = Request::new(Method::Get, "/search?q=rust&q=ignored");
    /// assert_eq!(req.path(), "/search");
    /// assert_eq!(req.param("q"), Some("rust"));
    /// ```
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        };
        Self {
            method,
            path: path.to_owned(),
            params: query.map(parse_query).unwrap_or_default(),
            query: query.map(str::to_owned),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            handler: None,
        }
    }

    pub(crate) fn from_parts(method: Method, parts: http::request::Parts, body: Bytes) -> Self {
        let target = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path().to_owned(), |pq| pq.as_str().to_owned());
        Self {
            headers: parts.headers,
            body,
            ..Self::new(method, &target)
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn query(&self) -> Option<&str> { self.query.as_deref() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named parameter from the query string or the matched route.
    ///
    /// For a route `/users/:id`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// The action this request resolved to. `None` when nothing matched and
    /// the default handler serves it instead.
    pub fn handler(&self) -> Option<&HandlerRef> {
        self.handler.as_ref()
    }

    pub(crate) fn set_handler(&mut self, handler: Option<HandlerRef>) {
        self.handler = handler;
    }

    /// Adds route-extracted parameters, keeping any key already present.
    pub(crate) fn merge_params(&mut self, extracted: HashMap<String, String>) {
        for (key, value) in extracted {
            self.params.entry(key).or_insert(value);
        }
    }
}

/// Decodes `a=1&b=two`. The first occurrence of a repeated key wins.
fn parse_query(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        params.entry(key.into_owned()).or_insert_with(|| value.into_owned());
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_query_string() {
        let req = Request::new(Method::Get, "/find?name=J%C3%BCrgen&tag=a+b&empty=");
        assert_eq!(req.path(), "/find");
        assert_eq!(req.query(), Some("name=J%C3%BCrgen&tag=a+b&empty="));
        assert_eq!(req.param("name"), Some("Jürgen"));
        assert_eq!(req.param("tag"), Some("a b"));
        assert_eq!(req.param("empty"), Some(""));
    }

    #[test]
    fn merge_keeps_existing_keys() {
        let mut req = Request::new(Method::Get, "/users/42?id=query");
        let extracted = HashMap::from([
            ("id".to_owned(), "42".to_owned()),
            ("section".to_owned(), "posts".to_owned()),
        ]);
        req.merge_params(extracted);
        assert_eq!(req.param("id"), Some("query"));
        assert_eq!(req.param("section"), Some("posts"));
    }

    #[test]
    fn from_parts_keeps_headers_and_body() {
        let (parts, ()) = http::Request::builder()
            .method("POST")
            .uri("http://example.com/users?x=1")
            .header("Content-Type", "application/json")
            .body(())
            .unwrap()
            .into_parts();
        let req = Request::from_parts(Method::Post, parts, Bytes::from_static(b"{}"));
        assert_eq!(req.path(), "/users");
        assert_eq!(req.param("x"), Some("1"));
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.body(), b"{}");
    }
}
