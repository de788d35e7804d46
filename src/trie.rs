//! Segment trie for URL patterns.
//!
//! Patterns are split on `/`. Each segment is one of:
//!
//! | Segment | Kind | Binds |
//! |---|---|---|
//! | `users` | literal | nothing |
//! | `:id` or `{id}` | parameter | the segment text under `id` |
//! | `*` | wildcard | the rest of the path under `"*"` |
//!
//! Empty segments are dropped, so `/users//42/` and `/users/42` are the same
//! path. A wildcard must be the last segment, and `:` or `{}` without a name
//! is not a parameter; both are rejected at insert.
//!
//! # Matching policy
//!
//! At every level the lookup order is literal child, then parameter child,
//! then wildcard child, and the first child that exists for the segment is
//! committed to. There is no backtracking: if `/users/active/x` is registered
//! next to `/users/:id/y`, the path `/users/active/y` does *not* match,
//! because `active` commits to the literal branch. Lookup is O(segments).
//!
//! Inserting the same pattern twice overwrites the earlier value. There is no
//! duplicate detection; the last registration wins.

use std::collections::HashMap;

use tracing::warn;

use crate::error::Error;

/// Parameter name a wildcard binds the unmatched tail under.
pub const WILDCARD_PARAM: &str = "*";

enum Segment<'a> {
    Literal(&'a str),
    Param(&'a str),
    Wildcard,
}

impl<'a> Segment<'a> {
    fn parse(raw: &'a str) -> Self {
        if raw == "*" {
            Self::Wildcard
        } else if let Some(name) = raw.strip_prefix(':') {
            Self::Param(name)
        } else if let Some(name) = raw.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
            Self::Param(name)
        } else {
            Self::Literal(raw)
        }
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn parse_pattern(pattern: &str) -> Result<Vec<Segment<'_>>, Error> {
    let invalid = |reason| Error::InvalidPattern { pattern: pattern.to_owned(), reason };
    let mut parsed = Vec::new();
    for raw in segments(pattern) {
        if matches!(parsed.last(), Some(Segment::Wildcard)) {
            return Err(invalid("segments after a wildcard"));
        }
        let segment = Segment::parse(raw);
        if matches!(segment, Segment::Param("")) {
            return Err(invalid("empty parameter name"));
        }
        parsed.push(segment);
    }
    Ok(parsed)
}

struct Node<T> {
    literals: HashMap<String, Node<T>>,
    param: Option<(String, Box<Node<T>>)>,
    wildcard: Option<Box<Node<T>>>,
    value: Option<T>,
}

impl<T> Node<T> {
    fn new() -> Self {
        Self {
            literals: HashMap::new(),
            param: None,
            wildcard: None,
            value: None,
        }
    }
}

/// A path trie mapping URL patterns to values.
pub struct PathTrie<T> {
    root: Node<T>,
    len: usize,
}

impl<T> PathTrie<T> {
    pub fn new() -> Self {
        Self { root: Node::new(), len: 0 }
    }

    /// Number of distinct patterns stored.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stores `value` under `pattern`, returning the value it replaced.
    ///
    /// A wildcard must be the last segment and parameters must be named.
    /// Patterns that break either rule are rejected before the trie is
    /// touched.
    pub fn insert(&mut self, pattern: &str, value: T) -> Result<Option<T>, Error> {
        let parsed = parse_pattern(pattern)?;
        let mut node = &mut self.root;
        for segment in parsed {
            match segment {
                Segment::Literal(text) => {
                    node = node.literals.entry(text.to_owned()).or_insert_with(Node::new);
                }
                Segment::Param(name) => {
                    let (bound, child) =
                        node.param.get_or_insert_with(|| (name.to_owned(), Box::new(Node::new())));
                    if bound.as_str() != name {
                        warn!(pattern, old = %bound, new = name, "parameter renamed at existing position");
                        *bound = name.to_owned();
                    }
                    node = &mut **child;
                }
                Segment::Wildcard => {
                    node = &mut **node.wildcard.get_or_insert_with(|| Box::new(Node::new()));
                }
            }
        }
        let previous = node.value.replace(value);
        if previous.is_none() {
            self.len += 1;
        }
        Ok(previous)
    }

    /// Looks up `path`, binding parameter segments into `params`.
    ///
    /// Returns `None` when nothing matches. `params` may hold partial bindings
    /// from the abandoned walk in that case; callers discard it.
    pub fn retrieve(&self, path: &str, params: &mut HashMap<String, String>) -> Option<&T> {
        let mut node = &self.root;
        let mut rest = path;
        loop {
            let trimmed = rest.trim_start_matches('/');
            if trimmed.is_empty() {
                return node.value.as_ref();
            }
            let (segment, tail) = trimmed.split_once('/').unwrap_or((trimmed, ""));

            if let Some(child) = node.literals.get(segment) {
                node = child;
            } else if let Some((name, child)) = &node.param {
                params.insert(name.clone(), segment.to_owned());
                node = child.as_ref();
            } else if let Some(child) = &node.wildcard {
                params.insert(WILDCARD_PARAM.to_owned(), trimmed.trim_end_matches('/').to_owned());
                return child.value.as_ref();
            } else {
                return None;
            }
            rest = tail;
        }
    }
}

impl<T> Default for PathTrie<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(trie: &'a PathTrie<&'static str>, path: &str) -> (Option<&'a &'static str>, HashMap<String, String>) {
        let mut params = HashMap::new();
        let found = trie.retrieve(path, &mut params);
        (found, params)
    }

    #[test]
    fn literal_and_root() {
        let mut trie = PathTrie::new();
        trie.insert("/", "root").unwrap();
        trie.insert("/health/live", "live").unwrap();

        assert_eq!(lookup(&trie, "/").0, Some(&"root"));
        assert_eq!(lookup(&trie, "").0, Some(&"root"));
        assert_eq!(lookup(&trie, "/health/live").0, Some(&"live"));
        assert_eq!(lookup(&trie, "/health").0, None);
        assert_eq!(lookup(&trie, "/health/live/extra").0, None);
    }

    #[test]
    fn binds_named_parameters() {
        let mut trie = PathTrie::new();
        trie.insert("/users/:id", "colon").unwrap();
        trie.insert("/teams/{team}/members/{member}", "braces").unwrap();

        let (found, params) = lookup(&trie, "/users/42");
        assert_eq!(found, Some(&"colon"));
        assert_eq!(params.get("id").map(String::as_str), Some("42"));

        let (found, params) = lookup(&trie, "/teams/red/members/7");
        assert_eq!(found, Some(&"braces"));
        assert_eq!(params.get("team").map(String::as_str), Some("red"));
        assert_eq!(params.get("member").map(String::as_str), Some("7"));
    }

    #[test]
    fn literal_beats_parameter() {
        let mut trie = PathTrie::new();
        trie.insert("/users/:id", "param").unwrap();
        trie.insert("/users/active", "literal").unwrap();

        let (found, params) = lookup(&trie, "/users/active");
        assert_eq!(found, Some(&"literal"));
        assert!(params.is_empty());
        assert_eq!(lookup(&trie, "/users/9").0, Some(&"param"));
    }

    #[test]
    fn wildcard_captures_tail() {
        let mut trie = PathTrie::new();
        trie.insert("/assets/*", "assets").unwrap();
        trie.insert("/assets/logo.png", "logo").unwrap();

        let (found, params) = lookup(&trie, "/assets/css/site.css/");
        assert_eq!(found, Some(&"assets"));
        assert_eq!(params.get(WILDCARD_PARAM).map(String::as_str), Some("css/site.css"));
        assert_eq!(lookup(&trie, "/assets/logo.png").0, Some(&"logo"));
        assert_eq!(lookup(&trie, "/assets").0, None);
    }

    #[test]
    fn no_backtracking_after_literal_commit() {
        let mut trie = PathTrie::new();
        trie.insert("/users/active/list", "literal").unwrap();
        trie.insert("/users/:id/edit", "param").unwrap();

        assert_eq!(lookup(&trie, "/users/7/edit").0, Some(&"param"));
        assert_eq!(lookup(&trie, "/users/active/edit").0, None);
    }

    #[test]
    fn last_registration_wins() {
        let mut trie = PathTrie::new();
        assert_eq!(trie.insert("/a/b", "first").unwrap(), None);
        assert_eq!(trie.insert("a//b/", "second").unwrap(), Some("first"));
        assert_eq!(trie.len(), 1);
        assert_eq!(lookup(&trie, "/a/b").0, Some(&"second"));
    }

    #[test]
    fn parameter_rename_applies_to_position() {
        let mut trie = PathTrie::new();
        trie.insert("/posts/:id", "show").unwrap();
        trie.insert("/posts/:slug/comments", "comments").unwrap();

        let (found, params) = lookup(&trie, "/posts/hello");
        assert_eq!(found, Some(&"show"));
        assert_eq!(params.get("slug").map(String::as_str), Some("hello"));
        assert!(!params.contains_key("id"));
    }

    #[test]
    fn empty_segments_ignored() {
        let mut trie = PathTrie::new();
        trie.insert("/users/:id", "user").unwrap();
        let (found, params) = lookup(&trie, "//users//42/");
        assert_eq!(found, Some(&"user"));
        assert_eq!(params["id"], "42");
    }

    #[test]
    fn rejects_segments_after_wildcard() {
        let mut trie = PathTrie::new();
        trie.insert("/files/*", "tail").unwrap();

        let err = trie.insert("/files/*/meta", "meta").unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { ref pattern, .. } if pattern == "/files/*/meta"));
        assert_eq!(trie.len(), 1);

        let (found, params) = lookup(&trie, "/files/a/b");
        assert_eq!(found, Some(&"tail"));
        assert_eq!(params[WILDCARD_PARAM], "a/b");
    }

    #[test]
    fn rejects_unnamed_parameters() {
        let mut trie: PathTrie<&str> = PathTrie::new();
        assert!(matches!(trie.insert("/users/:", "colon"), Err(Error::InvalidPattern { .. })));
        assert!(matches!(trie.insert("/users/{}", "braces"), Err(Error::InvalidPattern { .. })));
        assert!(trie.is_empty());
        assert_eq!(lookup(&trie, "/users/42").0, None);
    }
}
