//! Segment trie with a backtracking matcher.
//!
//! Nodes live in one arena (`Vec<Node>`) and point at each other by index.
//! The tree is built once by [`Tree::insert`] and only read afterwards, so
//! lookups need no locking.
//!
//! At every node the matcher tries, in order:
//!
//! ```text
//! 1. static child      exact segment equality
//! 2. parameter child   any non-empty segment          (`:name`)
//! 3. wildcard child    everything left, even nothing  (`*name`)
//! ```
//!
//! If a deeper walk down a static or parameter branch fails, the walk comes
//! back and tries the next option at the same node. A parameter capture made
//! on a failed branch is popped before moving on.
//!
//! Request segments are percent-decoded before they are compared, so
//! `/users/john%20doe` reaches a static `/users/john doe` and captures
//! `john doe` for `:name`. A segment that doesn't decode to UTF-8 is
//! matched as sent. Patterns are taken literally.

use std::borrow::Cow;
use std::collections::HashMap;

use http::Method;
use percent_encoding::percent_decode_str;
use tracing::warn;

use super::params::Params;
use crate::error::RouteError;

type NodeId = usize;

const ROOT: NodeId = 0;

/// A named dynamic edge: the parameter or wildcard child of a node.
#[derive(Debug)]
struct Edge {
    name: Box<str>,
    node: NodeId,
}

#[derive(Debug)]
struct Node<T> {
    statics: HashMap<Box<str>, NodeId>,
    param: Option<Edge>,
    /// Always a leaf.
    wildcard: Option<Edge>,
    handlers: HashMap<Method, T>,
}

impl<T> Node<T> {
    fn new() -> Self {
        Self {
            statics: HashMap::new(),
            param: None,
            wildcard: None,
            handlers: HashMap::new(),
        }
    }
}

/// Splits a path into `/`-separated segments. `/` yields none; a trailing
/// slash yields a final empty segment, so `/users` and `/users/` differ.
pub(crate) fn split_path(path: &str) -> Vec<&str> {
    if path == "/" {
        return Vec::new();
    }
    path.strip_prefix('/').unwrap_or(path).split('/').collect()
}

/// Percent-decodes one request segment, keeping it raw if the result would
/// not be UTF-8.
fn decode_segment(seg: &str) -> Cow<'_, str> {
    percent_decode_str(seg).decode_utf8().unwrap_or(Cow::Borrowed(seg))
}

/// The route trie, generic over what it stores per method.
#[derive(Debug)]
pub(crate) struct Tree<T> {
    nodes: Vec<Node<T>>,
}

/// A node reached by [`Tree::at`] together with the parameters captured on
/// the way.
#[derive(Debug)]
pub(crate) struct Match<'t, T> {
    node: &'t Node<T>,
    pub(crate) params: Params,
}

impl<'t, T> Match<'t, T> {
    pub(crate) fn get(&self, method: &Method) -> Option<&'t T> {
        self.node.handlers.get(method)
    }

    /// Registered methods, sorted and joined for an `Allow` header.
    pub(crate) fn allow(&self) -> String {
        let mut methods: Vec<&str> = self.node.handlers.keys().map(Method::as_str).collect();
        methods.sort_unstable();
        methods.join(", ")
    }
}

impl<T> Tree<T> {
    pub(crate) fn new() -> Self {
        Self { nodes: vec![Node::new()] }
    }

    /// Registers `value` for `method` at `pattern`, creating missing nodes.
    ///
    /// Returns the value previously stored for the same method and pattern;
    /// the new one replaces it.
    pub(crate) fn insert(
        &mut self,
        method: Method,
        pattern: &str,
        value: T,
    ) -> Result<Option<T>, RouteError> {
        if !pattern.starts_with('/') {
            return Err(RouteError::MissingLeadingSlash(pattern.to_owned()));
        }

        let segments = split_path(pattern);
        let last = segments.len().saturating_sub(1);
        let mut cur = ROOT;

        for (i, seg) in segments.iter().enumerate() {
            cur = if let Some(name) = seg.strip_prefix('*') {
                if name.is_empty() {
                    return Err(RouteError::EmptyWildcardName(pattern.to_owned()));
                }
                if i != last {
                    return Err(RouteError::WildcardNotLast(pattern.to_owned()));
                }
                self.wildcard_child(cur, name, pattern)?
            } else if let Some(name) = seg.strip_prefix(':') {
                if name.is_empty() {
                    return Err(RouteError::EmptyParamName(pattern.to_owned()));
                }
                self.param_child(cur, name, pattern)
            } else {
                self.static_child(cur, seg)
            };
        }

        Ok(self.nodes[cur].handlers.insert(method, value))
    }

    /// Finds the node for `path`, or `None` if nothing with a handler
    /// matches. The caller decides between route and method-not-allowed.
    pub(crate) fn at(&self, path: &str) -> Option<Match<'_, T>> {
        let segments: Vec<Cow<'_, str>> = split_path(path).into_iter().map(decode_segment).collect();
        let mut params = Params::new();
        let id = self.walk(ROOT, &segments, &mut params)?;
        Some(Match { node: &self.nodes[id], params })
    }

    fn walk(&self, id: NodeId, segments: &[Cow<'_, str>], params: &mut Params) -> Option<NodeId> {
        let node = &self.nodes[id];

        let Some((seg, rest)) = segments.split_first() else {
            if !node.handlers.is_empty() {
                return Some(id);
            }
            return node.wildcard.as_ref().and_then(|edge| self.capture_rest(edge, segments, params));
        };

        if let Some(&child) = node.statics.get(&**seg) {
            if let Some(found) = self.walk(child, rest, params) {
                return Some(found);
            }
        }

        if let Some(edge) = &node.param {
            if !seg.is_empty() {
                params.push(&edge.name, &**seg);
                if let Some(found) = self.walk(edge.node, rest, params) {
                    return Some(found);
                }
                params.pop();
            }
        }

        node.wildcard.as_ref().and_then(|edge| self.capture_rest(edge, segments, params))
    }

    fn capture_rest(&self, edge: &Edge, segments: &[Cow<'_, str>], params: &mut Params) -> Option<NodeId> {
        if self.nodes[edge.node].handlers.is_empty() {
            return None;
        }
        params.push(&edge.name, segments.join("/"));
        Some(edge.node)
    }

    fn push_node(&mut self) -> NodeId {
        self.nodes.push(Node::new());
        self.nodes.len() - 1
    }

    fn static_child(&mut self, parent: NodeId, seg: &str) -> NodeId {
        if let Some(&id) = self.nodes[parent].statics.get(seg) {
            return id;
        }
        let id = self.push_node();
        self.nodes[parent].statics.insert(seg.into(), id);
        id
    }

    fn param_child(&mut self, parent: NodeId, name: &str, pattern: &str) -> NodeId {
        if let Some(edge) = &self.nodes[parent].param {
            if &*edge.name != name {
                warn!(pattern, kept = %edge.name, ignored = name, "parameter renamed at a shared node; keeping the first name");
            }
            return edge.node;
        }
        let id = self.push_node();
        self.nodes[parent].param = Some(Edge { name: name.into(), node: id });
        id
    }

    fn wildcard_child(&mut self, parent: NodeId, name: &str, pattern: &str) -> Result<NodeId, RouteError> {
        if let Some(edge) = &self.nodes[parent].wildcard {
            if &*edge.name != name {
                return Err(RouteError::WildcardConflict {
                    pattern: pattern.to_owned(),
                    existing: edge.name.to_string(),
                    new: name.to_owned(),
                });
            }
            return Ok(edge.node);
        }
        let id = self.push_node();
        self.nodes[parent].wildcard = Some(Edge { name: name.into(), node: id });
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(routes: &[&'static str]) -> Tree<&'static str> {
        let mut tree = Tree::new();
        for pattern in routes {
            tree.insert(Method::GET, pattern, *pattern).unwrap();
        }
        tree
    }

    /// `(pattern that matched, captured params)` for a GET.
    fn lookup(tree: &Tree<&'static str>, path: &str) -> Option<(&'static str, Vec<(String, String)>)> {
        let m = tree.at(path)?;
        let value = *m.get(&Method::GET)?;
        let params = m.params.iter().map(|p| (p.key.clone(), p.value.clone())).collect();
        Some((value, params))
    }

    fn kv(k: &str, v: &str) -> (String, String) {
        (k.to_owned(), v.to_owned())
    }

    #[test]
    fn split_path_edges() {
        assert!(split_path("/").is_empty());
        assert_eq!(split_path("/a/b"), ["a", "b"]);
        assert_eq!(split_path("/a/"), ["a", ""]);
    }

    #[test]
    fn root_and_static() {
        let t = tree(&["/", "/a", "/a/b"]);
        assert_eq!(lookup(&t, "/").unwrap().0, "/");
        assert_eq!(lookup(&t, "/a/b").unwrap().0, "/a/b");
        assert!(lookup(&t, "/a/b/c").is_none());
    }

    #[test]
    fn trailing_slash_is_a_different_path() {
        let t = tree(&["/users"]);
        assert!(lookup(&t, "/users").is_some());
        assert!(t.at("/users/").is_none());
    }

    #[test]
    fn static_beats_param() {
        let t = tree(&["/users/:id", "/users/list"]);
        assert_eq!(lookup(&t, "/users/list").unwrap().0, "/users/list");
        let (route, params) = lookup(&t, "/users/42").unwrap();
        assert_eq!(route, "/users/:id");
        assert_eq!(params, [kv("id", "42")]);
    }

    #[test]
    fn param_never_matches_an_empty_segment() {
        let t = tree(&["/users/:id"]);
        assert!(t.at("/users/").is_none());
    }

    #[test]
    fn wildcard_captures_remaining_path() {
        let t = tree(&["/assets/*path"]);
        assert_eq!(lookup(&t, "/assets").unwrap().1, [kv("path", "")]);
        assert_eq!(lookup(&t, "/assets/").unwrap().1, [kv("path", "")]);
        assert_eq!(lookup(&t, "/assets/a/b.png").unwrap().1, [kv("path", "a/b.png")]);
        assert!(t.at("/assetsX/a").is_none());
    }

    #[test]
    fn param_beats_wildcard_and_wildcard_takes_deeper_paths() {
        let t = tree(&["/assets/:id", "/assets/*path", "/assets/logo.png"]);
        assert_eq!(lookup(&t, "/assets/logo.png").unwrap().0, "/assets/logo.png");

        let (route, params) = lookup(&t, "/assets/123").unwrap();
        assert_eq!(route, "/assets/:id");
        assert_eq!(params, [kv("id", "123")]);

        let (route, params) = lookup(&t, "/assets/a/b").unwrap();
        assert_eq!(route, "/assets/*path");
        assert_eq!(params, [kv("path", "a/b")]);
    }

    #[test]
    fn backtracks_out_of_a_dead_static_branch() {
        let t = tree(&["/a/b/c", "/a/:x/d"]);
        let (route, params) = lookup(&t, "/a/b/d").unwrap();
        assert_eq!(route, "/a/:x/d");
        assert_eq!(params, [kv("x", "b")]);
    }

    #[test]
    fn failed_param_branch_leaves_no_capture_behind() {
        let t = tree(&["/files/:id/meta", "/files/*rest"]);
        let (route, params) = lookup(&t, "/files/7/raw").unwrap();
        assert_eq!(route, "/files/*rest");
        assert_eq!(params, [kv("rest", "7/raw")]);
    }

    #[test]
    fn request_segments_are_percent_decoded() {
        let t = tree(&["/users/:name", "/files/*rest", "/a b"]);
        assert_eq!(lookup(&t, "/users/john%20doe").unwrap().1, [kv("name", "john doe")]);
        assert_eq!(lookup(&t, "/files/x%2Fy/z%21").unwrap().1, [kv("rest", "x/y/z!")]);
        assert_eq!(lookup(&t, "/a%20b").unwrap().0, "/a b");
    }

    #[test]
    fn undecodable_segment_is_matched_raw() {
        let t = tree(&["/users/:name"]);
        assert_eq!(lookup(&t, "/users/%FF").unwrap().1, [kv("name", "%FF")]);
    }

    #[test]
    fn node_without_handlers_is_not_a_match() {
        let t = tree(&["/a/b/c"]);
        assert!(t.at("/a/b").is_none());
    }

    #[test]
    fn multiple_params_keep_order() {
        let t = tree(&["/orgs/:org/repos/:repo"]);
        let (_, params) = lookup(&t, "/orgs/acme/repos/nope").unwrap();
        assert_eq!(params, [kv("org", "acme"), kv("repo", "nope")]);
    }

    #[test]
    fn same_route_twice_overwrites() {
        let mut t: Tree<&str> = Tree::new();
        assert_eq!(t.insert(Method::GET, "/x", "first").unwrap(), None);
        assert_eq!(t.insert(Method::GET, "/x", "second").unwrap(), Some("first"));
        assert_eq!(*t.at("/x").unwrap().get(&Method::GET).unwrap(), "second");
    }

    #[test]
    fn allow_lists_sorted_methods() {
        let mut t: Tree<()> = Tree::new();
        for method in [Method::PUT, Method::GET, Method::DELETE] {
            t.insert(method, "/x", ()).unwrap();
        }
        let m = t.at("/x").unwrap();
        assert!(m.get(&Method::POST).is_none());
        assert_eq!(m.allow(), "DELETE, GET, PUT");
    }

    #[test]
    fn renamed_param_keeps_first_name() {
        let t = tree(&["/items/:id", "/items/:name/edit"]);
        let (_, params) = lookup(&t, "/items/9/edit").unwrap();
        assert_eq!(params, [kv("id", "9")]);
    }

    #[test]
    fn registration_errors() {
        let mut t: Tree<()> = Tree::new();
        assert_eq!(
            t.insert(Method::GET, "a", ()),
            Err(RouteError::MissingLeadingSlash("a".into()))
        );
        assert_eq!(
            t.insert(Method::GET, "/a/:", ()),
            Err(RouteError::EmptyParamName("/a/:".into()))
        );
        assert_eq!(
            t.insert(Method::GET, "/a/*", ()),
            Err(RouteError::EmptyWildcardName("/a/*".into()))
        );
        assert_eq!(
            t.insert(Method::GET, "/a/*x/b", ()),
            Err(RouteError::WildcardNotLast("/a/*x/b".into()))
        );

        t.insert(Method::GET, "/a/*x", ()).unwrap();
        t.insert(Method::POST, "/a/*x", ()).unwrap();
        assert_eq!(
            t.insert(Method::GET, "/a/*y", ()),
            Err(RouteError::WildcardConflict {
                pattern: "/a/*y".into(),
                existing: "x".into(),
                new: "y".into(),
            })
        );
    }
}
