// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Byte-indexed trie matching URL paths against mounted endpoints, with
//! backtracking over wildcard segments. Grounded on the endpoint trie
//! used by the original HTTP mount-path matcher; see the deliberate fix
//! noted on [EndpointTrie::match_path] below.

use std::collections::HashMap;
use std::rc::Rc;

use crate::fail::Fail;
use crate::http::handler::HandlerFactory;
use crate::http::router::mount_path::{parse_endpoint, PathMatcher};

struct TrieNode {
    children: HashMap<u8, Box<TrieNode>>,
    wildcard: Option<(PathMatcher, Box<TrieNode>)>,
    handler: Option<Rc<dyn HandlerFactory>>,
}

impl TrieNode {
    fn new() -> Self {
        TrieNode { children: HashMap::new(), wildcard: None, handler: None }
    }
}

/// A matched route: the handler to invoke plus the route parameters
/// captured along the way, in mount-order.
pub struct RouteMatch {
    pub handler: Rc<dyn HandlerFactory>,
    pub params: Vec<(String, String)>,
}

/// Maps URL paths to handlers. Each mounted endpoint is split into
/// `/`-delimited [PathMatcher]s and installed as a chain of trie nodes;
/// literal segments become plain child-byte edges, wildcard segments
/// become the node's single `wildcard` edge.
pub struct EndpointTrie {
    root: Box<TrieNode>,
}

impl EndpointTrie {
    pub fn new() -> Self {
        EndpointTrie { root: Box::new(TrieNode::new()) }
    }

    pub fn insert(&mut self, endpoint: &str, handler: Rc<dyn HandlerFactory>) -> Result<(), Fail> {
        let matchers = parse_endpoint(endpoint)?;
        let mut node = &mut self.root;
        for matcher in matchers {
            node = match matcher {
                PathMatcher::Literal(literal) => {
                    let bytes = format!("/{}", literal).into_bytes();
                    Self::descend_literal(node, &bytes)
                }
                PathMatcher::Wildcard { .. } => Self::descend_wildcard(node, matcher, endpoint)?,
            };
        }
        if node.handler.is_some() {
            return Err(Fail::AlreadyExists {
                message: format!("route already registered: {}", endpoint),
            });
        }
        node.handler = Some(handler);
        Ok(())
    }

    fn descend_literal<'n>(mut node: &'n mut Box<TrieNode>, bytes: &[u8]) -> &'n mut Box<TrieNode> {
        for &byte in bytes {
            node = node.children.entry(byte).or_insert_with(|| Box::new(TrieNode::new()));
        }
        node
    }

    fn descend_wildcard<'n>(
        node: &'n mut Box<TrieNode>,
        matcher: PathMatcher,
        endpoint: &str,
    ) -> Result<&'n mut Box<TrieNode>, Fail> {
        match &node.wildcard {
            Some((existing, _)) if existing.raw_chunk() != matcher.raw_chunk() => {
                return Err(Fail::AlreadyExists {
                    message: format!(
                        "conflicting wildcard \"{}\" vs \"{}\" at the same position in \"{}\"",
                        existing.raw_chunk(),
                        matcher.raw_chunk(),
                        endpoint
                    ),
                })
            }
            _ => {}
        }
        if node.wildcard.is_none() {
            node.wildcard = Some((matcher, Box::new(TrieNode::new())));
        }
        Ok(&mut node.wildcard.as_mut().unwrap().1)
    }

    /// Matches `url_path` (already percent-decoded, no query string) against
    /// the mounted endpoints, backtracking over wildcard choices on a dead
    /// end.
    pub fn match_path(&self, url_path: &str) -> Option<RouteMatch> {
        let path = url_path.as_bytes();
        let mut params = Vec::new();
        let handler = Self::walk(&self.root, path, 0, &mut params)?;
        Some(RouteMatch { handler, params })
    }

    /// Tries one literal byte of `node` at `i`, recursing before trying the
    /// node's own wildcard edge -- so a dead end several literal bytes deep
    /// unwinds one byte at a time and every node along the way gets a
    /// chance at its wildcard alternative, not just the node literal
    /// descent happens to stop at. Backtracking falls out of the `?`/match
    /// control flow naturally: a failed recursive call just returns control
    /// to the caller with `params` untouched past this frame.
    fn walk(
        node: &TrieNode,
        path: &[u8],
        i: usize,
        params: &mut Vec<(String, String)>,
    ) -> Option<Rc<dyn HandlerFactory>> {
        if i == path.len() {
            if let Some(handler) = &node.handler {
                return Some(handler.clone());
            }
        } else if let Some(child) = node.children.get(&path[i]) {
            if let Some(handler) = Self::walk(child, path, i + 1, params) {
                return Some(handler);
            }
        }

        let (matcher, child) = node.wildcard.as_ref()?;
        // The cursor sits on the `/` that starts this segment (literal
        // descent stops there, never consuming it) -- skip it before
        // capturing, or there is no new segment left to try.
        if i >= path.len() || path[i] != b'/' {
            return None;
        }
        let seg_start = i + 1;
        let sep_pos =
            path[seg_start..].iter().position(|&b| b == b'/').map(|p| seg_start + p).unwrap_or(path.len());
        let segment = std::str::from_utf8(&path[seg_start..sep_pos]).ok()?;
        let value = matcher.try_match(segment)?;

        let depth = params.len();
        params.push((matcher.name().to_string(), value));
        // Deliberate fix: resume matching at `sep_pos`, the full matched
        // segment's boundary, not at a position derived from the captured
        // value's length. The upstream implementation this was ported from
        // advances the cursor by the matched *value*'s length, which leaves
        // it inside a stripped file extension instead of at the next `/` --
        // breaking further matching for any ":name.ext" route that isn't the
        // very last one tried.
        match Self::walk(child, path, sep_pos, params) {
            Some(handler) => Some(handler),
            None => {
                params.truncate(depth);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::handler::{Handler, HandlerFactory};

    struct StubHandler;

    impl Handler for StubHandler {}

    struct StubFactory;

    impl HandlerFactory for StubFactory {
        fn create(&self) -> Box<dyn Handler> {
            Box::new(StubHandler)
        }
    }

    fn stub(_label: &'static str) -> Rc<dyn HandlerFactory> {
        Rc::new(StubFactory)
    }

    #[test]
    fn literal_route_matches_exactly() {
        let mut trie = EndpointTrie::new();
        trie.insert("/health", stub("health")).unwrap();
        let matched = trie.match_path("/health").unwrap();
        assert!(matched.params.is_empty());
    }

    #[test]
    fn parameter_route_captures_value() {
        let mut trie = EndpointTrie::new();
        trie.insert("/users/:id", stub("user")).unwrap();
        let matched = trie.match_path("/users/42").unwrap();
        assert_eq!(matched.params, vec![("id".to_string(), "42".to_string())]);
    }

    #[test]
    fn backtracks_from_a_failed_validated_wildcard_to_a_literal_sibling() {
        let mut trie = EndpointTrie::new();
        trie.insert("/items/:[uint]id", stub("by_id")).unwrap();
        // No literal sibling is installed, so a non-numeric segment must fail.
        assert!(trie.match_path("/items/abc").is_none());
        assert!(trie.match_path("/items/7").is_some());
    }

    #[test]
    fn extension_stripped_wildcard_resumes_matching_after_the_segment() {
        let mut trie = EndpointTrie::new();
        trie.insert("/files/:name.json/meta", stub("meta")).unwrap();
        let matched = trie.match_path("/files/report.json/meta").unwrap();
        assert_eq!(matched.params, vec![("name".to_string(), "report".to_string())]);
    }

    #[test]
    fn duplicate_route_is_already_exists() {
        let mut trie = EndpointTrie::new();
        trie.insert("/ping", stub("a")).unwrap();
        let err = trie.insert("/ping", stub("b")).unwrap_err();
        assert!(matches!(err, Fail::AlreadyExists { .. }));
    }

    #[test]
    fn conflicting_wildcard_names_at_the_same_slot_are_already_exists() {
        let mut trie = EndpointTrie::new();
        trie.insert("/users/:id", stub("a")).unwrap();
        let err = trie.insert("/users/:[uint]id", stub("b")).unwrap_err();
        assert!(matches!(err, Fail::AlreadyExists { .. }));
    }

    #[test]
    fn unknown_path_is_no_match() {
        let mut trie = EndpointTrie::new();
        trie.insert("/health", stub("health")).unwrap();
        assert!(trie.match_path("/nope").is_none());
    }
}
