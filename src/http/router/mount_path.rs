// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Parses an endpoint string like `/users/:id.json` or `/files/:[re].*\\.xml`
//! into the chain of [PathMatcher]s an [super::trie::EndpointTrie] node
//! tests a URL path's segments against.

use regex::Regex;

use crate::fail::Fail;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    Uint,
}

pub enum MatcherKind {
    Parameter { extension: Option<String> },
    ValidatedParameter { extension: Option<String>, kind: ParamKind },
    Regex { regex: Regex },
}

/// One path segment's matching rule. `Literal` segments become plain bytes
/// in the trie; everything else becomes a wildcard slot.
pub enum PathMatcher {
    Literal(String),
    Wildcard { raw: String, name: String, kind: MatcherKind },
}

impl PathMatcher {
    /// The original segment text (`":bar.json"`, `":[int]id"`, ...), used
    /// only to detect two routes trying to install incompatible wildcards
    /// at the same trie position.
    pub fn raw_chunk(&self) -> &str {
        match self {
            PathMatcher::Literal(s) => s,
            PathMatcher::Wildcard { raw, .. } => raw,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            PathMatcher::Literal(s) => s,
            PathMatcher::Wildcard { name, .. } => name,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, PathMatcher::Literal(_))
    }

    /// Tests `part` (one `/`-delimited segment of the URL being routed)
    /// against this matcher, returning the captured route-parameter value
    /// on success.
    pub fn try_match(&self, part: &str) -> Option<String> {
        match self {
            PathMatcher::Literal(literal) => {
                literal.eq_ignore_ascii_case(part).then(|| part.to_string())
            }
            PathMatcher::Wildcard { kind, .. } => match kind {
                MatcherKind::Parameter { extension } => {
                    match_with_extension(part, extension.as_deref())
                }
                MatcherKind::ValidatedParameter { extension, kind } => {
                    let candidate = match_with_extension(part, extension.as_deref())?;
                    validate(*kind, &candidate).then_some(candidate)
                }
                MatcherKind::Regex { regex } => {
                    let m = regex.find(part)?;
                    if m.start() != 0 || m.end() != part.len() {
                        return None;
                    }
                    let captures = regex.captures(part)?;
                    Some(match captures.get(1) {
                        Some(group) => group.as_str().to_string(),
                        None => part.to_string(),
                    })
                }
            },
        }
    }
}

fn match_with_extension(part: &str, extension: Option<&str>) -> Option<String> {
    match extension {
        None => Some(part.to_string()),
        Some(extension) => {
            if part.len() <= extension.len() {
                return None;
            }
            let (head, tail) = part.split_at(part.len() - extension.len());
            tail.eq_ignore_ascii_case(extension).then(|| head.to_string())
        }
    }
}

fn validate(kind: ParamKind, candidate: &str) -> bool {
    match kind {
        ParamKind::Uint => !candidate.is_empty() && candidate.bytes().all(|b| b.is_ascii_digit()),
        ParamKind::Int => {
            let digits = candidate.strip_prefix('-').unwrap_or(candidate);
            !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
        }
    }
}

/// Splits an endpoint string into its `/`-delimited segment matchers.
pub fn parse_endpoint(endpoint: &str) -> Result<Vec<PathMatcher>, Fail> {
    let mut matchers = Vec::new();
    let mut unnamed_counter = 0usize;
    for segment in endpoint.split('/').filter(|s| !s.is_empty()) {
        matchers.push(parse_segment(segment, &mut unnamed_counter)?);
    }
    Ok(matchers)
}

fn parse_segment(raw: &str, unnamed_counter: &mut usize) -> Result<PathMatcher, Fail> {
    let Some(rest) = raw.strip_prefix(':') else {
        return Ok(PathMatcher::Literal(raw.to_string()));
    };

    if let Some(after_bracket) = rest.strip_prefix('[') {
        let close = after_bracket.find(']').ok_or_else(|| {
            Fail::invalid_argument(format!("unterminated parameter type in \"{}\"", raw))
        })?;
        let type_name = &after_bracket[..close];
        let remainder = &after_bracket[close + 1..];
        if type_name.is_empty() {
            return Err(Fail::invalid_argument(format!("empty parameter type in \"{}\"", raw)));
        }

        if type_name == "re" {
            *unnamed_counter += 1;
            let regex = Regex::new(remainder)?;
            return Ok(PathMatcher::Wildcard {
                raw: raw.to_string(),
                name: unnamed_counter.to_string(),
                kind: MatcherKind::Regex { regex },
            });
        }

        let kind = match type_name {
            "int" => ParamKind::Int,
            "uint" => ParamKind::Uint,
            other => {
                return Err(Fail::invalid_argument(format!(
                    "unknown parameter validation type \"{}\"",
                    other
                )))
            }
        };
        let (name, extension) = split_name_extension(remainder, raw)?;
        return Ok(PathMatcher::Wildcard {
            raw: raw.to_string(),
            name,
            kind: MatcherKind::ValidatedParameter { extension, kind },
        });
    }

    let (name, extension) = split_name_extension(rest, raw)?;
    Ok(PathMatcher::Wildcard { raw: raw.to_string(), name, kind: MatcherKind::Parameter { extension } })
}

fn split_name_extension(s: &str, raw: &str) -> Result<(String, Option<String>), Fail> {
    match s.find('.') {
        None => {
            validate_alphanumeric(s, raw)?;
            Ok((s.to_string(), None))
        }
        Some(pos) => {
            let (name, extension) = (&s[..pos], &s[pos..]);
            if extension.len() == 1 {
                return Err(Fail::invalid_argument(format!(
                    "empty file extension in \"{}\"",
                    raw
                )));
            }
            validate_alphanumeric(name, raw)?;
            if !extension[1..].bytes().all(|b| b.is_ascii_alphanumeric()) {
                return Err(Fail::invalid_argument(format!(
                    "file extension must be alphanumeric in \"{}\"",
                    raw
                )));
            }
            Ok((name.to_string(), Some(extension.to_string())))
        }
    }
}

fn validate_alphanumeric(name: &str, raw: &str) -> Result<(), Fail> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(Fail::invalid_argument(format!(
            "parameter names must be alphanumeric in \"{}\"",
            raw
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_segment_matches_case_insensitively() {
        let matchers = parse_endpoint("/Foo/bar").unwrap();
        assert_eq!(matchers.len(), 2);
        assert!(matchers[0].try_match("foo").is_some());
        assert!(matchers[0].try_match("baz").is_none());
    }

    #[test]
    fn parameter_with_extension_strips_suffix() {
        let matchers = parse_endpoint("/files/:name.json").unwrap();
        let got = matchers[1].try_match("report.json").unwrap();
        assert_eq!(got, "report");
        assert!(matchers[1].try_match("report.xml").is_none());
    }

    #[test]
    fn validated_uint_rejects_non_digits() {
        let matchers = parse_endpoint("/users/:[uint]id").unwrap();
        assert_eq!(matchers[1].try_match("42").unwrap(), "42");
        assert!(matchers[1].try_match("-1").is_none());
        assert!(matchers[1].try_match("abc").is_none());
    }

    #[test]
    fn validated_int_allows_leading_minus() {
        let matchers = parse_endpoint("/offsets/:[int]n").unwrap();
        assert_eq!(matchers[1].try_match("-7").unwrap(), "-7");
    }

    #[test]
    fn regex_matcher_requires_a_full_match() {
        let matchers = parse_endpoint(r"/assets/:[re].*\.xml").unwrap();
        assert!(matchers[1].try_match("report.xml").is_some());
        assert!(matchers[1].try_match("report.xml.bak").is_none());
    }

    #[test]
    fn unknown_parameter_type_is_rejected() {
        let err = parse_endpoint("/x/:[bogus]y").unwrap_err();
        assert!(matches!(err, Fail::InvalidArgument { .. }));
    }
}
