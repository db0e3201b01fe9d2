// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! A case-insensitive, insertion-stable string map used for both HTTP
//! headers and parsed query parameters.

use std::collections::BTreeMap;

/// Wraps a header or parameter name so that it compares and hashes
/// case-insensitively while still printing in its original case.
#[derive(Clone, Debug, Eq)]
struct CaseInsensitiveKey(String);

impl PartialEq for CaseInsensitiveKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Ord for CaseInsensitiveKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.to_ascii_lowercase().cmp(&other.0.to_ascii_lowercase())
    }
}

impl PartialOrd for CaseInsensitiveKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// An ordered, case-insensitive string-to-string map. Used for both
/// `Header: value` pairs and `?key=value` query parameters, matching the
/// original's single `CaseInsensitiveLess`-ordered map type for both.
#[derive(Clone, Debug, Default)]
pub struct HeaderMap {
    entries: BTreeMap<CaseInsensitiveKey, String>,
}

impl HeaderMap {
    pub fn new() -> Self {
        HeaderMap { entries: BTreeMap::new() }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(CaseInsensitiveKey(name.into()), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(&CaseInsensitiveKey(name.to_string())).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&CaseInsensitiveKey(name.to_string()))
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries.remove(&CaseInsensitiveKey(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.0.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", "text/plain");
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
    }

    #[test]
    fn insert_with_different_case_overwrites() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Id", "1");
        headers.insert("x-id", "2");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("X-ID"), Some("2"));
    }

    #[test]
    fn iteration_is_sorted_case_insensitively() {
        let mut headers = HeaderMap::new();
        headers.insert("beta", "2");
        headers.insert("Alpha", "1");
        let names: Vec<&str> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["Alpha", "beta"]);
    }
}
