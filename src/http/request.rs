// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Parses an incoming HTTP/1.1 request off a [crate::io::BufferedReader].

use crate::fail::Fail;
use crate::http::headers::HeaderMap;
use crate::io::BufferedReader;
use crate::net::CoStream;

/// Bytes allowed for a single request or header line before giving up with
/// `Fail::ResourceExhausted`.
const MAX_LINE_BYTES: usize = 8 * 1024;

#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: String,
    pub raw_path: String,
    pub path: String,
    pub version: String,
    pub headers: HeaderMap,
    pub query_params: HeaderMap,
    pub route_params: HeaderMap,
    pub content_length: usize,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Reads the method line, then header lines up to the blank line that
    /// ends the block, then the body if `Content-Length` named one. Does
    /// not touch route params; the router fills those in once it has
    /// matched a path.
    ///
    /// A source that closes before sending anything at all is reported as
    /// `Fail::Unavailable` -- the ordinary way a keep-alive connection ends.
    /// A source that closes mid-request, after the method line but before
    /// the blank line that terminates the header block, is reported as
    /// `Fail::InvalidArgument`: a real client wouldn't do that.
    pub async fn read_from<S: CoStream>(reader: &mut BufferedReader<S>) -> Result<HttpRequest, Fail> {
        let method_line = match read_line(reader).await? {
            Some(line) => line,
            None => {
                return Err(Fail::Unavailable {
                    message: "connection closed before a request was sent".into(),
                })
            }
        };
        let (method, raw_path, version) = parse_method_line(&method_line)?;
        let (path, query) = split_path_query(&raw_path);
        let query_params = parse_query_params(query);

        let mut headers = HeaderMap::new();
        loop {
            let line = match read_line(reader).await? {
                Some(line) => line,
                None => {
                    return Err(Fail::invalid_argument(
                        "connection closed before the request headers were terminated",
                    ))
                }
            };
            if line.is_empty() {
                break;
            }
            let (name, value) = parse_header_line(&line)?;
            headers.insert(name, value);
        }

        let content_length = parse_content_length(&headers)?;
        let body = if content_length > 0 {
            reader.read(content_length).await?.to_vec()
        } else {
            Vec::new()
        };

        Ok(HttpRequest {
            method,
            raw_path,
            path,
            version,
            headers,
            query_params,
            route_params: HeaderMap::new(),
            content_length,
            body,
        })
    }
}

/// Reads one `\r\n`-terminated line, with the terminator stripped. Returns
/// `None` if the source hit EOF before a `\n` ever showed up -- distinct
/// from `Some(String::new())`, a line that was actually terminated and
/// just happens to be blank (the one ending the header block).
async fn read_line<S: CoStream>(reader: &mut BufferedReader<S>) -> Result<Option<String>, Fail> {
    let raw = reader.read_until(b'\n', MAX_LINE_BYTES).await?;
    if raw.is_empty() {
        return Ok(None);
    }
    let line = std::str::from_utf8(&raw)
        .map_err(|_| Fail::invalid_argument("request line is not valid UTF-8"))?
        .trim_end_matches('\n')
        .trim_end_matches('\r');
    Ok(Some(line.to_string()))
}

fn parse_method_line(line: &str) -> Result<(String, String, String), Fail> {
    let mut parts = line.split(' ');
    let method = parts.next().filter(|s| !s.is_empty());
    let path = parts.next().filter(|s| !s.is_empty());
    let version = parts.next().filter(|s| !s.is_empty());
    match (method, path, version) {
        (Some(method), Some(path), Some(version)) => {
            Ok((method.to_string(), path.to_string(), version.to_string()))
        }
        _ => Err(Fail::invalid_argument(format!("malformed request line: {:?}", line))),
    }
}

fn split_path_query(raw_path: &str) -> (String, &str) {
    match raw_path.find('?') {
        Some(pos) => (raw_path[..pos].to_string(), &raw_path[pos + 1..]),
        None => (raw_path.to_string(), ""),
    }
}

/// `&`-delimited `key=value` pairs; a dangling `key` with no `=` is kept
/// with an empty value, and an empty query string yields an empty map.
fn parse_query_params(query: &str) -> HeaderMap {
    let mut params = HeaderMap::new();
    if query.is_empty() {
        return params;
    }
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        match pair.find('=') {
            Some(pos) => params.insert(&pair[..pos], &pair[pos + 1..]),
            None => params.insert(pair, ""),
        }
    }
    params
}

/// `Name: value` -- the value runs to end of line (the caller has already
/// split on `\r\n`), with leading whitespace after the colon skipped. No
/// trailing-whitespace trim is performed, matching the header value this
/// was ported from.
fn parse_header_line(line: &str) -> Result<(&str, &str), Fail> {
    let colon = line
        .find(':')
        .ok_or_else(|| Fail::invalid_argument(format!("malformed header line: {:?}", line)))?;
    let name = &line[..colon];
    let mut value = &line[colon + 1..];
    while let Some(rest) = value.strip_prefix(' ') {
        value = rest;
    }
    Ok((name, value))
}

/// Requires the entire `Content-Length` value to parse as a non-negative
/// integer; absent header means a zero-length body.
fn parse_content_length(headers: &HeaderMap) -> Result<usize, Fail> {
    match headers.get("Content-Length") {
        None => Ok(0),
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| Fail::invalid_argument(format!("invalid Content-Length: {:?}", value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::DuplexStream;
    use futures::executor::block_on;

    #[test]
    fn parses_method_line_query_and_headers() {
        let (far, near) = DuplexStream::pair();
        far.enqueue(b"GET /users/42?active=true&name= HTTP/1.1\r\nHost: example\r\nContent-Length: 0\r\n\r\n");
        let mut reader = BufferedReader::new(near, 4096);
        let request = block_on(HttpRequest::read_from(&mut reader)).unwrap();
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/users/42");
        assert_eq!(request.query_params.get("active"), Some("true"));
        assert_eq!(request.query_params.get("name"), Some(""));
        assert_eq!(request.headers.get("host"), Some("example"));
        assert_eq!(request.content_length, 0);
    }

    #[test]
    fn reads_body_of_content_length_bytes() {
        let (far, near) = DuplexStream::pair();
        far.enqueue(b"POST /echo HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello");
        let mut reader = BufferedReader::new(near, 4096);
        let request = block_on(HttpRequest::read_from(&mut reader)).unwrap();
        assert_eq!(request.body, b"hello");
    }

    #[test]
    fn malformed_content_length_is_invalid_argument() {
        let (far, near) = DuplexStream::pair();
        far.enqueue(b"GET / HTTP/1.1\r\nContent-Length: abc\r\n\r\n");
        let mut reader = BufferedReader::new(near, 4096);
        let err = block_on(HttpRequest::read_from(&mut reader)).unwrap_err();
        assert!(matches!(err, Fail::InvalidArgument { .. }));
    }

    #[test]
    fn source_closing_before_any_bytes_is_unavailable() {
        let (far, near) = DuplexStream::pair();
        far.close();
        let mut reader = BufferedReader::new(near, 4096);
        let err = block_on(HttpRequest::read_from(&mut reader)).unwrap_err();
        assert!(matches!(err, Fail::Unavailable { .. }));
    }

    #[test]
    fn source_closing_mid_headers_is_invalid_argument() {
        let (far, near) = DuplexStream::pair();
        far.enqueue(b"GET / HTTP/1.1\r\nHost: example\r\n");
        far.close();
        let mut reader = BufferedReader::new(near, 4096);
        let err = block_on(HttpRequest::read_from(&mut reader)).unwrap_err();
        assert!(matches!(err, Fail::InvalidArgument { .. }));
    }

    #[test]
    fn malformed_header_line_is_invalid_argument() {
        let (far, near) = DuplexStream::pair();
        far.enqueue(b"GET / HTTP/1.1\r\nbroken-header\r\n\r\n");
        let mut reader = BufferedReader::new(near, 4096);
        let err = block_on(HttpRequest::read_from(&mut reader)).unwrap_err();
        assert!(matches!(err, Fail::InvalidArgument { .. }));
    }
}
