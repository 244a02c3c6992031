//! Immutable snapshot of one inbound request.
//!
//! A `RequestValue` is built once per request (from hyper parts or through
//! [`RequestValueBuilder`]) and then only borrowed by matchers, response
//! providers and the request log.

use crate::error::{DecoyError, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use url::Url;

/// Ordered multimap of names to values.
///
/// Names keep the casing of their first occurrence; lookups honour the map's
/// case sensitivity (headers are case-insensitive, query parameters are not).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiMap {
    entries: Vec<(String, Vec<String>)>,
    ignore_case: bool,
}

impl MultiMap {
    pub fn case_insensitive() -> Self {
        Self {
            entries: Vec::new(),
            ignore_case: true,
        }
    }

    pub fn case_sensitive() -> Self {
        Self {
            entries: Vec::new(),
            ignore_case: false,
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(key, _)| {
            if self.ignore_case {
                key.eq_ignore_ascii_case(name)
            } else {
                key == name
            }
        })
    }

    /// Append a value, keeping earlier values for the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.position(&name) {
            Some(idx) => self.entries[idx].1.push(value.into()),
            None => self.entries.push((name, vec![value.into()])),
        }
    }

    pub fn get_all(&self, name: &str) -> Option<&[String]> {
        self.position(name).map(|idx| self.entries[idx].1.as_slice())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for MultiMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, values) in &self.entries {
            map.serialize_entry(name, values)?;
        }
        map.end()
    }
}

/// The single detected representation of a request body.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyData {
    Text(String),
    Json(serde_json::Value),
    /// Not valid UTF-8; the raw bytes live in `RequestValue::body`.
    Bytes,
}

impl BodyData {
    pub fn kind(&self) -> &'static str {
        match self {
            BodyData::Text(_) => "String",
            BodyData::Json(_) => "Json",
            BodyData::Bytes => "Bytes",
        }
    }
}

/// One real inbound request.
#[derive(Debug, Clone)]
pub struct RequestValue {
    /// Upper-cased method
    pub method: String,
    /// Absolute URL including query string
    pub url: Url,
    /// Percent-decoded path
    pub path: String,
    pub path_segments: Vec<String>,
    pub headers: MultiMap,
    /// Header values exactly as received, in arrival order
    pub raw_headers: Vec<(String, Bytes)>,
    pub cookies: BTreeMap<String, String>,
    pub query: MultiMap,
    /// Raw body bytes, forwarded verbatim when proxying
    pub body: Bytes,
    pub body_data: Option<BodyData>,
    pub client_ip: Option<IpAddr>,
    pub timestamp: DateTime<Utc>,
}

impl RequestValue {
    pub fn builder(method: &str, url: &str) -> RequestValueBuilder {
        RequestValueBuilder {
            method: method.to_string(),
            url: url.to_string(),
            headers: Vec::new(),
            body: Bytes::new(),
            client_ip: None,
        }
    }

    /// Build from hyper request parts. The absolute URL is reconstructed from
    /// the `Host` header (or the URI authority) and the path and query.
    pub fn from_parts(
        parts: &hyper::http::request::Parts,
        body: Bytes,
        remote: SocketAddr,
    ) -> Result<Self> {
        let host = parts
            .headers
            .get(hyper::header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| parts.uri.authority().map(|a| a.to_string()))
            .unwrap_or_else(|| "localhost".to_string());
        let scheme = parts.uri.scheme_str().unwrap_or("http");
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!("{scheme}://{host}{path_and_query}");

        let headers = parts
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    Bytes::copy_from_slice(value.as_bytes()),
                )
            })
            .collect();

        Self::assemble(
            parts.method.as_str(),
            &url,
            headers,
            body,
            Some(remote.ip()),
        )
    }

    fn assemble(
        method: &str,
        url: &str,
        raw_headers: Vec<(String, Bytes)>,
        body: Bytes,
        client_ip: Option<IpAddr>,
    ) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| DecoyError::InvalidRequest(format!("Invalid url '{url}': {e}")))?;

        let path = decode(url.path());
        let path_segments = url
            .path_segments()
            .map(|segments| {
                segments
                    .filter(|s| !s.is_empty())
                    .map(decode)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let mut headers = MultiMap::case_insensitive();
        for (name, value) in &raw_headers {
            headers.append(name.clone(), header_text(value));
        }

        let cookies = headers
            .get_all("cookie")
            .map(parse_cookies)
            .unwrap_or_default();

        let mut query = MultiMap::case_sensitive();
        for (name, value) in url.query_pairs() {
            query.append(name.into_owned(), value.into_owned());
        }

        let body_data = detect_body(headers.get("content-type"), &body);

        Ok(Self {
            method: method.to_ascii_uppercase(),
            url,
            path,
            path_segments,
            headers,
            raw_headers,
            cookies,
            query,
            body,
            body_data,
            client_ip,
            timestamp: Utc::now(),
        })
    }

    /// Body as UTF-8 text, if it is valid UTF-8.
    pub fn body_text(&self) -> Option<&str> {
        if self.body.is_empty() {
            return None;
        }
        std::str::from_utf8(&self.body).ok()
    }

    pub fn body_json(&self) -> Option<&serde_json::Value> {
        match self.body_data {
            Some(BodyData::Json(ref value)) => Some(value),
            _ => None,
        }
    }

    /// `scheme://host[:port]` this request was addressed to.
    pub fn origin(&self) -> String {
        self.url.origin().ascii_serialization()
    }

    /// Path plus query string, as sent on the wire.
    pub fn path_and_query(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }
}

/// Builder for requests constructed outside the HTTP transport.
#[derive(Debug, Clone)]
pub struct RequestValueBuilder {
    method: String,
    url: String,
    headers: Vec<(String, Bytes)>,
    body: Bytes,
    client_ip: Option<IpAddr>,
}

impl RequestValueBuilder {
    pub fn header(self, name: &str, value: &str) -> Self {
        self.header_bytes(name, value.to_string())
    }

    /// Header with a value that need not be UTF-8.
    pub fn header_bytes(mut self, name: &str, value: impl Into<Bytes>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    pub fn build(self) -> Result<RequestValue> {
        RequestValue::assemble(
            &self.method,
            &self.url,
            self.headers,
            self.body,
            self.client_ip,
        )
    }
}

/// Header value as text: UTF-8 when valid, otherwise each byte read as
/// ISO-8859-1 so obs-text values still take part in matching.
pub(crate) fn header_text(value: &[u8]) -> String {
    match std::str::from_utf8(value) {
        Ok(text) => text.to_string(),
        Err(_) => value.iter().map(|&b| char::from(b)).collect(),
    }
}

fn decode(value: &str) -> String {
    urlencoding::decode(value)
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

/// Parse every `Cookie` header into a name/value map. Later duplicates win.
fn parse_cookies(values: &[String]) -> BTreeMap<String, String> {
    values
        .iter()
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Detect the body representation from the content type and the bytes.
pub(crate) fn detect_body(content_type: Option<&str>, body: &Bytes) -> Option<BodyData> {
    if body.is_empty() {
        return None;
    }

    let declared_json = content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("json"));
    let text = match std::str::from_utf8(body) {
        Ok(text) => text,
        Err(_) => return Some(BodyData::Bytes),
    };

    let looks_like_json = {
        let trimmed = text.trim_start();
        trimmed.starts_with('{') || trimmed.starts_with('[')
    };
    if declared_json || (content_type.is_none() && looks_like_json) {
        if let Ok(value) = serde_json::from_str(text) {
            return Some(BodyData::Json(value));
        }
    }

    Some(BodyData::Text(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_parses_url_parts() {
        let request = RequestValue::builder("get", "http://localhost:9091/api/hello%20world/x?a=1&a=2&b=3")
            .build()
            .unwrap();

        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/api/hello world/x");
        assert_eq!(request.path_segments, vec!["api", "hello world", "x"]);
        assert_eq!(
            request.query.get_all("a"),
            Some(&["1".to_string(), "2".to_string()][..])
        );
        assert_eq!(request.query.get("b"), Some("3"));
        assert_eq!(request.origin(), "http://localhost:9091");
        assert_eq!(request.path_and_query(), "/api/hello%20world/x?a=1&a=2&b=3");
    }

    #[test]
    fn test_headers_are_case_insensitive_and_ordered() {
        let request = RequestValue::builder("GET", "http://localhost/")
            .header("X-Trace", "one")
            .header("x-trace", "two")
            .header("Accept", "*/*")
            .build()
            .unwrap();

        assert_eq!(
            request.headers.get_all("X-TRACE"),
            Some(&["one".to_string(), "two".to_string()][..])
        );
        let names: Vec<&str> = request.headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["X-Trace", "Accept"]);
    }

    #[test]
    fn test_query_names_are_case_sensitive() {
        let request = RequestValue::builder("GET", "http://localhost/?Name=x")
            .build()
            .unwrap();
        assert!(request.query.contains("Name"));
        assert!(!request.query.contains("name"));
    }

    #[test]
    fn test_cookie_parsing() {
        let request = RequestValue::builder("GET", "http://localhost/")
            .header("Cookie", "session=abc; theme=dark")
            .header("Cookie", "lang=en")
            .build()
            .unwrap();

        assert_eq!(request.cookies.get("session").map(String::as_str), Some("abc"));
        assert_eq!(request.cookies.get("theme").map(String::as_str), Some("dark"));
        assert_eq!(request.cookies.get("lang").map(String::as_str), Some("en"));
    }

    #[test]
    fn test_body_detection() {
        let json_body = RequestValue::builder("POST", "http://localhost/")
            .header("Content-Type", "application/json")
            .body(r#"{"p":42}"#)
            .build()
            .unwrap();
        assert_eq!(json_body.body_json(), Some(&json!({"p": 42})));

        let text_body = RequestValue::builder("POST", "http://localhost/")
            .header("Content-Type", "text/plain")
            .body("{not json")
            .build()
            .unwrap();
        assert_eq!(
            text_body.body_data,
            Some(BodyData::Text("{not json".to_string()))
        );

        let binary = RequestValue::builder("POST", "http://localhost/")
            .body(vec![0xff_u8, 0xfe, 0x00])
            .build()
            .unwrap();
        assert_eq!(binary.body_data, Some(BodyData::Bytes));
        assert_eq!(binary.body.as_ref(), &[0xff, 0xfe, 0x00]);

        let empty = RequestValue::builder("GET", "http://localhost/").build().unwrap();
        assert!(empty.body_data.is_none());
        assert!(empty.body_text().is_none());
    }

    #[test]
    fn test_undeclared_json_is_detected() {
        let request = RequestValue::builder("POST", "http://localhost/")
            .body(r#"[1, 2]"#)
            .build()
            .unwrap();
        assert_eq!(request.body_json(), Some(&json!([1, 2])));
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        assert!(RequestValue::builder("GET", "not a url").build().is_err());
    }

    #[test]
    fn test_from_parts_uses_host_header() {
        let request = hyper::Request::builder()
            .method("PUT")
            .uri("/things/1?x=y")
            .header("host", "mock.local:8080")
            .body(())
            .unwrap();
        let (parts, _) = request.into_parts();
        let remote: SocketAddr = "10.1.2.3:5555".parse().unwrap();

        let value = RequestValue::from_parts(&parts, Bytes::new(), remote).unwrap();
        assert_eq!(value.url.as_str(), "http://mock.local:8080/things/1?x=y");
        assert_eq!(value.client_ip, Some("10.1.2.3".parse().unwrap()));
        assert_eq!(value.method, "PUT");
    }

    #[test]
    fn test_from_parts_keeps_non_ascii_header_values() {
        let request = hyper::Request::builder()
            .uri("/people")
            .header("host", "mock.local")
            .header(
                "x-name",
                hyper::header::HeaderValue::from_bytes("Zoë".as_bytes()).unwrap(),
            )
            .header(
                "x-legacy",
                hyper::header::HeaderValue::from_bytes(&[b'c', b'a', b'f', 0xE9]).unwrap(),
            )
            .body(())
            .unwrap();
        let (parts, _) = request.into_parts();
        let remote: SocketAddr = "10.1.2.3:5555".parse().unwrap();

        let value = RequestValue::from_parts(&parts, Bytes::new(), remote).unwrap();
        assert_eq!(value.headers.get("x-name"), Some("Zoë"));
        assert_eq!(value.headers.get("x-legacy"), Some("café"));

        let raw: Vec<_> = value
            .raw_headers
            .iter()
            .filter(|(name, _)| name != "host")
            .map(|(name, value)| (name.as_str(), &value[..]))
            .collect();
        assert_eq!(
            raw,
            vec![
                ("x-name", "Zoë".as_bytes()),
                ("x-legacy", &[b'c', b'a', b'f', 0xE9][..]),
            ]
        );
    }
}
