//! HTTP message types
//!
//! This module defines methods, versions, status codes and the parsed request.

use super::headers::HeaderMap;
use super::query::{self, Params};
use super::{Error, Result};
use std::cell::OnceCell;
use std::fmt;

/// HTTP methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
}

impl Method {
    /// Parse method from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::Get),
            "HEAD" => Some(Method::Head),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            "DELETE" => Some(Method::Delete),
            "CONNECT" => Some(Method::Connect),
            "OPTIONS" => Some(Method::Options),
            "TRACE" => Some(Method::Trace),
            "PATCH" => Some(Method::Patch),
            _ => None,
        }
    }

    /// Convert method to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
        }
    }

    /// Methods whose requests carry a Content-Length delimited body
    pub fn has_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// HTTP version
///
/// Any well-formed `HTTP/<digit>.<digit>` is accepted. Only 1.1 gets
/// persistent connections and the mandatory `Host` header by default; every
/// other version is handled like 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Version {
    Http10,
    #[default]
    Http11,
    Other { major: u8, minor: u8 },
}

impl Version {
    /// Parse version from string
    pub fn from_str(s: &str) -> Option<Self> {
        let digits = s.strip_prefix("HTTP/")?.as_bytes();
        let [major, b'.', minor] = digits else {
            return None;
        };
        if !major.is_ascii_digit() || !minor.is_ascii_digit() {
            return None;
        }

        Some(match (major - b'0', minor - b'0') {
            (1, 0) => Version::Http10,
            (1, 1) => Version::Http11,
            (major, minor) => Version::Other { major, minor },
        })
    }

    /// True for HTTP/1.1, the only version with implicit keep-alive
    pub fn is_http11(&self) -> bool {
        *self == Version::Http11
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Http10 => f.write_str("HTTP/1.0"),
            Version::Http11 => f.write_str("HTTP/1.1"),
            Version::Other { major, minor } => write!(f, "HTTP/{}.{}", major, minor),
        }
    }
}

/// HTTP status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status {
    code: u16,
}

impl Status {
    /// Create a new status code
    pub fn new(code: u16) -> Result<Self> {
        if (100..600).contains(&code) {
            Ok(Status { code })
        } else {
            Err(Error::InvalidStatus(format!("Invalid status code: {}", code)))
        }
    }

    /// Get the status code
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Get the canonical reason phrase for this status code
    pub fn reason_phrase(&self) -> &'static str {
        match self.code {
            100 => "Continue",
            101 => "Switching Protocols",
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            203 => "Non-Authoritative Information",
            204 => "No Content",
            205 => "Reset Content",
            206 => "Partial Content",
            300 => "Multiple Choices",
            301 => "Moved Permanently",
            302 => "Found",
            303 => "See Other",
            304 => "Not Modified",
            305 => "Use Proxy",
            307 => "Temporary Redirect",
            400 => "Bad Request",
            401 => "Unauthorized",
            402 => "Payment Required",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            406 => "Not Acceptable",
            407 => "Proxy Authentication Required",
            408 => "Request Timeout",
            409 => "Conflict",
            410 => "Gone",
            411 => "Length Required",
            412 => "Precondition Failed",
            413 => "Payload Too Large",
            414 => "URI Too Long",
            415 => "Unsupported Media Type",
            416 => "Range Not Satisfiable",
            417 => "Expectation Failed",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Gateway Timeout",
            505 => "HTTP Version Not Supported",
            _ => "Unknown",
        }
    }

    /// Check if this is a success status (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Check if this is a client error status (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.code)
    }

    /// Check if this is a server error status (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.code)
    }

    /// Responses that never carry a body or a Content-Type
    pub fn is_bodiless(&self) -> bool {
        self.code < 200 || self.code == 204 || self.code == 304
    }

    // Common status codes as constants
    pub const OK: Status = Status { code: 200 };
    pub const NO_CONTENT: Status = Status { code: 204 };
    pub const NOT_MODIFIED: Status = Status { code: 304 };
    pub const BAD_REQUEST: Status = Status { code: 400 };
    pub const UNAUTHORIZED: Status = Status { code: 401 };
    pub const FORBIDDEN: Status = Status { code: 403 };
    pub const NOT_FOUND: Status = Status { code: 404 };
    pub const REQUEST_TIMEOUT: Status = Status { code: 408 };
    pub const PAYLOAD_TOO_LARGE: Status = Status { code: 413 };
    pub const URI_TOO_LONG: Status = Status { code: 414 };
    pub const INTERNAL_SERVER_ERROR: Status = Status { code: 500 };
    pub const NOT_IMPLEMENTED: Status = Status { code: 501 };
    pub const SERVICE_UNAVAILABLE: Status = Status { code: 503 };
    pub const VERSION_NOT_SUPPORTED: Status = Status { code: 505 };
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.reason_phrase())
    }
}

/// Parsed HTTP request
///
/// `path` is percent-decoded and normalized. Query and body parameters are
/// decoded on first access.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    target: String,
    path: String,
    query: Option<String>,
    version: Version,
    headers: HeaderMap,
    body: Vec<u8>,
    query_params: OnceCell<Params>,
    body_params: OnceCell<Params>,
}

impl Request {
    /// Create a request from its request-line parts
    ///
    /// `target` is the raw request target; it is split, decoded and
    /// normalized here. The asterisk form keeps `*` as its path.
    pub fn new(method: Method, target: impl Into<String>, version: Version) -> Self {
        let target = target.into();
        let (path, query) = if target == "*" {
            ("*".to_string(), None)
        } else {
            let (raw_path, raw_query) = query::split_target(&target);
            (
                query::normalize_path(&query::percent_decode(raw_path)),
                raw_query.map(str::to_string),
            )
        };

        Request {
            method,
            target,
            path,
            query,
            version,
            headers: HeaderMap::new(),
            body: Vec::new(),
            query_params: OnceCell::new(),
            body_params: OnceCell::new(),
        }
    }

    /// Get the request method
    pub fn method(&self) -> Method {
        self.method
    }

    /// Get the raw request target as sent by the client
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Get the decoded, normalized path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get the raw (still encoded) query string
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Get the HTTP version
    pub fn version(&self) -> Version {
        self.version
    }

    /// Get the headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get mutable headers
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Get a header value
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Get the body
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Set the body
    pub fn set_body(&mut self, body: Vec<u8>) {
        self.body = body;
        self.body_params = OnceCell::new();
    }

    /// Decoded query parameters
    pub fn query_params(&self) -> &Params {
        self.query_params
            .get_or_init(|| Params::parse(self.query.as_deref().unwrap_or("")))
    }

    /// Decoded body parameters
    ///
    /// Only URL-encoded bodies are decoded: no Content-Type, or
    /// `application/x-www-form-urlencoded`. Anything else yields no parameters.
    pub fn body_params(&self) -> &Params {
        self.body_params.get_or_init(|| {
            if !self.is_form_body() {
                return Params::default();
            }
            Params::parse(&String::from_utf8_lossy(&self.body))
        })
    }

    /// Look a parameter up in the query, then in the body
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query_params()
            .get(name)
            .or_else(|| self.body_params().get(name))
    }

    /// Declared Content-Length, if present and numeric
    pub fn content_length(&self) -> Option<usize> {
        self.header("Content-Length").and_then(|v| v.parse().ok())
    }

    fn is_form_body(&self) -> bool {
        match self.header("Content-Type") {
            None => true,
            Some(ct) => ct
                .split(';')
                .next()
                .map(|mime| mime.trim().eq_ignore_ascii_case("application/x-www-form-urlencoded"))
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_from_str() {
        assert_eq!(Method::from_str("GET"), Some(Method::Get));
        assert_eq!(Method::from_str("POST"), Some(Method::Post));
        assert_eq!(Method::from_str("get"), None);
        assert!(Method::Put.has_body());
        assert!(!Method::Get.has_body());
    }

    #[test]
    fn test_version_from_str() {
        assert_eq!(Version::from_str("HTTP/1.0"), Some(Version::Http10));
        assert_eq!(Version::from_str("HTTP/1.1"), Some(Version::Http11));
        assert_eq!(
            Version::from_str("HTTP/2.0"),
            Some(Version::Other { major: 2, minor: 0 })
        );
        assert_eq!(Version::from_str("HTTP/1.9").unwrap().to_string(), "HTTP/1.9");
        assert!(!Version::from_str("HTTP/0.9").unwrap().is_http11());
        assert_eq!(Version::from_str("HTTP/1"), None);
        assert_eq!(Version::from_str("HTTP/10.1"), None);
        assert_eq!(Version::from_str("http/1.1"), None);
    }

    #[test]
    fn test_status() {
        let status = Status::new(200).unwrap();
        assert_eq!(status.code(), 200);
        assert_eq!(status.reason_phrase(), "OK");
        assert!(status.is_success());
        assert!(!status.is_client_error());
        assert!(Status::NOT_FOUND.is_client_error());
        assert!(Status::SERVICE_UNAVAILABLE.is_server_error());
        assert!(!Status::NOT_FOUND.is_server_error());
        assert_eq!(Status::URI_TOO_LONG.reason_phrase(), "URI Too Long");
        assert_eq!(Status::VERSION_NOT_SUPPORTED.to_string(), "505 HTTP Version Not Supported");
        assert!(Status::new(99).is_err());
        assert!(Status::NO_CONTENT.is_bodiless());
    }

    #[test]
    fn test_request_target_decoding() {
        let req = Request::new(Method::Get, "/a%20b/../c?x=1&y=two%20words#top", Version::Http11);
        assert_eq!(req.path(), "/c");
        assert_eq!(req.query(), Some("x=1&y=two%20words"));
        assert_eq!(req.query_params().get("y"), Some("two words"));
        assert_eq!(req.param("x"), Some("1"));
    }

    #[test]
    fn test_asterisk_target() {
        let req = Request::new(Method::Options, "*", Version::Http11);
        assert_eq!(req.path(), "*");
        assert_eq!(req.query(), None);
    }

    #[test]
    fn test_body_params_form_only() {
        let mut req = Request::new(Method::Post, "/api", Version::Http11);
        req.set_body(b"name=val1".to_vec());
        assert_eq!(req.body_params().get("name"), Some("val1"));

        let mut req = Request::new(Method::Post, "/api", Version::Http11);
        req.headers_mut().set("Content-Type", "application/json");
        req.set_body(b"name=val1".to_vec());
        assert!(req.body_params().is_empty());

        let mut req = Request::new(Method::Post, "/api", Version::Http11);
        req.headers_mut()
            .set("Content-Type", "application/x-www-form-urlencoded; charset=utf-8");
        req.set_body(b"a=1".to_vec());
        assert_eq!(req.param("a"), Some("1"));
    }
}
