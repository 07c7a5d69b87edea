//! HTTP request parsing
//!
//! This module provides an incremental request parser. Bytes are fed as they
//! arrive from the transport; the parser reports when a complete request
//! (request line, headers and, for POST/PUT, the body) is available.

use super::{Error, HeaderMap, Method, Request, Result, Status, Version, MAX_LINE};

/// Default cap on request bodies
pub const DEFAULT_MAX_BODY: usize = 1024 * 1024;

/// Empty lines tolerated ahead of a request line
pub const MAX_LEADING_BLANK_LINES: usize = 8;

fn reject(status: Status) -> Error {
    Error::Reject(status)
}

/// Parse an HTTP request line
///
/// Format: METHOD SP TARGET SP VERSION
/// Example: GET /index.html HTTP/1.1
pub fn parse_request_line(line: &str) -> Result<(Method, String, Version)> {
    let parts: Vec<&str> = line.split(' ').collect();

    if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(reject(Status::BAD_REQUEST));
    }

    let method = Method::from_str(parts[0]).ok_or_else(|| reject(Status::BAD_REQUEST))?;

    let target = parts[1];
    let asterisk = target == "*" && method == Method::Options;
    if !target.starts_with('/') && !asterisk {
        return Err(reject(Status::BAD_REQUEST));
    }

    let version = Version::from_str(parts[2]).ok_or_else(|| reject(Status::BAD_REQUEST))?;

    Ok((method, target.to_string(), version))
}

/// Parse a Content-Length value; the whole text must be decimal digits
pub fn parse_content_length(value: &str) -> Result<usize> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(reject(Status::BAD_REQUEST));
    }
    value.parse().map_err(|_| reject(Status::BAD_REQUEST))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ParserState {
    RequestLine,
    Headers,
    Body,
    Complete,
}

/// HTTP request parser
pub struct RequestParser {
    state: ParserState,
    line: Vec<u8>,
    header_bytes: usize,
    blank_lines: usize,
    request: Option<Request>,
    body: Vec<u8>,
    body_remaining: usize,
    remaining: Vec<u8>,
    max_body: usize,
}

impl RequestParser {
    /// Create a new request parser
    pub fn new() -> Self {
        Self::with_max_body(DEFAULT_MAX_BODY)
    }

    /// Create a parser that rejects bodies larger than `max_body` with 413
    pub fn with_max_body(max_body: usize) -> Self {
        RequestParser {
            state: ParserState::RequestLine,
            line: Vec::new(),
            header_bytes: 0,
            blank_lines: 0,
            request: None,
            body: Vec::new(),
            body_remaining: 0,
            remaining: Vec::new(),
            max_body,
        }
    }

    /// Feed data to the parser
    ///
    /// Returns Ok(Some(request)) when a complete request is parsed,
    /// Ok(None) if more data is needed, or Err(Error::Reject) with the status
    /// the client should receive. Bytes following a complete request are kept
    /// and can be retrieved with [`take_remaining`](Self::take_remaining).
    pub fn parse(&mut self, data: &[u8]) -> Result<Option<Request>> {
        let mut pos = 0;

        while pos < data.len() && self.state != ParserState::Complete {
            match self.state {
                ParserState::RequestLine | ParserState::Headers => {
                    let byte = data[pos];
                    pos += 1;
                    self.push_line_byte(byte)?;
                }
                ParserState::Body => {
                    let take = self.body_remaining.min(data.len() - pos);
                    self.body.extend_from_slice(&data[pos..pos + take]);
                    self.body_remaining -= take;
                    pos += take;
                    if self.body_remaining == 0 {
                        self.state = ParserState::Complete;
                    }
                }
                ParserState::Complete => {}
            }
        }

        if self.state != ParserState::Complete {
            return Ok(None);
        }

        self.remaining.extend_from_slice(&data[pos..]);
        let mut request = self
            .request
            .take()
            .ok_or_else(|| reject(Status::BAD_REQUEST))?;
        if !self.body.is_empty() {
            request.set_body(std::mem::take(&mut self.body));
        }
        Ok(Some(request))
    }

    /// True until the first byte of a request line has been seen
    pub fn is_idle(&self) -> bool {
        self.state == ParserState::RequestLine && self.line.is_empty()
    }

    /// Take bytes received after the end of the last complete request
    pub fn take_remaining(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.remaining)
    }

    /// Reset the parser for the next request, keeping the body limit
    pub fn reset(&mut self) {
        *self = Self::with_max_body(self.max_body);
    }

    fn push_line_byte(&mut self, byte: u8) -> Result<()> {
        if self.state == ParserState::Headers {
            self.header_bytes += 1;
            if self.header_bytes > MAX_LINE {
                return Err(reject(Status::PAYLOAD_TOO_LARGE));
            }
        }

        match byte {
            b'\r' => Ok(()),
            b'\n' => {
                let line = std::mem::take(&mut self.line);
                match self.state {
                    ParserState::RequestLine => self.on_request_line(&line),
                    _ => self.on_header_line(&line),
                }
            }
            _ => {
                if self.state == ParserState::RequestLine && self.line.len() >= MAX_LINE {
                    return Err(reject(Status::URI_TOO_LONG));
                }
                self.line.push(byte);
                Ok(())
            }
        }
    }

    fn on_request_line(&mut self, line: &[u8]) -> Result<()> {
        // A few stray blank lines ahead of a request line are ignored
        if line.is_empty() {
            self.blank_lines += 1;
            if self.blank_lines > MAX_LEADING_BLANK_LINES {
                return Err(reject(Status::BAD_REQUEST));
            }
            return Ok(());
        }

        let line = std::str::from_utf8(line).map_err(|_| reject(Status::BAD_REQUEST))?;
        let (method, target, version) = parse_request_line(line)?;

        self.request = Some(Request::new(method, target, version));
        self.state = ParserState::Headers;
        Ok(())
    }

    fn on_header_line(&mut self, line: &[u8]) -> Result<()> {
        if line.is_empty() {
            return self.finish_headers();
        }

        let line = String::from_utf8_lossy(line);
        let (name, value) = HeaderMap::parse_header_line(&line)?;
        let request = self
            .request
            .as_mut()
            .ok_or_else(|| reject(Status::BAD_REQUEST))?;
        request.headers_mut().append(name, value)
    }

    fn finish_headers(&mut self) -> Result<()> {
        let request = self
            .request
            .as_ref()
            .ok_or_else(|| reject(Status::BAD_REQUEST))?;

        if request.version().is_http11() && !request.headers().contains("Host") {
            return Err(reject(Status::BAD_REQUEST));
        }

        if !request.method().has_body() {
            self.state = ParserState::Complete;
            return Ok(());
        }

        let length = request
            .header("Content-Length")
            .ok_or_else(|| reject(Status::BAD_REQUEST))
            .and_then(parse_content_length)?;

        if length > self.max_body {
            return Err(reject(Status::PAYLOAD_TOO_LARGE));
        }

        self.body_remaining = length;
        if length == 0 {
            self.state = ParserState::Complete;
        } else {
            self.body = Vec::with_capacity(length);
            self.state = ParserState::Body;
        }
        Ok(())
    }
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}
