//! HTTP header map
//!
//! This module provides the header collection used for both request and
//! response headers: case-insensitive names, one entry per name, insertion
//! order preserved for output.

use super::{Error, Result, Status};
use std::fmt;

/// HTTP header map
///
/// Names are compared case-insensitively and are unique. Setting an existing
/// name overwrites its value in place, so output order is first-insertion
/// order.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    headers: Vec<(String, String)>,
}

impl HeaderMap {
    /// Create a new empty header map
    pub fn new() -> Self {
        HeaderMap {
            headers: Vec::new(),
        }
    }

    /// Set a header, replacing any existing value for the same name
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        match self.position(&name) {
            Some(i) => self.headers[i].1 = value,
            None => self.headers.push((name, value)),
        }
    }

    /// Set a header only if no value exists for it yet
    ///
    /// Returns true if the header was inserted.
    pub fn set_default(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.headers.push((name, value.into()));
        true
    }

    /// Add an inbound header value
    ///
    /// A repeated name gets the new value appended after a comma. A repeated
    /// `Host` makes the request ambiguous and is rejected with 400.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let name = name.into();
        let value = value.into();

        match self.position(&name) {
            Some(_) if name.eq_ignore_ascii_case("Host") => Err(Error::Reject(Status::BAD_REQUEST)),
            Some(i) => {
                let existing = &mut self.headers[i].1;
                existing.push(',');
                existing.push_str(&value);
                Ok(())
            }
            None => {
                self.headers.push((name, value));
                Ok(())
            }
        }
    }

    /// Get the value of a header (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.headers[i].1.as_str())
    }

    /// Check if a header exists
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Check whether a comma-separated header contains `token` (case-insensitive)
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.get(name)
            .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
            .unwrap_or(false)
    }

    /// Remove a header, returning its value
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name).map(|i| self.headers.remove(i).1)
    }

    /// Get the number of headers
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Check if there are no headers
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Clear all headers
    pub fn clear(&mut self) {
        self.headers.clear();
    }

    /// Iterate over all headers in output order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Copy every header of `other` into this map, overwriting duplicates
    pub fn extend_from(&mut self, other: &HeaderMap) {
        for (name, value) in other.iter() {
            self.set(name, value);
        }
    }

    /// Serialize as `Name: value\r\n` lines
    pub fn write_wire(&self, buf: &mut Vec<u8>) {
        for (name, value) in self.iter() {
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(super::CRLF.as_bytes());
        }
    }

    /// Parse a header line into name and value
    ///
    /// The value is trimmed; the name must be non-empty and free of whitespace.
    pub fn parse_header_line(line: &str) -> Result<(String, String)> {
        let (name, value) = line
            .split_once(':')
            .ok_or(Error::Reject(Status::BAD_REQUEST))?;

        if name.is_empty() || name.bytes().any(|b| b.is_ascii_whitespace()) {
            return Err(Error::Reject(Status::BAD_REQUEST));
        }

        Ok((name.to_string(), value.trim().to_string()))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for HeaderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.headers {
            writeln!(f, "{}: {}", name, value)?;
        }
        Ok(())
    }
}

impl FromIterator<(String, String)> for HeaderMap {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut headers = HeaderMap::new();
        for (name, value) in iter {
            headers.set(name, value);
        }
        headers
    }
}
