//! Response emission
//!
//! The status line and header block are written at most once per request.
//! Headers set after that are buffered and go out, followed by a blank line,
//! on the next [`Connection::respond`] call. That is how the parts of a
//! `multipart/x-mixed-replace` stream get their own headers.

use super::{auth, template, Connection, Error, HeaderMap, Method, Result, Status, CRLF};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, trace, warn};

impl Connection {
    /// Set an outbound header, replacing an earlier value
    ///
    /// Once the header block is out, the header is queued for the next
    /// [`respond`](Self::respond) call instead.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        if self.headers_sent {
            self.pending_headers.set(name, value);
        } else {
            self.response_headers.set(name, value);
        }
    }

    /// Value of an outbound header
    pub fn response_header(&self, name: &str) -> Option<&str> {
        self.response_headers.get(name)
    }

    /// Write the status line and headers
    ///
    /// The first call per request emits `HTTP/1.1 <code> <reason>` plus every
    /// header set so far. Later calls only flush headers queued since then,
    /// followed by a blank line.
    pub fn respond(&mut self, status: Status, reason: Option<&str>) -> Result<()> {
        let mut wire = Vec::with_capacity(256);

        if self.headers_sent {
            self.pending_headers.write_wire(&mut wire);
            self.pending_headers.clear();
            wire.extend_from_slice(CRLF.as_bytes());
            return self.session.write_all(&wire);
        }

        if !status.is_bodiless() {
            self.response_headers.set_default("Content-Type", "text/html");
        }
        self.response_headers
            .set_default("Date", httpdate::fmt_http_date(SystemTime::now()));

        if self.wants_close() {
            self.response_headers.set("Connection", "close");
        } else if !self.request.version().is_http11() {
            self.response_headers.set("Connection", "keep-alive");
        }

        let reason = reason.unwrap_or_else(|| status.reason_phrase());
        wire.extend_from_slice(format!("HTTP/1.1 {} {}\r\n", status.code(), reason).as_bytes());
        self.response_headers.write_wire(&mut wire);
        wire.extend_from_slice(CRLF.as_bytes());

        trace!(status = status.code(), "sending response headers");
        self.headers_sent = true;
        self.session.write_all(&wire)
    }

    /// Write body bytes; nothing is sent for HEAD requests
    pub fn write_body(&mut self, data: &[u8]) -> Result<()> {
        if self.request.method() == Method::Head {
            return Ok(());
        }
        self.session.write_all(data)
    }

    /// Send a complete response from a buffer
    pub fn serve_buffer(&mut self, status: Status, content_type: &str, body: &[u8]) -> Result<()> {
        self.set_header("Content-Type", content_type);
        self.set_header("Content-Length", body.len().to_string());
        self.respond(status, None)?;
        self.write_body(body)
    }

    /// Send a file through the registry's file system
    ///
    /// Files whose MIME entry is flagged for SSI are run through the template
    /// processor and sent without a Content-Length. Returns the number of body
    /// bytes written. A missing file yields [`Error::NotFound`] before anything
    /// is sent.
    pub fn serve_file(&mut self, path: &Path) -> Result<u64> {
        let fs = self.registry.file_system();
        let stat = fs
            .stat(path)
            .ok_or_else(|| Error::NotFound(path.to_path_buf()))?;
        let mime = self.registry.mime_for(path);
        let mut reader = fs.open(path)?;

        self.set_header("Content-Type", mime.content_type.as_str());

        if mime.ssi {
            self.respond(Status::OK, None)?;
            if self.request.method() == Method::Head {
                return Ok(0);
            }

            let registry = Arc::clone(&self.registry);
            let written = template::render(reader, &mut self.session, |name| {
                registry.render_variable(name)
            })?;
            debug!(path = %path.display(), bytes = written, "served template");
            return Ok(written);
        }

        self.set_header("Content-Length", stat.len.to_string());
        if let Some(modified) = stat.modified {
            self.set_header("Last-Modified", httpdate::fmt_http_date(modified));
        }
        self.respond(Status::OK, None)?;
        if self.request.method() == Method::Head {
            return Ok(0);
        }

        let written = io::copy(&mut reader, &mut self.session)?;
        debug!(path = %path.display(), bytes = written, "served file");
        Ok(written)
    }

    /// Send a small HTML error page for `status`
    pub fn respond_error(&mut self, status: Status) -> Result<()> {
        if self.headers_sent {
            warn!(status = status.code(), "headers already sent, cannot send error page");
            return Ok(());
        }

        if status.is_bodiless() {
            return self.respond(status, None);
        }

        let body = error_page(status);
        self.serve_buffer(status, "text/html", body.as_bytes())
    }

    /// Answer 401 with a Basic challenge for `realm`
    pub fn challenge(&mut self, realm: &str) -> Result<()> {
        self.set_header("WWW-Authenticate", auth::challenge(realm));
        self.respond_error(Status::UNAUTHORIZED)
    }

    /// Start a `multipart/x-mixed-replace` response
    pub fn begin_multipart(&mut self, boundary: &str) -> Result<()> {
        self.set_header(
            "Content-Type",
            format!("multipart/x-mixed-replace; boundary={}", boundary),
        );
        self.boundary = Some(boundary.to_string());
        self.respond(Status::OK, None)
    }

    /// Send one part of a multipart response
    pub fn send_part(&mut self, content_type: &str, data: &[u8]) -> Result<()> {
        let boundary = self
            .boundary
            .clone()
            .ok_or_else(|| Error::Handler("multipart response not started".into()))?;

        self.write_body(format!("--{}\r\n", boundary).as_bytes())?;

        let mut part = HeaderMap::new();
        part.set("Content-Type", content_type);
        part.set("Content-Length", data.len().to_string());
        self.pending_headers = part;
        if self.request.method() == Method::Head {
            self.pending_headers.clear();
            return Ok(());
        }
        self.respond(Status::OK, None)?;

        self.write_body(data)?;
        self.write_body(CRLF.as_bytes())
    }

    /// Close a multipart response with the final boundary
    pub fn end_multipart(&mut self) -> Result<()> {
        match self.boundary.take() {
            Some(boundary) => self.write_body(format!("--{}--\r\n", boundary).as_bytes()),
            None => Ok(()),
        }
    }
}

fn error_page(status: Status) -> String {
    format!(
        "<html><head><title>{0}</title></head><body><h1>{0}</h1></body></html>\n",
        status
    )
}
