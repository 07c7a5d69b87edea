//! Per-client connection
//!
//! A [`Connection`] owns one client transport for its whole keep-alive
//! sequence. Each cycle parses a request, checks it against the realm table,
//! dispatches it and then decides whether the transport stays open for the
//! next request. Requests on one connection are strictly sequential.

use super::auth::AuthOutcome;
use super::session::{HttpSession, SessionOps};
use super::{dispatch, Error, HeaderMap, Method, Request, RequestParser, Result, ServerRegistry, Status, Version};
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

const READ_CHUNK: usize = 4096;

/// One client connection and its current request/response state
pub struct Connection {
    pub(super) session: HttpSession<Box<dyn SessionOps + Send>>,
    pub(super) registry: Arc<ServerRegistry>,
    parser: RequestParser,
    pending_input: Vec<u8>,
    pub(super) request: Request,
    pub(super) response_headers: HeaderMap,
    pub(super) pending_headers: HeaderMap,
    pub(super) headers_sent: bool,
    pub(super) force_close: bool,
    pub(super) boundary: Option<String>,
    user: Option<String>,
}

impl Connection {
    /// Create a connection over `session`, sharing `registry`
    pub fn new(session: Box<dyn SessionOps + Send>, registry: Arc<ServerRegistry>) -> Self {
        let config = registry.config();
        let mut session = HttpSession::new(session);
        session.set_timeout(Some(config.keep_alive_timeout));

        Connection {
            session,
            parser: RequestParser::with_max_body(config.max_body_size),
            registry,
            pending_input: Vec::new(),
            request: placeholder_request(),
            response_headers: HeaderMap::new(),
            pending_headers: HeaderMap::new(),
            headers_sent: false,
            force_close: false,
            boundary: None,
            user: None,
        }
    }

    /// The request currently being served
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// User authenticated for the current request, if its path is protected
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Address of the remote peer
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.session.peer_addr()
    }

    /// The registry this connection serves from
    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    /// Whether the status line and headers have gone out already
    pub fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    /// Serve requests until the client goes away or the connection must close
    ///
    /// The transport is closed on return.
    pub fn run(mut self) {
        let span = tracing::debug_span!("connection", peer = ?self.session.peer_addr());
        let _enter = span.enter();

        loop {
            match self.serve_one() {
                Ok(true) => continue,
                Ok(false) => break,
                Err(e) => {
                    debug!(error = %e, "connection aborted");
                    break;
                }
            }
        }

        if let Err(e) = self.session.close() {
            debug!(error = %e, "close failed");
        }
    }

    /// Run one request/response cycle; Ok(true) means keep the connection
    fn serve_one(&mut self) -> Result<bool> {
        self.reset();

        let request = match self.read_request() {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(false),
            Err(Error::Reject(status)) => {
                warn!(status = status.code(), "request rejected");
                self.force_close = true;
                self.respond_error(status)?;
                return Ok(false);
            }
            Err(Error::Timeout) => {
                debug!("read timed out");
                self.force_close = true;
                self.respond_error(Status::REQUEST_TIMEOUT)?;
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        debug!(method = %request.method(), path = request.path(), "request");
        self.request = request;

        let outcome = self
            .registry
            .authorize(self.request.path(), self.request.header("Authorization"));
        match outcome {
            AuthOutcome::Open => {}
            AuthOutcome::Authenticated(user) => self.user = Some(user),
            AuthOutcome::Challenge(realm) => {
                warn!(realm = %realm, path = self.request.path(), "authorization required");
                self.challenge(&realm)?;
                return Ok(self.keep_alive());
            }
            AuthOutcome::UnsupportedScheme => {
                warn!(path = self.request.path(), "unsupported authorization scheme");
                self.respond_error(Status::NOT_IMPLEMENTED)?;
                return Ok(self.keep_alive());
            }
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| dispatch::dispatch(self)));
        match result {
            Ok(Ok(())) => Ok(self.keep_alive()),
            Ok(Err(e @ (Error::Timeout | Error::ConnectionClosed))) => Err(e),
            Ok(Err(e)) => {
                error!(error = %e, path = self.request.path(), "request failed");
                self.fail()?;
                Ok(false)
            }
            Err(_) => {
                error!(path = self.request.path(), "handler panicked");
                self.fail()?;
                Ok(false)
            }
        }
    }

    /// Answer 500 if nothing was sent yet; the connection closes afterwards
    fn fail(&mut self) -> Result<()> {
        self.force_close = true;
        if self.headers_sent {
            return Ok(());
        }
        self.respond_error(Status::INTERNAL_SERVER_ERROR)
    }

    fn reset(&mut self) {
        self.pending_input = self.parser.take_remaining();
        self.parser = RequestParser::with_max_body(self.registry.config().max_body_size);
        self.request = placeholder_request();
        self.response_headers = self.registry.default_headers();
        self.pending_headers.clear();
        self.headers_sent = false;
        self.force_close = false;
        self.boundary = None;
        self.user = None;
    }

    /// Read until a complete request is parsed; Ok(None) on end of stream
    fn read_request(&mut self) -> Result<Option<Request>> {
        let input = std::mem::take(&mut self.pending_input);
        if !input.is_empty() {
            if let Some(request) = self.parser.parse(&input)? {
                return Ok(Some(request));
            }
        }

        let mut buf = [0u8; READ_CHUNK];
        loop {
            let n = self.session.read(&mut buf)?;
            if n == 0 {
                if !self.parser.is_idle() {
                    debug!("peer closed mid-request");
                }
                return Ok(None);
            }

            if let Some(request) = self.parser.parse(&buf[..n])? {
                return Ok(Some(request));
            }
        }
    }

    /// Whether the response being sent ends this connection
    pub(super) fn wants_close(&self) -> bool {
        let request = self.request.headers();
        self.force_close
            || request.has_token("Connection", "close")
            || self.response_headers.has_token("Connection", "close")
            || (!self.request.version().is_http11()
                && !request.has_token("Connection", "keep-alive"))
            || (self.request.method() == Method::Get
                && !self.response_headers.contains("Content-Length"))
    }

    /// Decide keep-alive and re-arm the read timeout for the next request
    fn keep_alive(&mut self) -> bool {
        if self.wants_close() {
            debug!("closing after response");
            return false;
        }

        let timeout = self.keep_alive_timeout();
        self.session.set_timeout(Some(timeout));
        debug!(timeout_ms = timeout.as_millis() as u64, "keeping connection alive");
        true
    }

    /// Server timeout, shortened by a client `Keep-Alive: timeout=N`
    ///
    /// A zero client timeout is ignored.
    fn keep_alive_timeout(&self) -> Duration {
        let server = self.registry.config().keep_alive_timeout;
        let client = self
            .request
            .header("Keep-Alive")
            .and_then(|v| {
                v.split(',')
                    .filter_map(|p| p.trim().strip_prefix("timeout="))
                    .find_map(|secs| secs.trim().parse::<u64>().ok())
                    .filter(|secs| *secs > 0)
            })
            .map(Duration::from_secs);

        match client {
            Some(client) => server.min(client),
            None => server,
        }
    }
}

fn placeholder_request() -> Request {
    Request::new(Method::Get, "/", Version::Http11)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::http::session::PollEvents;
    use crate::http::ServerConfig;
    use parking_lot::Mutex;
    use std::io::Read;

    /// In-memory transport: reads from a fixed input, records all output
    pub(crate) struct MemorySession {
        input: std::io::Cursor<Vec<u8>>,
        output: Arc<Mutex<Vec<u8>>>,
        pub(crate) closed: Arc<Mutex<bool>>,
    }

    impl MemorySession {
        pub(crate) fn new(input: &[u8]) -> (Self, Arc<Mutex<Vec<u8>>>) {
            let output = Arc::new(Mutex::new(Vec::new()));
            let session = MemorySession {
                input: std::io::Cursor::new(input.to_vec()),
                output: Arc::clone(&output),
                closed: Arc::new(Mutex::new(false)),
            };
            (session, output)
        }
    }

    impl SessionOps for MemorySession {
        fn poll(&self, _events: PollEvents, _timeout: Option<Duration>) -> Result<bool> {
            Ok(true)
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            Ok(self.input.read(buf)?)
        }

        fn write(&mut self, buf: &[u8]) -> Result<usize> {
            self.output.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn close(&mut self) -> Result<()> {
            *self.closed.lock() = true;
            Ok(())
        }
    }

    /// Run a connection over `input` and return everything it wrote
    pub(crate) fn exchange(registry: &Arc<ServerRegistry>, input: &[u8]) -> String {
        let (session, output) = MemorySession::new(input);
        Connection::new(Box::new(session), Arc::clone(registry)).run();
        let bytes = output.lock().clone();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn registry() -> Arc<ServerRegistry> {
        let dir = std::env::temp_dir().join("embedhttpd-empty-root-for-tests");
        let config = ServerConfig {
            document_root: dir,
            ..ServerConfig::default()
        };
        Arc::new(ServerRegistry::new(config))
    }

    #[test]
    fn test_eof_before_request_closes_silently() {
        let registry = registry();
        let (session, output) = MemorySession::new(b"");
        let closed = Arc::clone(&session.closed);
        Connection::new(Box::new(session), registry).run();

        assert!(output.lock().is_empty());
        assert!(*closed.lock());
    }

    #[test]
    fn test_rejection_closes() {
        let out = exchange(&registry(), b"GET nope HTTP/1.1\r\nHost: x\r\n\r\nGET / HTTP/1.1\r\n\r\n");
        assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(out.contains("Connection: close\r\n"));
        assert_eq!(out.matches("HTTP/1.1 ").count(), 1);
    }

    #[test]
    fn test_keep_alive_serves_sequential_requests() {
        let registry = registry();
        registry.register_handler("/n", |conn, _| {
            let path = conn.request().path().to_string();
            conn.serve_buffer(Status::OK, "text/plain", path.as_bytes())?;
            Ok(Status::OK)
        });

        let out = exchange(
            &registry,
            b"GET /n/1 HTTP/1.1\r\nHost: x\r\n\r\nGET /n/2 HTTP/1.1\r\nHost: x\r\n\r\n",
        );
        assert_eq!(out.matches("HTTP/1.1 200 OK\r\n").count(), 2);
        assert!(out.contains("/n/1"));
        assert!(out.ends_with("/n/2"));
    }

    #[test]
    fn test_get_without_content_length_closes() {
        let registry = registry();
        registry.register_handler("/page", |conn, _| {
            conn.respond(Status::OK, None)?;
            conn.write_body(b"streamed")?;
            Ok(Status::OK)
        });

        let out = exchange(
            &registry,
            b"GET /page HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\nGET /page HTTP/1.1\r\nHost: x\r\n\r\n",
        );
        assert_eq!(out.matches("HTTP/1.1 200 OK").count(), 1);
        assert!(out.contains("Connection: close\r\n"));
    }

    #[test]
    fn test_http10_closes_unless_keep_alive() {
        let registry = registry();
        registry.register_handler("/", |conn, _| {
            conn.serve_buffer(Status::OK, "text/plain", b"hi")?;
            Ok(Status::OK)
        });

        let out = exchange(&registry, b"GET / HTTP/1.0\r\n\r\nGET / HTTP/1.0\r\n\r\n");
        assert_eq!(out.matches("200 OK").count(), 1);

        let out = exchange(
            &registry,
            b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\nGET / HTTP/1.0\r\n\r\n",
        );
        assert_eq!(out.matches("200 OK").count(), 2);
        assert!(out.contains("Connection: keep-alive\r\n"));
    }

    #[test]
    fn test_client_connection_close() {
        let registry = registry();
        registry.register_handler("/", |conn, _| {
            conn.serve_buffer(Status::OK, "text/plain", b"hi")?;
            Ok(Status::OK)
        });

        let out = exchange(
            &registry,
            b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\nGET / HTTP/1.1\r\nHost: x\r\n\r\n",
        );
        assert_eq!(out.matches("200 OK").count(), 1);
    }

    #[test]
    fn test_handler_error_and_panic_answer_500() {
        let registry = registry();
        registry.register_handler("/err", |_, _| Err(Error::Handler("boom".into())));
        registry.register_handler("/panic", |_, _| panic!("boom"));

        let out = exchange(&registry, b"GET /err HTTP/1.1\r\nHost: x\r\n\r\n");
        assert!(out.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));

        let out = exchange(
            &registry,
            b"GET /panic HTTP/1.1\r\nHost: x\r\n\r\nGET /panic HTTP/1.1\r\nHost: x\r\n\r\n",
        );
        assert_eq!(out.matches("500 Internal Server Error\r\n").count(), 1);
    }

    #[test]
    fn test_keep_alive_timeout_negotiation() {
        let registry = registry();
        let (session, _) = MemorySession::new(b"");
        let mut conn = Connection::new(Box::new(session), Arc::clone(&registry));

        assert_eq!(conn.keep_alive_timeout(), Duration::from_secs(10));

        conn.request
            .headers_mut()
            .set("Keep-Alive", "timeout=3, max=100");
        assert_eq!(conn.keep_alive_timeout(), Duration::from_secs(3));

        conn.request.headers_mut().set("Keep-Alive", "timeout=60");
        assert_eq!(conn.keep_alive_timeout(), Duration::from_secs(10));

        conn.request.headers_mut().set("Keep-Alive", "timeout=0");
        assert_eq!(conn.keep_alive_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_connection_survives_auth_and_resource_errors() {
        let registry = registry();
        registry.protect("lab", "/p");
        registry.register_handler("/open", |conn, _| {
            conn.serve_buffer(Status::OK, "text/plain", b"open")?;
            Ok(Status::OK)
        });

        let out = exchange(
            &registry,
            b"GET /p HTTP/1.1\r\nHost: x\r\n\r\nGET /open HTTP/1.1\r\nHost: x\r\n\r\n",
        );
        assert!(out.starts_with("HTTP/1.1 401 Unauthorized\r\n"));
        assert!(out.contains("HTTP/1.1 200 OK\r\n"));
        assert!(out.ends_with("open"));
        assert!(!out.contains("Connection: close"));

        let out = exchange(
            &registry,
            b"GET /p HTTP/1.1\r\nHost: x\r\nAuthorization: Digest x\r\n\r\n\
              GET /open HTTP/1.1\r\nHost: x\r\n\r\n",
        );
        assert!(out.starts_with("HTTP/1.1 501 Not Implemented\r\n"));
        assert!(out.ends_with("open"));

        let out = exchange(
            &registry,
            b"GET /missing.html HTTP/1.1\r\nHost: x\r\n\r\nGET /open HTTP/1.1\r\nHost: x\r\n\r\n",
        );
        assert!(out.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(out.contains("HTTP/1.1 200 OK\r\n"));
        assert!(out.ends_with("open"));
    }
}
