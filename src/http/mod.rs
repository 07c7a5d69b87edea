//! HTTP/1.1 engine
//!
//! This module implements the server side of HTTP/1.1 on top of a blocking
//! byte transport.
//!
//! # Architecture
//!
//! The transport is abstracted by the [`SessionOps`] trait, so the protocol
//! code never knows how bytes actually travel:
//!
//! - `SessionOps` defines operations (poll, read, write, close, peer address)
//! - `HttpSession` adds the read/write timeout on top of any `SessionOps`
//! - `Connection` runs the request loop for one client over an `HttpSession`
//! - `ServerRegistry` holds everything shared by all connections: handlers,
//!   aliases, MIME types, realms, SSI variables and default headers
//!
//! ```text
//!   Idle ──► ParsingRequest ──► Authorizing ──► Dispatching ──► Responding
//!    ▲                                                              │
//!    └──────────────── keep-alive ◄─────────────────────────────────┤
//!                                                                   ▼
//!                                                                 Closed
//! ```
//!
//! # Examples
//!
//! ```no_run
//! use embedhttpd::http::{Connection, ServerConfig, ServerRegistry, Status};
//! use embedhttpd::http::session::FdSessionOps;
//! use std::net::TcpListener;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(ServerRegistry::new(ServerConfig::default()));
//! registry.register_handler("/hello", |conn, _ctx| {
//!     conn.serve_buffer(Status::OK, "text/plain", b"Hello")?;
//!     Ok(Status::OK)
//! });
//!
//! let listener = TcpListener::bind("127.0.0.1:8080").unwrap();
//! for stream in listener.incoming() {
//!     let registry = Arc::clone(&registry);
//!     let session = FdSessionOps::new(stream.unwrap());
//!     std::thread::spawn(move || Connection::new(Box::new(session), registry).run());
//! }
//! ```

pub mod auth;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod fs;
pub mod headers;
pub mod listener;
pub mod message;
pub mod parser;
pub mod query;
pub mod registry;
pub mod response;
pub mod session;
pub mod template;
pub mod vars;

pub use config::ServerConfig;
pub use connection::Connection;
pub use headers::HeaderMap;
pub use listener::Listener;
pub use message::{Method, Request, Status, Version};
pub use parser::RequestParser;
pub use registry::{HandlerContext, ServerRegistry};
pub use session::{HttpSession, SessionOps};
pub use vars::{SsiValue, SsiVariable};

use std::path::PathBuf;

/// Result type for HTTP operations
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP operation errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The request is malformed or unacceptable; the client gets this status.
    #[error("Request rejected: {0}")]
    Reject(Status),

    #[error("Invalid HTTP status: {0}")]
    InvalidStatus(String),

    #[error("Resource not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Handler failed: {0}")]
    Handler(String),

    #[error("Timeout")]
    Timeout,

    #[error("Connection closed")]
    ConnectionClosed,
}

/// Maximum size of the request line, and of the whole header block
pub const MAX_LINE: usize = 8192;

/// CRLF line ending
pub const CRLF: &str = "\r\n";
