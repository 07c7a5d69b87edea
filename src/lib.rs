//! embedhttpd - embeddable HTTP/1.1 engine
//!
//! This crate provides a blocking, thread-per-connection HTTP/1.1 server core:
//! request parsing, Basic authentication realms, handler dispatch, static file
//! serving with server-side includes, and keep-alive connection management.

pub mod http;

pub use http::{Connection, ServerConfig, ServerRegistry};
