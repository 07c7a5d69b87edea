//! Server configuration

use super::parser::DEFAULT_MAX_BODY;
use std::path::PathBuf;
use std::time::Duration;

/// Settings shared by every connection of a server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory static resources are served from
    pub document_root: PathBuf,
    /// Appended to request paths that end with `/`
    pub default_resource: String,
    /// Idle time allowed between requests on one connection
    pub keep_alive_timeout: Duration,
    /// Value of the `Server` response header
    pub server_name: String,
    /// Largest accepted request body
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            document_root: PathBuf::from("."),
            default_resource: "index.html".to_string(),
            keep_alive_timeout: Duration::from_secs(10),
            server_name: concat!("embedhttpd/", env!("CARGO_PKG_VERSION")).to_string(),
            max_body_size: DEFAULT_MAX_BODY,
        }
    }
}

impl ServerConfig {
    /// Load settings from `HTTPD_*` environment variables
    ///
    /// Unset or unparsable variables keep their default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = ServerConfig::default();

        if let Some(root) = lookup("HTTPD_ROOT") {
            cfg.document_root = PathBuf::from(root);
        }
        if let Some(index) = lookup("HTTPD_INDEX") {
            cfg.default_resource = index;
        }
        if let Some(secs) = lookup("HTTPD_KEEPALIVE_SECS").and_then(|v| v.parse().ok()) {
            cfg.keep_alive_timeout = Duration::from_secs(secs);
        }
        if let Some(name) = lookup("HTTPD_SERVER_NAME") {
            cfg.server_name = name;
        }
        if let Some(max) = lookup("HTTPD_MAX_BODY").and_then(|v| v.parse().ok()) {
            cfg.max_body_size = max;
        }

        cfg
    }
}
