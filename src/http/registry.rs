//! Server-wide registry
//!
//! Everything shared by the connections of one server lives here: handler
//! tables, static aliases, the MIME table, authentication realms, SSI
//! variables, default response headers and the configuration. One registry is
//! created at startup and shared through an `Arc`.
//!
//! ## Locking
//!
//! Every table has its own `RwLock`, so unrelated connections never contend
//! on a global lock. Handlers carry an additional per-entry mutex: two
//! requests for the same handler run one after the other, while different
//! handlers run in parallel. Table locks are always released before a
//! handler is invoked.

use super::auth::{self, AuthOutcome, Realm};
use super::fs::{FileSystem, LocalFileSystem};
use super::query::matches_segment_prefix;
use super::vars::SsiVariable;
use super::{Connection, HeaderMap, Result, ServerConfig, Status};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Opaque per-handler context handed back to the callback on every call
pub type HandlerContext = Arc<dyn Any + Send + Sync>;

/// Handler callback
///
/// The returned status is emitted by the connection when the handler did not
/// respond itself.
pub type HandlerFn = dyn Fn(&mut Connection, &HandlerContext) -> Result<Status> + Send + Sync;

/// A registered handler with its own invocation lock
pub struct HandlerEntry {
    prefix: String,
    callback: Box<HandlerFn>,
    context: HandlerContext,
    lock: Mutex<()>,
}

impl HandlerEntry {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Run the callback while holding this entry's lock
    pub fn invoke(&self, conn: &mut Connection) -> Result<Status> {
        let _guard = self.lock.lock();
        (self.callback)(conn, &self.context)
    }
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

/// Content type of an extension, and whether it goes through SSI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeEntry {
    pub content_type: String,
    pub ssi: bool,
}

impl MimeEntry {
    pub fn new(content_type: impl Into<String>, ssi: bool) -> Self {
        MimeEntry {
            content_type: content_type.into(),
            ssi,
        }
    }
}

const DEFAULT_MIME_TYPES: &[(&str, &str, bool)] = &[
    ("html", "text/html", false),
    ("htm", "text/html", false),
    ("shtml", "text/html", true),
    ("css", "text/css", false),
    ("js", "application/javascript", false),
    ("json", "application/json", false),
    ("txt", "text/plain", false),
    ("xml", "application/xml", false),
    ("png", "image/png", false),
    ("jpg", "image/jpeg", false),
    ("jpeg", "image/jpeg", false),
    ("gif", "image/gif", false),
    ("ico", "image/x-icon", false),
    ("svg", "image/svg+xml", false),
];

/// Shared state of one server
pub struct ServerRegistry {
    config: RwLock<ServerConfig>,
    handlers: RwLock<Vec<Arc<HandlerEntry>>>,
    post_handlers: RwLock<HashMap<String, Arc<HandlerEntry>>>,
    aliases: RwLock<Vec<(String, PathBuf)>>,
    mime_types: RwLock<HashMap<String, MimeEntry>>,
    fallback_mime: RwLock<MimeEntry>,
    realms: RwLock<Vec<Realm>>,
    variables: RwLock<HashMap<String, SsiVariable>>,
    default_headers: RwLock<HeaderMap>,
    file_system: RwLock<Arc<dyn FileSystem>>,
}

impl ServerRegistry {
    /// Create a registry with the default MIME table and no handlers
    pub fn new(config: ServerConfig) -> Self {
        let mime_types = DEFAULT_MIME_TYPES
            .iter()
            .map(|(ext, ct, ssi)| (ext.to_string(), MimeEntry::new(*ct, *ssi)))
            .collect();

        ServerRegistry {
            config: RwLock::new(config),
            handlers: RwLock::new(Vec::new()),
            post_handlers: RwLock::new(HashMap::new()),
            aliases: RwLock::new(Vec::new()),
            mime_types: RwLock::new(mime_types),
            fallback_mime: RwLock::new(MimeEntry::new("application/octet-stream", false)),
            realms: RwLock::new(Vec::new()),
            variables: RwLock::new(HashMap::new()),
            default_headers: RwLock::new(HeaderMap::new()),
            file_system: RwLock::new(Arc::new(LocalFileSystem)),
        }
    }

    // ---------------------------------------------------------------------
    // Handlers
    // ---------------------------------------------------------------------

    /// Register a handler for every request under `prefix`
    pub fn register_handler<F>(&self, prefix: impl Into<String>, handler: F)
    where
        F: Fn(&mut Connection, &HandlerContext) -> Result<Status> + Send + Sync + 'static,
    {
        self.register_handler_with_context(prefix, Arc::new(()), handler);
    }

    /// Register a prefix handler that receives `context` on every call
    ///
    /// A handler already registered for the same prefix is replaced.
    pub fn register_handler_with_context<F>(
        &self,
        prefix: impl Into<String>,
        context: HandlerContext,
        handler: F,
    ) where
        F: Fn(&mut Connection, &HandlerContext) -> Result<Status> + Send + Sync + 'static,
    {
        let entry = Arc::new(new_entry(prefix.into(), context, handler));
        debug!(prefix = %entry.prefix, "handler registered");

        let mut handlers = self.handlers.write();
        handlers.retain(|h| h.prefix != entry.prefix);
        handlers.push(entry);
    }

    /// Register a handler for POST/PUT requests to exactly `path`
    pub fn register_post_handler<F>(&self, path: impl Into<String>, handler: F)
    where
        F: Fn(&mut Connection, &HandlerContext) -> Result<Status> + Send + Sync + 'static,
    {
        self.register_post_handler_with_context(path, Arc::new(()), handler);
    }

    /// Register a POST/PUT handler that receives `context` on every call
    pub fn register_post_handler_with_context<F>(
        &self,
        path: impl Into<String>,
        context: HandlerContext,
        handler: F,
    ) where
        F: Fn(&mut Connection, &HandlerContext) -> Result<Status> + Send + Sync + 'static,
    {
        let entry = Arc::new(new_entry(path.into(), context, handler));
        debug!(path = %entry.prefix, "POST handler registered");
        self.post_handlers.write().insert(entry.prefix.clone(), entry);
    }

    /// Remove the handler and POST handler registered for `prefix`
    ///
    /// Returns true if anything was removed. Invocations already running
    /// finish normally.
    pub fn unregister_handler(&self, prefix: &str) -> bool {
        let mut removed = false;
        {
            let mut handlers = self.handlers.write();
            let before = handlers.len();
            handlers.retain(|h| h.prefix != prefix);
            removed |= handlers.len() != before;
        }
        removed |= self.post_handlers.write().remove(prefix).is_some();
        removed
    }

    /// Longest-prefix handler for `path`, matched on a segment boundary
    pub fn find_handler(&self, path: &str) -> Option<Arc<HandlerEntry>> {
        self.handlers
            .read()
            .iter()
            .filter(|h| matches_segment_prefix(&h.prefix, path))
            .max_by_key(|h| h.prefix.len())
            .cloned()
    }

    /// POST handler registered for exactly `path`
    pub fn find_post_handler(&self, path: &str) -> Option<Arc<HandlerEntry>> {
        self.post_handlers.read().get(path).cloned()
    }

    // ---------------------------------------------------------------------
    // Static resources
    // ---------------------------------------------------------------------

    /// Serve requests under `prefix` from `directory` instead of the root
    pub fn add_alias(&self, prefix: impl Into<String>, directory: impl Into<PathBuf>) {
        let prefix = prefix.into();
        let directory = directory.into();
        let mut aliases = self.aliases.write();
        match aliases.iter_mut().find(|(p, _)| *p == prefix) {
            Some(entry) => entry.1 = directory,
            None => aliases.push((prefix, directory)),
        }
    }

    /// Map a request path onto the file system
    ///
    /// The longest matching alias wins; otherwise the path is taken relative
    /// to the document root. A path ending in `/` gets the default resource
    /// name appended.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let (base, rest) = {
            let aliases = self.aliases.read();
            let alias = aliases
                .iter()
                .filter(|(prefix, _)| matches_segment_prefix(prefix, path))
                .max_by_key(|(prefix, _)| prefix.len());

            match alias {
                Some((prefix, dir)) => (dir.clone(), path[prefix.len()..].to_string()),
                None => (self.config.read().document_root.clone(), path.to_string()),
            }
        };

        let mut resolved = base;
        let relative = rest.trim_start_matches('/');
        if !relative.is_empty() {
            resolved.push(relative);
        }
        if path.ends_with('/') {
            resolved.push(&self.config.read().default_resource);
        }
        resolved
    }

    /// Register (or replace) the content type for a file extension
    pub fn add_mime_type(&self, extension: &str, content_type: impl Into<String>, ssi: bool) {
        self.mime_types.write().insert(
            extension.trim_start_matches('.').to_ascii_lowercase(),
            MimeEntry::new(content_type, ssi),
        );
    }

    /// Set the entry used for unknown extensions
    pub fn set_fallback_mime(&self, content_type: impl Into<String>, ssi: bool) {
        *self.fallback_mime.write() = MimeEntry::new(content_type, ssi);
    }

    /// MIME entry for a file, by case-insensitive extension
    pub fn mime_for(&self, path: &Path) -> MimeEntry {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.mime_types.read().get(&ext.to_ascii_lowercase()).cloned())
            .unwrap_or_else(|| self.fallback_mime.read().clone())
    }

    /// Replace the file-system collaborator
    pub fn set_file_system(&self, file_system: Arc<dyn FileSystem>) {
        *self.file_system.write() = file_system;
    }

    pub fn file_system(&self) -> Arc<dyn FileSystem> {
        self.file_system.read().clone()
    }

    // ---------------------------------------------------------------------
    // Realms
    // ---------------------------------------------------------------------

    /// Protect `prefix` with `realm`, creating the realm if needed
    pub fn protect(&self, realm: &str, prefix: impl Into<String>) {
        let mut realms = self.realms.write();
        realm_entry(&mut realms, realm).add_prefix(prefix);
    }

    /// Allow `user`/`password` into `realm`, creating the realm if needed
    pub fn add_credential(&self, realm: &str, user: impl Into<String>, password: impl Into<String>) {
        let mut realms = self.realms.write();
        realm_entry(&mut realms, realm).add_credential(user, password);
    }

    /// Check `path` against the realm table
    pub fn authorize(&self, path: &str, authorization: Option<&str>) -> AuthOutcome {
        auth::authorize(&self.realms.read(), path, authorization)
    }

    // ---------------------------------------------------------------------
    // SSI variables
    // ---------------------------------------------------------------------

    /// Register (or replace) an SSI variable
    pub fn register_variable(&self, name: impl Into<String>, variable: SsiVariable) {
        self.variables.write().insert(name.into(), variable);
    }

    /// Remove an SSI variable; returns true if it existed
    pub fn unregister_variable(&self, name: &str) -> bool {
        self.variables.write().remove(name).is_some()
    }

    /// Current text of an SSI variable
    pub fn render_variable(&self, name: &str) -> Option<String> {
        self.variables.read().get(name).map(SsiVariable::render)
    }

    // ---------------------------------------------------------------------
    // Default headers and configuration
    // ---------------------------------------------------------------------

    /// Add a header to every response
    pub fn set_default_header(&self, name: impl Into<String>, value: impl Into<String>) {
        self.default_headers.write().set(name, value);
    }

    pub fn remove_default_header(&self, name: &str) -> bool {
        self.default_headers.write().remove(name).is_some()
    }

    /// Snapshot of the default response headers, `Server` included
    pub fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.set("Server", self.config.read().server_name.clone());
        headers.extend_from(&self.default_headers.read());
        headers
    }

    /// Snapshot of the configuration
    pub fn config(&self) -> ServerConfig {
        self.config.read().clone()
    }

    pub fn set_document_root(&self, root: impl Into<PathBuf>) {
        self.config.write().document_root = root.into();
    }

    pub fn set_default_resource(&self, name: impl Into<String>) {
        self.config.write().default_resource = name.into();
    }

    pub fn set_keep_alive_timeout(&self, timeout: Duration) {
        self.config.write().keep_alive_timeout = timeout;
    }

    pub fn set_server_name(&self, name: impl Into<String>) {
        self.config.write().server_name = name.into();
    }

    pub fn set_max_body_size(&self, max: usize) {
        self.config.write().max_body_size = max;
    }
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

fn new_entry<F>(prefix: String, context: HandlerContext, handler: F) -> HandlerEntry
where
    F: Fn(&mut Connection, &HandlerContext) -> Result<Status> + Send + Sync + 'static,
{
    HandlerEntry {
        prefix,
        callback: Box::new(handler),
        context,
        lock: Mutex::new(()),
    }
}

fn realm_entry<'a>(realms: &'a mut Vec<Realm>, name: &str) -> &'a mut Realm {
    match realms.iter().position(|r| r.name() == name) {
        Some(i) => &mut realms[i],
        None => {
            realms.push(Realm::new(name));
            let last = realms.len() - 1;
            &mut realms[last]
        }
    }
}
