//! Request dispatch
//!
//! Routing order for an authorized request:
//!
//! 1. `OPTIONS` is answered directly with an `Allow` header
//! 2. a general handler matching the path by longest prefix
//! 3. `GET`/`HEAD` fall back to the static file system
//! 4. `POST`/`PUT` go to the POST handler for the exact path, or get 204
//! 5. anything else is a 400

use super::registry::HandlerEntry;
use super::{Connection, Error, Method, Result, Status};
use tracing::{debug, warn};

const ALL_METHODS: &str = "OPTIONS, GET, HEAD, POST, PUT";

/// Route the connection's current request and produce a response
pub fn dispatch(conn: &mut Connection) -> Result<()> {
    let method = conn.request().method();
    let path = conn.request().path().to_string();

    if method == Method::Options {
        return options(conn, &path);
    }

    if let Some(handler) = conn.registry().find_handler(&path) {
        return invoke(conn, &handler);
    }

    match method {
        Method::Get | Method::Head => serve_static(conn, &path),
        Method::Post | Method::Put => {
            let handler = conn.registry().find_post_handler(&path);
            match handler {
                Some(handler) => invoke(conn, &handler),
                None => {
                    debug!(path = %path, "no POST handler");
                    conn.respond(Status::NO_CONTENT, None)
                }
            }
        }
        _ => {
            debug!(method = %method, "method not routable");
            conn.respond_error(Status::BAD_REQUEST)
        }
    }
}

/// Methods available for `path`, in `Allow` header form
pub fn allowed_methods(conn: &Connection, path: &str) -> String {
    if path == "*" {
        return ALL_METHODS.to_string();
    }

    let registry = conn.registry();
    let general = registry.find_handler(path).is_some();
    let post = registry.find_post_handler(path).is_some();
    let file = registry
        .file_system()
        .stat(&registry.resolve_path(path))
        .is_some();

    let mut methods = vec!["OPTIONS"];
    if general || file {
        methods.extend(["GET", "HEAD"]);
    }
    if general || post {
        methods.extend(["POST", "PUT"]);
    }
    methods.join(", ")
}

fn options(conn: &mut Connection, path: &str) -> Result<()> {
    let allow = allowed_methods(conn, path);
    conn.set_header("Allow", allow);
    conn.respond(Status::NO_CONTENT, None)
}

/// Run a handler and emit its status if it did not respond itself
fn invoke(conn: &mut Connection, handler: &HandlerEntry) -> Result<()> {
    debug!(prefix = handler.prefix(), "invoking handler");
    let status = handler.invoke(conn)?;

    if conn.headers_sent() {
        return Ok(());
    }

    if status.is_bodiless() {
        conn.respond(status, None)
    } else if status.is_success() {
        conn.set_header("Content-Length", "0");
        conn.respond(status, None)
    } else {
        conn.respond_error(status)
    }
}

fn serve_static(conn: &mut Connection, path: &str) -> Result<()> {
    let file = conn.registry().resolve_path(path);

    match conn.serve_file(&file) {
        Ok(_) => Ok(()),
        Err(Error::NotFound(file)) => {
            debug!(file = %file.display(), "not found");
            conn.respond_error(Status::NOT_FOUND)
        }
        Err(Error::Io(e)) if !conn.headers_sent() => {
            warn!(file = %file.display(), error = %e, "cannot open file");
            conn.respond_error(Status::NOT_FOUND)
        }
        Err(e) => Err(e),
    }
}
