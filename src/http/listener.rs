//! Thread-per-connection accept loop
//!
//! [`Listener`] binds a TCP socket and hands every accepted stream to a
//! [`Connection`] running on its own OS thread. The number of live
//! connections is bounded; a client arriving while the bound is reached gets
//! a bare 503 and is closed.

use super::session::FdSessionOps;
use super::{Connection, Result, ServerRegistry};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Default bound on simultaneously served connections
pub const DEFAULT_MAX_CONNECTIONS: usize = 64;

const BACKLOG: i32 = 128;

const LINGER: Duration = Duration::from_millis(100);

const BUSY_RESPONSE: &[u8] =
    b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

/// Accepts connections and serves each on its own thread
pub struct Listener {
    listener: TcpListener,
    registry: Arc<ServerRegistry>,
    max_connections: usize,
    active: Arc<AtomicUsize>,
}

impl Listener {
    /// Bind to `addr` with address reuse enabled
    pub fn bind(addr: SocketAddr, registry: Arc<ServerRegistry>) -> Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(BACKLOG)?;

        let listener: TcpListener = socket.into();
        info!(addr = %listener.local_addr()?, "listening");

        Ok(Listener {
            listener,
            registry,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Limit the number of connections served at once
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max.max(1);
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Number of connections currently being served
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Accept connections forever
    ///
    /// Only a failure of the listening socket itself ends the loop.
    pub fn serve(&self) -> Result<()> {
        loop {
            self.accept_one()?;
        }
    }

    /// Accept a single connection and start serving it
    pub fn accept_one(&self) -> Result<()> {
        let (stream, peer) = match self.listener.accept() {
            Ok(accepted) => accepted,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => {
                error!(error = %e, "accept failed");
                return Err(e.into());
            }
        };

        if self.active.fetch_add(1, Ordering::SeqCst) >= self.max_connections {
            self.active.fetch_sub(1, Ordering::SeqCst);
            warn!(peer = %peer, "connection limit reached");
            refuse(stream);
            return Ok(());
        }

        debug!(peer = %peer, "accepted");
        let registry = Arc::clone(&self.registry);
        let guard = ActiveGuard(Arc::clone(&self.active));

        let spawned = thread::Builder::new()
            .name(format!("http-{}", peer))
            .spawn(move || {
                let _guard = guard;
                Connection::new(Box::new(FdSessionOps::new(stream)), registry).run();
            });

        if let Err(e) = spawned {
            error!(error = %e, "cannot spawn connection thread");
        }
        Ok(())
    }
}

/// Decrements the live-connection count when the serving thread ends
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Send a bare 503, then drain briefly so the reply is not lost to a reset
///
/// Runs on its own thread; the drain stops at a fixed deadline however
/// the peer behaves.
fn refuse(stream: TcpStream) {
    let spawned = thread::Builder::new()
        .name("http-refuse".to_string())
        .spawn(move || linger_close(stream));
    if let Err(e) = spawned {
        debug!(error = %e, "cannot spawn refusal thread");
    }
}

fn linger_close(mut stream: TcpStream) {
    if let Err(e) = stream.write_all(BUSY_RESPONSE) {
        debug!(error = %e, "could not send 503");
        return;
    }
    if stream.shutdown(Shutdown::Write).is_err() {
        return;
    }

    let deadline = Instant::now() + LINGER;
    let mut sink = [0u8; 512];
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() || stream.set_read_timeout(Some(left)).is_err() {
            break;
        }
        match stream.read(&mut sink) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
    }
}
