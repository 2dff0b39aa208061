use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::media::MediaCatalog;
use crate::protocol::{Request, SessionHandler};
use crate::server::ServerConfig;
use crate::session::SessionRegistry;

/// Largest control message read in one go.
pub const MAX_REQUEST_LEN: usize = 1024;

/// Delay between accept attempts while idle or after an accept error.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How often a blocked control read wakes up to check for shutdown.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Non-blocking TCP accept loop.
///
/// Checks the `running` flag between accepts with a 50ms poll interval
/// so that [`crate::server::Server::stop`] can terminate it promptly. A
/// failing accept backs off by the same interval.
/// Each accepted connection gets its own thread; the loop never waits on
/// a session.
pub fn accept_loop(
    listener: TcpListener,
    catalog: Arc<dyn MediaCatalog>,
    sessions: SessionRegistry,
    config: Arc<ServerConfig>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                let catalog = catalog.clone();
                let sessions = sessions.clone();
                let config = config.clone();
                let running = running.clone();
                let spawned = thread::Builder::new()
                    .name("rtsp-conn".to_string())
                    .spawn(move || Connection::handle(stream, catalog, sessions, config, running));
                if let Err(e) = spawned {
                    tracing::error!(error = %e, "failed to spawn connection thread");
                }
            }
            Err(e) => accept_backoff(&e, &running),
        }
    }
    tracing::debug!("accept loop exited");
}

/// Wait out an accept that produced no connection. Real errors (such as
/// running out of file descriptors) are logged and get the same delay as
/// an idle poll.
fn accept_backoff(err: &io::Error, running: &AtomicBool) {
    if err.kind() != ErrorKind::WouldBlock && running.load(Ordering::SeqCst) {
        tracing::warn!(error = %err, "TCP accept error");
    }
    thread::sleep(ACCEPT_POLL_INTERVAL);
}

/// A single client control connection with its own session.
struct Connection {
    stream: TcpStream,
    handler: SessionHandler,
    peer_addr: SocketAddr,
}

impl Connection {
    /// Entry point: set up a connection and run its request loop.
    fn handle(
        stream: TcpStream,
        catalog: Arc<dyn MediaCatalog>,
        sessions: SessionRegistry,
        config: Arc<ServerConfig>,
        running: Arc<AtomicBool>,
    ) {
        let peer_addr = match stream.peer_addr() {
            Ok(addr) => addr,
            Err(_) => return,
        };

        tracing::info!(%peer_addr, "client connected");

        if let Err(e) = stream.set_read_timeout(Some(READ_POLL_INTERVAL)) {
            tracing::warn!(%peer_addr, error = %e, "failed to set read timeout");
        }

        let handler = SessionHandler::new(catalog, sessions, peer_addr, config);
        let mut conn = Connection {
            stream,
            handler,
            peer_addr,
        };

        let reason = conn.run(&running);
        conn.handler.shutdown();

        tracing::info!(%peer_addr, reason, "client disconnected");
    }

    /// Request/reply loop. Returns the reason for exiting.
    ///
    /// One read is one request message: clients send each request in a
    /// single write and wait for the reply before sending the next.
    fn run(&mut self, running: &Arc<AtomicBool>) -> &'static str {
        let mut buf = [0u8; MAX_REQUEST_LEN];

        while running.load(Ordering::SeqCst) {
            let n = match self.stream.read(&mut buf) {
                Ok(0) => return "connection closed by client",
                Ok(n) => n,
                Err(ref e)
                    if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    continue;
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::debug!(peer = %self.peer_addr, error = %e, "control read failed");
                    return "read error";
                }
            };

            let text = String::from_utf8_lossy(&buf[..n]);
            if text.trim().is_empty() {
                continue;
            }

            let request = match Request::parse(&text) {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!(peer = %self.peer_addr, error = %e, "parse error");
                    continue;
                }
            };

            tracing::debug!(
                peer = %self.peer_addr,
                command = request.command.name(),
                media = ?request.target,
                cseq = request.cseq,
                "request"
            );

            if let Some(response) = self.handler.handle(&request) {
                tracing::debug!(
                    peer = %self.peer_addr,
                    status = response.status.code(),
                    cseq = response.cseq,
                    "response"
                );

                if self
                    .stream
                    .write_all(response.serialize().as_bytes())
                    .is_err()
                {
                    return "write error";
                }
            }

            if self.handler.is_closed() {
                return "session torn down";
            }
        }

        "server shutting down"
    }
}
