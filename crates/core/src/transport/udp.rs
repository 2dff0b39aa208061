use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;

use crate::error::Result;

/// Per-session UDP transport for outbound data packets.
///
/// Binds an ephemeral socket of the client's address family and sends
/// every datagram to the endpoint registered at SETUP. Cloning shares the
/// socket; it is closed when the last clone is dropped.
#[derive(Debug, Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

impl UdpTransport {
    /// Bind an ephemeral UDP socket for packets headed to `peer`.
    pub fn bind(peer: SocketAddr) -> Result<Self> {
        let local = if peer.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local)?;
        tracing::debug!(%peer, local = ?socket.local_addr().ok(), "data socket bound");
        Ok(Self {
            socket: Arc::new(socket),
            peer,
        })
    }

    /// Client endpoint packets are sent to.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Send one whole datagram to the client endpoint.
    pub fn send(&self, payload: &[u8]) -> Result<usize> {
        Ok(self.socket.send_to(payload, self.peer)?)
    }
}
