//! Session state and the server-wide session registry.
//!
//! A session is the server-side state of one control connection. It is
//! created when the client connects and destroyed by TEARDOWN or by the
//! connection dropping. It tracks:
//!
//! - A random numeric id, assigned on the first successful SETUP.
//! - The playback state: Init -> Ready -> Playing <-> Ready.
//! - The bound media source and its open frame source.
//! - The client's data endpoint and the UDP socket serving it.
//! - The streaming thread while playing.
//!
//! ## Session lifecycle
//!
//! ```text
//! SETUP          Init    -> Ready
//! PLAY           Ready   -> Playing
//! PAUSE          Playing -> Ready
//! TEARDOWN       Ready | Playing -> Init (session discarded)
//! send failure   Playing -> Ready  (thread joined on next request)
//! TCP disconnect -> (discarded, via cleanup)
//! ```
//!
//! [`SessionRegistry`] is the shared, lock-protected view of all active
//! sessions, used for id allocation and introspection. The per-connection
//! [`Session`] itself is never shared.

pub mod streamer;

use parking_lot::RwLock;
use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::sync::Arc;

use crate::media::FrameSource;
use crate::transport::UdpTransport;
pub use streamer::{StreamOutcome, StreamTask};

/// Range session ids are drawn from. Zero is never issued.
pub const SESSION_ID_RANGE: RangeInclusive<u32> = 100_000..=999_999;

/// Session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no media bound yet.
    Init,
    /// Media bound and data endpoint registered; not sending.
    Ready,
    /// Streaming thread is sending packets.
    Playing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "INIT"),
            Self::Ready => write!(f, "READY"),
            Self::Playing => write!(f, "PLAYING"),
        }
    }
}

/// Per-connection session, owned by that connection's handler.
pub struct Session {
    pub id: Option<u32>,
    pub state: SessionState,
    /// Name of the bound media source.
    pub source: Option<String>,
    /// Open frame source while not playing; the streaming thread holds it
    /// while playing.
    pub frames: Option<Box<dyn FrameSource>>,
    pub transport: Option<UdpTransport>,
    /// Sequence number of the last request that got a reply.
    pub last_cseq: Option<u32>,
    pub stream: Option<StreamTask>,
}

impl Session {
    pub fn new() -> Self {
        Session {
            id: None,
            state: SessionState::Init,
            source: None,
            frames: None,
            transport: None,
            last_cseq: None,
            stream: None,
        }
    }

    pub fn set_state(&mut self, state: SessionState) {
        tracing::debug!(session_id = ?self.id, old_state = %self.state, new_state = %state, "state transition");
        self.state = state;
    }

    /// Client data endpoint, once SETUP registered one.
    pub fn endpoint(&self) -> Option<SocketAddr> {
        self.transport.as_ref().map(UdpTransport::peer)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of one active session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: u32,
    pub source: String,
    pub client_endpoint: SocketAddr,
    pub state: SessionState,
}

/// Thread-safe registry of active sessions.
///
/// Owned by the server and cloned as a handle into every connection.
/// Sessions come and go from arbitrary connection threads, so every
/// insert and removal goes through the `RwLock`.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<u32, SessionInfo>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under a fresh random id and return the id.
    ///
    /// The id is unique among active sessions.
    pub fn register(&self, source: &str, client_endpoint: SocketAddr) -> u32 {
        let mut sessions = self.sessions.write();
        let mut rng = rand::rng();
        let id = loop {
            let candidate = rng.random_range(SESSION_ID_RANGE);
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };

        sessions.insert(
            id,
            SessionInfo {
                id,
                source: source.to_string(),
                client_endpoint,
                state: SessionState::Ready,
            },
        );
        tracing::debug!(session_id = id, source, total_sessions = sessions.len(), "session registered");
        id
    }

    pub fn set_state(&self, id: u32, state: SessionState) {
        if let Some(info) = self.sessions.write().get_mut(&id) {
            info.state = state;
        }
    }

    pub fn set_source(&self, id: u32, source: &str) {
        if let Some(info) = self.sessions.write().get_mut(&id) {
            info.source = source.to_string();
        }
    }

    pub fn get(&self, id: u32) -> Option<SessionInfo> {
        self.sessions.read().get(&id).cloned()
    }

    /// Remove a session (TEARDOWN or disconnect).
    pub fn remove(&self, id: u32) -> Option<SessionInfo> {
        let mut sessions = self.sessions.write();
        let removed = sessions.remove(&id);
        if removed.is_some() {
            tracing::debug!(session_id = id, total_sessions = sessions.len(), "session removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// All active sessions, ordered by id.
    pub fn snapshot(&self) -> Vec<SessionInfo> {
        let mut all: Vec<SessionInfo> = self.sessions.read().values().cloned().collect();
        all.sort_by_key(|s| s.id);
        all
    }

    /// Sessions currently in [`SessionState::Playing`].
    pub fn playing(&self) -> Vec<SessionInfo> {
        self.snapshot()
            .into_iter()
            .filter(|s| s.state == SessionState::Playing)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> SocketAddr {
        "127.0.0.1:25000".parse().unwrap()
    }

    #[test]
    fn register_assigns_ids_in_range() {
        let registry = SessionRegistry::new();
        let id = registry.register("a.dat", endpoint());
        assert!(SESSION_ID_RANGE.contains(&id));
        assert_ne!(id, 0);

        let info = registry.get(id).unwrap();
        assert_eq!(info.source, "a.dat");
        assert_eq!(info.client_endpoint, endpoint());
        assert_eq!(info.state, SessionState::Ready);
    }

    #[test]
    fn ids_are_unique_while_active() {
        let registry = SessionRegistry::new();
        let mut ids: Vec<u32> = (0..500).map(|_| registry.register("a.dat", endpoint())).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 500);
        assert_eq!(registry.len(), 500);
    }

    #[test]
    fn update_and_remove() {
        let registry = SessionRegistry::new();
        let id = registry.register("a.dat", endpoint());

        registry.set_state(id, SessionState::Playing);
        registry.set_source(id, "b.dat");
        assert_eq!(registry.playing().len(), 1);
        assert_eq!(registry.get(id).unwrap().source, "b.dat");

        assert!(registry.remove(id).is_some());
        assert!(registry.remove(id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn clones_share_state() {
        let registry = SessionRegistry::new();
        let handle = registry.clone();
        let id = handle.register("a.dat", endpoint());
        assert_eq!(registry.snapshot()[0].id, id);
    }

    #[test]
    fn new_session_starts_in_init() {
        let session = Session::new();
        assert_eq!(session.state, SessionState::Init);
        assert!(session.id.is_none());
        assert!(session.endpoint().is_none());
    }
}
