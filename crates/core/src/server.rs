use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::error::{Result, RtspError};
use crate::media::packetizer::DEFAULT_PAYLOAD_TYPE;
use crate::media::registry::DEFAULT_EXTENSION;
use crate::media::{MediaCatalog, MediaRegistry};
use crate::session::streamer::DEFAULT_FRAME_INTERVAL;
use crate::session::{SessionInfo, SessionRegistry};
use crate::transport::tcp;

/// Server-level configuration shared by every session.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory scanned for media files at startup.
    pub media_dir: PathBuf,
    /// File extensions (case-insensitive, no leading dot) treated as media.
    pub extensions: Vec<String>,
    /// Pacing interval between data packets of one session.
    pub frame_interval: Duration,
    /// Payload type written into every data packet header.
    pub payload_type: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            media_dir: PathBuf::from("."),
            extensions: vec![DEFAULT_EXTENSION.to_string()],
            frame_interval: DEFAULT_FRAME_INTERVAL,
            payload_type: DEFAULT_PAYLOAD_TYPE,
        }
    }
}

/// Video-on-demand server orchestrator.
///
/// Owns the media catalog and the session registry, and hands both to
/// every connection. Delegates TCP connection handling to
/// [`transport::tcp`](crate::transport::tcp); each session sends its own
/// data packets over [`UdpTransport`](crate::transport::UdpTransport).
pub struct Server {
    bind_addr: String,
    config: Arc<ServerConfig>,
    catalog: Option<Arc<dyn MediaCatalog>>,
    sessions: SessionRegistry,
    running: Arc<AtomicBool>,
    local_addr: Option<SocketAddr>,
}

impl Server {
    pub fn new(bind_addr: &str) -> Self {
        Self::with_config(bind_addr, ServerConfig::default())
    }

    /// Create a server that scans `config.media_dir` on start.
    pub fn with_config(bind_addr: &str, config: ServerConfig) -> Self {
        Self {
            bind_addr: bind_addr.to_string(),
            config: Arc::new(config),
            catalog: None,
            sessions: SessionRegistry::new(),
            running: Arc::new(AtomicBool::new(false)),
            local_addr: None,
        }
    }

    /// Create a server serving an already-built catalog instead of
    /// scanning a directory.
    pub fn with_catalog(
        bind_addr: &str,
        catalog: Arc<dyn MediaCatalog>,
        config: ServerConfig,
    ) -> Self {
        let mut server = Self::with_config(bind_addr, config);
        server.catalog = Some(catalog);
        server
    }

    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(RtspError::AlreadyRunning);
        }

        let catalog = match &self.catalog {
            Some(catalog) => catalog.clone(),
            None => {
                let registry =
                    MediaRegistry::scan(&self.config.media_dir, &self.config.extensions)?;
                let catalog: Arc<dyn MediaCatalog> = Arc::new(registry);
                self.catalog = Some(catalog.clone());
                catalog
            }
        };

        let listener = TcpListener::bind(&self.bind_addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);

        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let sessions = self.sessions.clone();
        let config = self.config.clone();

        tracing::info!(
            addr = %local_addr,
            media = catalog.names().len(),
            "RTSP server listening"
        );

        thread::Builder::new()
            .name("rtsp-accept".to_string())
            .spawn(move || {
                tcp::accept_loop(listener, catalog, sessions, config, running);
            })?;

        Ok(())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("server stopping");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Address the control listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.local_addr.ok_or(RtspError::NotStarted)
    }

    /// The media catalog; available once started or when injected.
    pub fn catalog(&self) -> Option<Arc<dyn MediaCatalog>> {
        self.catalog.clone()
    }

    /// All active sessions.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.sessions.snapshot()
    }

    /// Sessions currently sending packets.
    pub fn viewers(&self) -> Vec<SessionInfo> {
        self.sessions.playing()
    }

    pub fn config(&self) -> Arc<ServerConfig> {
        self.config.clone()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
