pub mod error;
pub mod media;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

pub use error::{Result, RtspError};
pub use media::{FrameReader, FrameSource, MediaCatalog, MediaRegistry, MediaSource, Packetizer};
pub use server::{Server, ServerConfig};
pub use session::{SessionInfo, SessionState};
