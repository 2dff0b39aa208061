//! Media sources, frame reading and data-channel packetization.
//!
//! ## Pipeline
//!
//! ```text
//! MediaRegistry ──open──▶ FrameReader ──next_frame──▶ Packetizer ──▶ UDP datagram
//!  (named files)         (looping reader)            (8-byte header)
//! ```
//!
//! - [`registry`]: scans a directory once at startup and resolves names.
//! - [`reader`]: yields length-prefixed frames from a file, looping forever.
//! - [`rtp`]: the fixed packet header codec.
//! - [`packetizer`]: wraps one frame into one packet.
//!
//! Sessions depend on the [`MediaCatalog`] and [`FrameSource`] traits rather
//! than on files directly, so alternative sources can be plugged in.

pub mod packetizer;
pub mod reader;
pub mod registry;
pub mod rtp;

pub use packetizer::Packetizer;
pub use reader::FrameReader;
pub use registry::{MediaRegistry, MediaSource};

use crate::error::Result;

/// Serial producer of media frames.
///
/// Owned by exactly one session at a time; while the session is playing
/// the streaming thread holds it.
pub trait FrameSource: Send {
    /// Next frame, or `None` when this call produced nothing (for example
    /// while recovering from a corrupt record). Callers retry on their next
    /// tick.
    fn next_frame(&mut self) -> Option<Vec<u8>>;

    /// Frames returned since the source last restarted from the beginning.
    fn frame_number(&self) -> u32;

    /// Release the underlying resource. Calling it again is a no-op.
    fn close(&mut self);
}

/// Named collection of media that sessions can open.
pub trait MediaCatalog: Send + Sync {
    /// Source names in listing order.
    fn names(&self) -> Vec<String>;

    /// Open a fresh frame source for `name`, or for the default source when
    /// `name` is `None`. Returns the resolved name alongside the source.
    ///
    /// Fails with [`RtspError::SourceNotFound`](crate::RtspError::SourceNotFound)
    /// when nothing matches.
    fn open(&self, name: Option<&str>) -> Result<(String, Box<dyn FrameSource>)>;
}
