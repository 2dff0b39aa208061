//! Control-channel protocol.
//!
//! A simplified, line-oriented dialect of RTSP. Each request is a short
//! text message, each reply a status line plus headers:
//!
//! ```text
//! SETUP movie.mjpeg          RTSP/1.0 200 OK
//! 1                   ──▶    CSeq: 1
//!  RTSP/1.0 RTP/UDP 25000    Session: 482913
//! ```
//!
//! ## Commands
//!
//! | Command | Valid in | Purpose |
//! |---------|----------|---------|
//! | LIST | any | Discover media source names |
//! | SETUP [name] | Init | Bind a source and register the data port |
//! | PLAY | Ready | Start packet delivery |
//! | PAUSE | Playing | Stop packet delivery |
//! | TEARDOWN | Ready, Playing | Destroy the session |
//! | SWITCH name | Ready, Playing | Rebind to another source |
//!
//! Requests that are malformed, or valid but not applicable in the current
//! state, get no reply.

pub mod handler;
pub mod request;
pub mod response;

pub use handler::SessionHandler;
pub use request::{Command, Request};
pub use response::{Response, StatusCode};
