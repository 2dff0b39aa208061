//! Network transport for control requests and data packets.
//!
//! The protocol uses a split transport model:
//!
//! - **TCP** ([`tcp`]): carries text control requests and replies. One TCP
//!   connection per client, with a thread per connection.
//!
//! - **UDP** ([`udp`]): carries data packets. Each session binds its own
//!   ephemeral socket at SETUP and drops it at TEARDOWN.

pub mod tcp;
pub mod udp;

pub use udp::UdpTransport;
