use std::time::{SystemTime, UNIX_EPOCH};

use super::rtp::{HEADER_LEN, RtpHeader};

/// RTP version written into every packet header.
pub const RTP_VERSION: u8 = 2;

/// Static payload type for JPEG frames (RFC 3551 §6).
pub const DEFAULT_PAYLOAD_TYPE: u8 = 26;

/// Largest frame that fits a single UDP datagram together with the header.
pub const MAX_FRAME_LEN: usize = 65_507 - HEADER_LEN;

/// Wraps whole frames into single data-channel packets.
///
/// Unlike a codec packetizer there is no fragmentation: every frame maps
/// to exactly one packet, so the marker bit is always set. The sequence
/// number is the frame source's running counter, which means it restarts
/// whenever the source loops back to its first frame.
#[derive(Debug, Clone, Copy)]
pub struct Packetizer {
    payload_type: u8,
}

impl Packetizer {
    pub fn new(payload_type: u8) -> Self {
        Self {
            payload_type: payload_type & 0x7f,
        }
    }

    pub fn payload_type(&self) -> u8 {
        self.payload_type
    }

    /// Build the packet for one frame.
    ///
    /// `frame_number` is truncated to the 16-bit sequence field.
    pub fn packetize(&self, frame_number: u32, frame: &[u8]) -> Vec<u8> {
        self.header(frame_number, coarse_timestamp()).encode(frame)
    }

    fn header(&self, frame_number: u32, timestamp: u32) -> RtpHeader {
        RtpHeader {
            version: RTP_VERSION,
            padding: false,
            extension: false,
            csrc_count: 0,
            marker: true,
            payload_type: self.payload_type,
            sequence: frame_number as u16,
            timestamp,
        }
    }
}

impl Default for Packetizer {
    fn default() -> Self {
        Self::new(DEFAULT_PAYLOAD_TYPE)
    }
}

/// Wall-clock seconds since the UNIX epoch, truncated to 32 bits.
fn coarse_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or_default()
}
