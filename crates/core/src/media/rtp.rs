use crate::error::{Result, RtspError};

/// Size of the fixed data-channel header in bytes.
pub const HEADER_LEN: usize = 8;

/// Fixed header of a data-channel packet.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// This is the RTP fixed header without the SSRC word: one session sends
/// one stream, so the source is implied by the destination endpoint.
/// Fields wider than their wire slot are masked on [`write`](Self::write).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    /// Protocol version (2 bits).
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    /// Contributing source count (4 bits).
    pub csrc_count: u8,
    /// Set on the last packet of a frame.
    pub marker: bool,
    /// Payload type (7 bits) naming the frame kind.
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
}

impl RtpHeader {
    /// Serialize the 8-byte header.
    pub fn write(&self) -> [u8; HEADER_LEN] {
        let first_byte = ((self.version & 0x03) << 6)
            | ((self.padding as u8) << 5)
            | ((self.extension as u8) << 4)
            | (self.csrc_count & 0x0f);
        let second_byte = ((self.marker as u8) << 7) | (self.payload_type & 0x7f);

        let mut header = [0u8; HEADER_LEN];
        header[0] = first_byte;
        header[1] = second_byte;
        header[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        header[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        header
    }

    /// Header followed by `payload`, ready to go out as one datagram.
    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let mut packet = Vec::with_capacity(HEADER_LEN + payload.len());
        packet.extend_from_slice(&self.write());
        packet.extend_from_slice(payload);
        packet
    }

    /// Parse the fixed header from the start of `bytes`.
    pub fn read(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(RtspError::MalformedPacket {
                len: bytes.len(),
                needed: HEADER_LEN,
            });
        }

        Ok(Self {
            version: bytes[0] >> 6,
            padding: bytes[0] & 0x20 != 0,
            extension: bytes[0] & 0x10 != 0,
            csrc_count: bytes[0] & 0x0f,
            marker: bytes[1] & 0x80 != 0,
            payload_type: bytes[1] & 0x7f,
            sequence: u16::from_be_bytes([bytes[2], bytes[3]]),
            timestamp: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }
}

/// A decoded packet borrowing its payload from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpPacket<'a> {
    pub header: RtpHeader,
    pub payload: &'a [u8],
}

impl<'a> RtpPacket<'a> {
    /// Split a datagram into header fields and payload.
    ///
    /// Fails with [`RtspError::MalformedPacket`] when the datagram is
    /// shorter than [`HEADER_LEN`].
    pub fn decode(bytes: &'a [u8]) -> Result<Self> {
        let header = RtpHeader::read(bytes)?;
        Ok(Self {
            header,
            payload: &bytes[HEADER_LEN..],
        })
    }
}
