//! Control bytes and packet framing of the legacy file-transfer protocol.
//!
//! A data packet on the wire:
//!
//! ```text
//! [0] SOH or STX    [1] block    [2] ~block
//! [3 .. 3+N]        payload  (N = 128 for SOH, 1024 for STX)
//! [3+N] crc hi      [4+N] crc lo
//! ```
//!
//! `EOT` and `CAN` travel as bare single bytes.

/// Start of a short block — 128-byte payload follows.
pub const SOH: u8 = 0x01;

/// Start of a long block — 1024-byte payload follows.
pub const STX: u8 = 0x02;

/// End of transmission — the file is complete.
pub const EOT: u8 = 0x04;

/// Acknowledge — packet accepted.
pub const ACK: u8 = 0x06;

/// Negative acknowledge — packet rejected, retransmit.
pub const NAK: u8 = 0x15;

/// Cancel — abandon the session.
pub const CAN: u8 = 0x18;

/// `'C'` — receiver invites a CRC-mode sender to start.
pub const CRC_REQUEST: u8 = 0x43;

/// Payload bytes in a short (SOH) block.
pub const SHORT_PAYLOAD: usize = 128;

/// Payload bytes in a long (STX) block.
pub const LONG_PAYLOAD: usize = 1024;

/// Non-payload bytes in a data packet: header, block, ~block, crc hi, crc lo.
pub const PACKET_OVERHEAD: usize = 5;

/// Largest packet on the wire (long block).
pub const MAX_PACKET: usize = LONG_PAYLOAD + PACKET_OVERHEAD;

/// Classification of a packet's header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameKind {
    /// 128-byte data block.
    Short,
    /// 1024-byte data block.
    Long,
    /// End-of-transmission marker.
    End,
    /// Cancel marker.
    Cancel,
}

impl FrameKind {
    /// Classify a header byte; `None` for garbage.
    pub fn from_header(byte: u8) -> Option<Self> {
        match byte {
            SOH => Some(Self::Short),
            STX => Some(Self::Long),
            EOT => Some(Self::End),
            CAN => Some(Self::Cancel),
            _ => None,
        }
    }

    /// Payload length carried by this frame kind.
    pub fn payload_len(self) -> usize {
        match self {
            Self::Short => SHORT_PAYLOAD,
            Self::Long => LONG_PAYLOAD,
            Self::End | Self::Cancel => 0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn header_classification() {
        assert_eq!(FrameKind::from_header(SOH), Some(FrameKind::Short));
        assert_eq!(FrameKind::from_header(STX), Some(FrameKind::Long));
        assert_eq!(FrameKind::from_header(EOT), Some(FrameKind::End));
        assert_eq!(FrameKind::from_header(CAN), Some(FrameKind::Cancel));
        assert_eq!(FrameKind::from_header(0x7F), None);
    }

    #[test]
    fn payload_lengths() {
        assert_eq!(FrameKind::Short.payload_len(), 128);
        assert_eq!(FrameKind::Long.payload_len(), 1024);
        assert_eq!(FrameKind::End.payload_len(), 0);
    }

    #[test]
    fn max_packet_fits_long_block() {
        assert_eq!(MAX_PACKET, 1029);
    }
}
