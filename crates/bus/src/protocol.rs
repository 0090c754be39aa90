//! Wire format for the shared serial bus.
//!
//! Two packet shapes travel to the peer boards. No peer address is ever
//! transmitted — peer identity is conveyed solely by which select line is
//! asserted while the bytes are clocked out.
//!
//! ```text
//! Command packet (fixed 5 bytes):
//!   [0] 0xC0 marker   [1] sub-channel   [2] opcode   [3] param hi   [4] param lo
//!
//! Data packet (4-byte header + 2·N payload):
//!   [0] 0xDA marker   [1] sub-channel   [2] count hi   [3] count lo
//!   [4..] N samples, 16-bit little-endian
//! ```

/// Marker byte opening every command packet.
pub const CMD_MARKER: u8 = 0xC0;

/// Marker byte opening every data packet.
pub const DATA_MARKER: u8 = 0xDA;

/// Number of peer boards on the bus.
pub const PEER_COUNT: usize = 3;

/// Independent DAC outputs per peer board.
pub const SUB_CHANNELS_PER_PEER: usize = 2;

/// Fixed size of a command packet on the wire.
pub const COMMAND_LEN: usize = 5;

/// Size of the header preceding data-packet payload.
pub const DATA_HEADER_LEN: usize = 4;

/// Largest sample payload a single data packet may carry.
pub const MAX_SAMPLES_PER_TRANSFER: usize = 2048;

/// Per-peer transfer buffer size: header plus a full sample payload.
pub const TRANSFER_BUF_LEN: usize = DATA_HEADER_LEN + MAX_SAMPLES_PER_TRANSFER * 2;

/// Command opcodes understood by the peer boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Opcode {
    /// Begin playback on the addressed sub-channel.
    Play = 0x01,
    /// Stop playback on the addressed sub-channel.
    Stop = 0x02,
    /// Set the 12-bit output volume (parameter carries the value).
    SetVolume = 0x03,
    /// Request a status report.
    QueryStatus = 0x04,
    /// Reset the addressed sub-channel.
    Reset = 0xFF,
}

impl Opcode {
    /// Wire encoding of the opcode.
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Validated identifier of one peer board (`0..PEER_COUNT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerId(u8);

impl PeerId {
    /// Validate a raw peer index.
    pub const fn new(raw: u8) -> Option<Self> {
        if (raw as usize) < PEER_COUNT {
            Some(Self(raw))
        } else {
            None
        }
    }

    /// Array index of this peer.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Raw wire-free identifier (used only for display).
    pub const fn raw(self) -> u8 {
        self.0
    }
}

/// Validated identifier of one DAC output on a peer
/// (`0..SUB_CHANNELS_PER_PEER`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SubChannel(u8);

impl SubChannel {
    /// Validate a raw sub-channel index.
    pub const fn new(raw: u8) -> Option<Self> {
        if (raw as usize) < SUB_CHANNELS_PER_PEER {
            Some(Self(raw))
        } else {
            None
        }
    }

    /// Wire encoding of the sub-channel.
    pub const fn as_byte(self) -> u8 {
        self.0
    }
}

/// Frame a command packet.
pub fn command_frame(sub: SubChannel, opcode: Opcode, param: u16) -> [u8; COMMAND_LEN] {
    let [param_hi, param_lo] = param.to_be_bytes();
    [
        CMD_MARKER,
        sub.as_byte(),
        opcode.as_byte(),
        param_hi,
        param_lo,
    ]
}

/// Frame a data-packet header for `sample_count` samples.
pub fn data_header(sub: SubChannel, sample_count: u16) -> [u8; DATA_HEADER_LEN] {
    let [count_hi, count_lo] = sample_count.to_be_bytes();
    [DATA_MARKER, sub.as_byte(), count_hi, count_lo]
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn command_frame_layout() {
        let sub = SubChannel::new(1).unwrap();
        let frame = command_frame(sub, Opcode::SetVolume, 0x0ABC);
        assert_eq!(frame, [0xC0, 0x01, 0x03, 0x0A, 0xBC]);
    }

    #[test]
    fn data_header_layout() {
        let sub = SubChannel::new(0).unwrap();
        let header = data_header(sub, 2048);
        assert_eq!(header, [0xDA, 0x00, 0x08, 0x00]);
    }

    #[test]
    fn peer_id_rejects_out_of_range() {
        assert!(PeerId::new(0).is_some());
        assert!(PeerId::new(2).is_some());
        assert!(PeerId::new(3).is_none());
        assert!(PeerId::new(0xFF).is_none());
    }

    #[test]
    fn sub_channel_rejects_out_of_range() {
        assert!(SubChannel::new(0).is_some());
        assert!(SubChannel::new(1).is_some());
        assert!(SubChannel::new(2).is_none());
    }

    #[test]
    fn transfer_buffer_holds_max_payload() {
        assert_eq!(TRANSFER_BUF_LEN, 4100);
    }
}
