//! Per-output playback channels.
//!
//! One [`PlaybackChannel`] exists for each physical DAC output, bound at
//! startup to its peer board and sub-channel. The state machine is:
//!
//! ```text
//! Idle ──load ok──▶ Stopped ──play──▶ Playing ──stop / EOF──▶ Stopped
//!                                        │  ▲
//!                                        │  └── EOF with loop (rewind)
//!                                        ▼
//!                                      Error  (source/bus failure; terminal
//!                                              until the next load)
//! ```
//!
//! `Loading` and `Paused` are defined but unused by the transition rules
//! above (reserved for the peer firmware's pause support).

use bus::protocol::{PeerId, SubChannel, PEER_COUNT, SUB_CHANNELS_PER_PEER};
use embassy_time::Instant;
use platform::storage::File;

use crate::wav::WavSource;

/// Total playback channels (peers × sub-channels).
pub const CHANNEL_COUNT: usize = PEER_COUNT * SUB_CHANNELS_PER_PEER;

/// Longest file label retained for status reporting.
pub const LABEL_LEN: usize = 64;

/// Playback state of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelState {
    /// Nothing loaded since startup.
    Idle,
    /// Reserved: a load is in progress.
    Loading,
    /// Actively streaming sample blocks to the peer.
    Playing,
    /// Reserved: suspended with position preserved.
    Paused,
    /// Loaded (or finished); not streaming.
    Stopped,
    /// A source or bus failure sidelined the channel until the next load.
    Error,
}

impl ChannelState {
    /// Short uppercase name for status output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Loading => "LOADING",
            Self::Playing => "PLAYING",
            Self::Paused => "PAUSED",
            Self::Stopped => "STOPPED",
            Self::Error => "ERROR",
        }
    }
}

/// Validated playback-channel index with its fixed peer/sub-channel binding.
///
/// Channel `i` maps to peer `i / 2`, sub-channel `i % 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelId {
    index: u8,
    peer: PeerId,
    sub: SubChannel,
}

impl ChannelId {
    /// Validate a raw channel index.
    #[allow(clippy::arithmetic_side_effects)] // divisor SUB_CHANNELS_PER_PEER is a non-zero const
    #[allow(clippy::cast_possible_truncation)] // SUB_CHANNELS_PER_PEER fits u8
    pub fn new(raw: u8) -> Option<Self> {
        if (raw as usize) >= CHANNEL_COUNT {
            return None;
        }
        let per = SUB_CHANNELS_PER_PEER as u8;
        let peer = PeerId::new(raw / per)?;
        let sub = SubChannel::new(raw % per)?;
        Some(Self {
            index: raw,
            peer,
            sub,
        })
    }

    /// Iterate every channel in scheduling order.
    pub fn all() -> impl Iterator<Item = Self> {
        #[allow(clippy::cast_possible_truncation)] // CHANNEL_COUNT fits u8
        (0..CHANNEL_COUNT as u8).filter_map(Self::new)
    }

    /// Array index of this channel.
    pub fn index(self) -> usize {
        self.index as usize
    }

    /// Raw channel number (for status output).
    pub fn raw(self) -> u8 {
        self.index
    }

    /// Peer board carrying this channel.
    pub fn peer(self) -> PeerId {
        self.peer
    }

    /// DAC output on that peer.
    pub fn sub_channel(self) -> SubChannel {
        self.sub
    }
}

/// One playback channel and everything it owns.
///
/// The sample source handle is exclusively owned here: at most one source is
/// open per channel, and it is closed (dropped) and reopened on every load.
pub struct PlaybackChannel<F> {
    pub(crate) id: ChannelId,
    pub(crate) state: ChannelState,
    pub(crate) source: Option<WavSource<F>>,
    pub(crate) label: heapless::String<LABEL_LEN>,
    pub(crate) volume: u16,
    pub(crate) loop_enabled: bool,
    pub(crate) samples_sent: u32,
    pub(crate) last_tick: Option<Instant>,
}

impl<F: File> PlaybackChannel<F> {
    /// Fresh channel bound to its peer lines, idle, at the default volume.
    pub fn new(id: ChannelId, volume: u16) -> Self {
        Self {
            id,
            state: ChannelState::Idle,
            source: None,
            label: heapless::String::new(),
            volume,
            loop_enabled: false,
            samples_sent: 0,
            last_tick: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Stored 12-bit volume.
    pub fn volume(&self) -> u16 {
        self.volume
    }

    /// `true` when a sample source is open.
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// When this channel last pushed a block (or started playing).
    pub fn last_tick(&self) -> Option<Instant> {
        self.last_tick
    }

    /// Remember the file label, truncating silently at capacity.
    pub(crate) fn set_label(&mut self, path: &str) {
        self.label.clear();
        for c in path.chars() {
            if self.label.push(c).is_err() {
                break;
            }
        }
    }

    /// Snapshot for the status surface.
    pub fn status(&self) -> ChannelStatus {
        ChannelStatus {
            channel: self.id.raw(),
            state: self.state,
            file: if self.label.is_empty() {
                None
            } else {
                Some(self.label.clone())
            },
            volume: self.volume,
            loop_enabled: self.loop_enabled,
            samples_sent: self.samples_sent,
            total_samples: self.source.as_ref().map_or(0, WavSource::total_samples),
        }
    }
}

/// Point-in-time report of one channel, for the status command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStatus {
    /// Raw channel number.
    pub channel: u8,
    /// State at snapshot time.
    pub state: ChannelState,
    /// Loaded file label, if any.
    pub file: Option<heapless::String<LABEL_LEN>>,
    /// Stored 12-bit volume.
    pub volume: u16,
    /// Loop-at-EOF flag.
    pub loop_enabled: bool,
    /// Samples pushed to the peer since play.
    pub samples_sent: u32,
    /// Total samples in the loaded source (0 when none).
    pub total_samples: u32,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn channel_id_maps_to_peer_and_sub() {
        let cases: [(u8, u8, u8); 6] =
            [(0, 0, 0), (1, 0, 1), (2, 1, 0), (3, 1, 1), (4, 2, 0), (5, 2, 1)];
        for (raw, peer, sub) in cases {
            let id = ChannelId::new(raw).unwrap();
            assert_eq!(id.peer().raw(), peer, "channel {raw}");
            assert_eq!(id.sub_channel().as_byte(), sub, "channel {raw}");
        }
    }

    #[test]
    fn channel_id_rejects_out_of_range() {
        assert!(ChannelId::new(6).is_none());
        assert!(ChannelId::new(0xFF).is_none());
    }

    #[test]
    fn channel_id_all_is_in_order() {
        let raws: Vec<u8> = ChannelId::all().map(ChannelId::raw).collect();
        assert_eq!(raws, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn state_names_match_status_output() {
        assert_eq!(ChannelState::Playing.as_str(), "PLAYING");
        assert_eq!(ChannelState::Error.as_str(), "ERROR");
    }

    #[test]
    fn label_truncates_at_capacity() {
        let id = ChannelId::new(0).unwrap();
        let mut ch: PlaybackChannel<platform::mocks::MemFile> = PlaybackChannel::new(id, 2048);
        let long: String = core::iter::repeat('x').take(100).collect();
        ch.set_label(&long);
        assert_eq!(ch.label.len(), LABEL_LEN);
    }

    #[test]
    fn fresh_channel_reports_idle_status() {
        let id = ChannelId::new(3).unwrap();
        let ch: PlaybackChannel<platform::mocks::MemFile> = PlaybackChannel::new(id, 2048);
        let st = ch.status();
        assert_eq!(st.channel, 3);
        assert_eq!(st.state, ChannelState::Idle);
        assert_eq!(st.file, None);
        assert_eq!(st.volume, 2048);
        assert_eq!(st.total_samples, 0);
    }
}
