//! The per-tick channel scheduler.
//!
//! Owns every [`PlaybackChannel`] and the [`BusEngine`], and drives one
//! fixed, deterministic pass over the channels each tick. A channel only
//! receives a data block when its peer's ready line is asserted; everything
//! else about that channel waits for a later tick. No channel's failure
//! ever propagates to another channel or stops the loop.

use bus::engine::{BusEngine, BusError};
use bus::protocol::{Opcode, MAX_SAMPLES_PER_TRANSFER};
use embassy_time::{Duration, Instant};
use platform::gpio::{InputPin, OutputPin};
use platform::spi::SpiPeripheral;
use platform::storage::{File, Storage};

use crate::channel::{ChannelId, ChannelState, ChannelStatus, PlaybackChannel, CHANNEL_COUNT};
use crate::wav::WavSource;

/// Samples pulled from the source per data packet (one full transfer).
pub const SAMPLES_PER_CHUNK: usize = MAX_SAMPLES_PER_TRANSFER;

/// Mid-scale startup volume (50% of the 12-bit range).
pub const DEFAULT_VOLUME: u16 = 2048;

/// Upper bound of the 12-bit volume range.
pub const MAX_VOLUME: u16 = 4095;

/// How long one tick waits for a data transfer to complete before moving on.
const DATA_COMPLETE_TIMEOUT: Duration = Duration::from_millis(100);

/// Caller-facing errors from the control surface.
///
/// Engine-internal retries never surface here; a transient bus condition
/// simply means the affected channel streams again on a later tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlError {
    /// Channel index does not address a configured channel.
    InvalidChannel,
    /// `play` was requested with no loaded file.
    NoFileLoaded,
    /// The sample source could not be opened or read.
    SourceFailed,
    /// The file opened but is not the supported encoding.
    InvalidFormat,
    /// A command packet could not be delivered.
    BusFailed,
}

impl core::fmt::Display for ControlError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidChannel => f.write_str("invalid channel"),
            Self::NoFileLoaded => f.write_str("no file loaded"),
            Self::SourceFailed => f.write_str("sample source failure"),
            Self::InvalidFormat => f.write_str("unsupported audio format"),
            Self::BusFailed => f.write_str("bus command failed"),
        }
    }
}

/// Multi-channel streaming scheduler.
pub struct ChannelScheduler<SPI, CS, RDY, F> {
    bus: BusEngine<SPI, CS, RDY>,
    channels: heapless::Vec<PlaybackChannel<F>, CHANNEL_COUNT>,
    /// Staging buffer between the sample source and the bus engine.
    chunk: [u16; SAMPLES_PER_CHUNK],
}

impl<SPI, CS, RDY, F> ChannelScheduler<SPI, CS, RDY, F>
where
    SPI: SpiPeripheral,
    CS: OutputPin,
    RDY: InputPin,
    F: File,
{
    /// Build the scheduler with every channel idle at the default volume.
    pub fn new(bus: BusEngine<SPI, CS, RDY>) -> Self {
        let mut channels = heapless::Vec::new();
        for id in ChannelId::all() {
            // Capacity equals CHANNEL_COUNT; the push cannot fail.
            let _ = channels.push(PlaybackChannel::new(id, DEFAULT_VOLUME));
        }
        Self {
            bus,
            channels,
            chunk: [0u16; SAMPLES_PER_CHUNK],
        }
    }

    /// Close any previous source on `channel`, then open and validate `path`.
    ///
    /// On failure the channel is left in `Error` (and without a source);
    /// the rest of the system is unaffected.
    pub async fn load<S>(
        &mut self,
        storage: &mut S,
        channel: ChannelId,
        path: &str,
        loop_enabled: bool,
    ) -> Result<(), ControlError>
    where
        S: Storage<File = F, Error = F::Error>,
    {
        let ch = self
            .channels
            .get_mut(channel.index())
            .ok_or(ControlError::InvalidChannel)?;

        // Previous source (if any) is closed before the new open.
        ch.source = None;

        let source = match WavSource::open(storage, path).await {
            Ok(s) => s,
            Err(_) => {
                ch.state = ChannelState::Error;
                return Err(ControlError::SourceFailed);
            }
        };
        if !source.validate() {
            ch.state = ChannelState::Error;
            return Err(ControlError::InvalidFormat);
        }

        ch.source = Some(source);
        ch.set_label(path);
        ch.loop_enabled = loop_enabled;
        ch.samples_sent = 0;
        ch.state = ChannelState::Stopped;
        Ok(())
    }

    /// Start playback from the top of the loaded file.
    ///
    /// Issues the `Play` command followed by a `SetVolume` refresh carrying
    /// the stored volume. Playing an already-playing channel is a no-op.
    pub async fn play(&mut self, channel: ChannelId) -> Result<(), ControlError> {
        let ch = self
            .channels
            .get_mut(channel.index())
            .ok_or(ControlError::InvalidChannel)?;
        let source = ch.source.as_mut().ok_or(ControlError::NoFileLoaded)?;
        if ch.state == ChannelState::Playing {
            return Ok(());
        }

        if source.rewind().await.is_err() {
            ch.state = ChannelState::Error;
            return Err(ControlError::SourceFailed);
        }

        if self
            .bus
            .send_command(channel.peer(), channel.sub_channel(), Opcode::Play, 0)
            .await
            .is_err()
        {
            return Err(ControlError::BusFailed);
        }
        // Volume refresh; delivery is best-effort, the stored value stands.
        let volume = self
            .channels
            .get(channel.index())
            .map_or(DEFAULT_VOLUME, PlaybackChannel::volume);
        let _ = self
            .bus
            .send_command(
                channel.peer(),
                channel.sub_channel(),
                Opcode::SetVolume,
                volume,
            )
            .await;

        if let Some(ch) = self.channels.get_mut(channel.index()) {
            ch.state = ChannelState::Playing;
            ch.samples_sent = 0;
            ch.last_tick = Some(Instant::now());
        }
        Ok(())
    }

    /// Stop the channel.
    ///
    /// Always takes effect locally at the next tick boundary, even when the
    /// `Stop` command cannot be delivered; an in-flight data transfer is
    /// left to complete or time out on its own.
    pub async fn stop(&mut self, channel: ChannelId) -> Result<(), ControlError> {
        let _ = self
            .bus
            .send_command(channel.peer(), channel.sub_channel(), Opcode::Stop, 0)
            .await;
        let ch = self
            .channels
            .get_mut(channel.index())
            .ok_or(ControlError::InvalidChannel)?;
        ch.state = ChannelState::Stopped;
        Ok(())
    }

    /// Stop every channel that is currently playing.
    pub async fn stop_all(&mut self) {
        for id in ChannelId::all() {
            let playing = self
                .channels
                .get(id.index())
                .is_some_and(|ch| ch.state == ChannelState::Playing);
            if playing {
                let _ = self.stop(id).await;
            }
        }
    }

    /// Clamp `volume` to the 12-bit range, store it, and send it to the peer.
    pub async fn set_volume(&mut self, channel: ChannelId, volume: u16) -> Result<(), ControlError> {
        let volume = volume.min(MAX_VOLUME);
        let ch = self
            .channels
            .get_mut(channel.index())
            .ok_or(ControlError::InvalidChannel)?;
        ch.volume = volume;
        let _ = self
            .bus
            .send_command(
                channel.peer(),
                channel.sub_channel(),
                Opcode::SetVolume,
                volume,
            )
            .await;
        Ok(())
    }

    /// State of one channel.
    pub fn channel_state(&self, channel: ChannelId) -> ChannelState {
        self.channels
            .get(channel.index())
            .map_or(ChannelState::Error, PlaybackChannel::state)
    }

    /// `true` while any channel is streaming.
    pub fn any_playing(&self) -> bool {
        self.channels
            .iter()
            .any(|ch| ch.state == ChannelState::Playing)
    }

    /// Snapshot every channel for the status surface.
    pub fn status(&self) -> heapless::Vec<ChannelStatus, CHANNEL_COUNT> {
        let mut out = heapless::Vec::new();
        for ch in &self.channels {
            let _ = out.push(ch.status());
        }
        out
    }

    /// Run one scheduling pass: each playing channel whose peer is ready
    /// gets one chunk read, sent, and waited for.
    ///
    /// Failure policy per channel and step:
    /// - source read failure → `Error` (terminal until reloaded)
    /// - bus busy / completion timeout → retry on a later tick
    /// - bus transport failure → `Error`
    /// - EOF → rewind-and-continue (loop) or `Stop` command + `Stopped`
    pub async fn tick(&mut self) {
        for id in ChannelId::all() {
            let playing = self
                .channels
                .get(id.index())
                .is_some_and(|ch| ch.state == ChannelState::Playing);
            if !playing {
                continue;
            }
            if !self.bus.check_ready(id.peer()) {
                continue; // peer still draining the previous block
            }
            self.stream_chunk(id).await;
        }
    }

    async fn stream_chunk(&mut self, id: ChannelId) {
        let Some(ch) = self.channels.get_mut(id.index()) else {
            return;
        };
        let Some(source) = ch.source.as_mut() else {
            ch.state = ChannelState::Error;
            return;
        };

        let read = match source.read_samples(&mut self.chunk).await {
            Ok(n) => n,
            Err(_) => {
                ch.state = ChannelState::Error;
                return;
            }
        };

        if read == 0 {
            if ch.loop_enabled {
                if source.rewind().await.is_err() {
                    ch.state = ChannelState::Error;
                }
            } else {
                ch.state = ChannelState::Stopped;
                let _ = self
                    .bus
                    .send_command(id.peer(), id.sub_channel(), Opcode::Stop, 0)
                    .await;
            }
            return;
        }

        let payload = match self.chunk.get(..read) {
            Some(p) => p,
            None => return,
        };
        match self.bus.send_data(id.peer(), id.sub_channel(), payload).await {
            Ok(()) => {}
            Err(BusError::Busy | BusError::Timeout) => return, // retry next tick
            Err(_) => {
                if let Some(ch) = self.channels.get_mut(id.index()) {
                    ch.state = ChannelState::Error;
                }
                return;
            }
        }
        match self.bus.wait_complete(DATA_COMPLETE_TIMEOUT).await {
            Ok(()) => {
                if let Some(ch) = self.channels.get_mut(id.index()) {
                    #[allow(clippy::cast_possible_truncation)] // read <= 2048
                    {
                        ch.samples_sent = ch.samples_sent.saturating_add(read as u32);
                    }
                    ch.last_tick = Some(Instant::now());
                }
            }
            Err(BusError::Timeout) => {} // block not counted; engine reaps later
            Err(_) => {
                if let Some(ch) = self.channels.get_mut(id.index()) {
                    ch.state = ChannelState::Error;
                }
            }
        }
    }
}
