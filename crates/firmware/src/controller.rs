//! The command surface and the cooperative run loop.
//!
//! [`Controller`] owns the storage device, the channel scheduler, the
//! transfer receiver, and the upload transport, and exposes the small
//! command set the (out-of-scope) text dispatcher calls into. Each
//! [`run_iteration`](Controller::run_iteration) performs, in order:
//!
//! 1. diagnostic-queue drain (skipped entirely while an upload runs — a
//!    transfer session owns the loop until it ends),
//! 2. upload-request consumption — an armed request runs the transfer
//!    receiver to completion before anything else happens,
//! 3. one channel-scheduler tick.

use core::fmt::Write as _;

use bus::engine::BusEngine;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use platform::byte_ring::DiagQueue;
use platform::gpio::{InputPin, OutputPin};
use platform::spi::SpiPeripheral;
use platform::storage::{File, Storage};
use platform::transport::{DiagPort, Transport};
use playback::channel::{ChannelId, ChannelState, ChannelStatus, CHANNEL_COUNT};
use playback::scheduler::{ChannelScheduler, ControlError};
use transfer::{Receiver, SessionEnd, TransferConfig, TransferError};

use crate::diag;

/// Diagnostic backlog retained between drains.
pub const DIAG_QUEUE_LEN: usize = 4096;

/// Longest upload destination path.
pub const PATH_LEN: usize = 128;

/// Errors surfaced to the command dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    /// Channel index does not address a configured channel.
    InvalidChannel,
    /// The destination path does not fit the path buffer.
    PathTooLong,
    /// An upload was requested while a channel is streaming; stop playback
    /// first (uploads and streaming share the storage device and the loop's
    /// timing budget).
    StreamingActive,
    /// The storage device rejected a directory or file operation.
    StorageFailed,
    /// Error from the playback control surface.
    Control(ControlError),
}

impl From<ControlError> for CommandError {
    fn from(e: ControlError) -> Self {
        Self::Control(e)
    }
}

impl core::fmt::Display for CommandError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidChannel => f.write_str("invalid channel"),
            Self::PathTooLong => f.write_str("destination path too long"),
            Self::StreamingActive => f.write_str("stop playback before uploading"),
            Self::StorageFailed => f.write_str("storage operation failed"),
            Self::Control(e) => write!(f, "{e}"),
        }
    }
}

/// A one-shot upload request, armed by the command surface and consumed by
/// the run loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    /// Channel whose directory receives the file.
    pub channel: u8,
    /// Full destination path.
    pub path: heapless::String<PATH_LEN>,
}

/// Result of one consumed upload request.
pub type UploadOutcome<TE, SE> = Result<SessionEnd, TransferError<TE, SE>>;

/// Top-level firmware state: every engine plus the run-loop glue.
pub struct Controller<S, SPI, CS, RDY, T>
where
    S: Storage,
{
    storage: S,
    scheduler: ChannelScheduler<SPI, CS, RDY, S::File>,
    receiver: Receiver,
    transport: T,
    diag: DiagQueue<DIAG_QUEUE_LEN>,
    /// One-shot request slot. A `Signal` rather than a plain flag: arming
    /// may happen from interrupt context (the command link's receive path)
    /// while the run loop consumes from thread context.
    upload: Signal<CriticalSectionRawMutex, UploadRequest>,
}

impl<S, SPI, CS, RDY, T> Controller<S, SPI, CS, RDY, T>
where
    S: Storage,
    S::File: File<Error = S::Error>,
    SPI: SpiPeripheral,
    CS: OutputPin,
    RDY: InputPin,
    T: Transport,
{
    /// Assemble the controller with the production transfer timing budget.
    pub fn new(storage: S, bus: BusEngine<SPI, CS, RDY>, transport: T) -> Self {
        Self::with_transfer_config(storage, bus, transport, TransferConfig::default())
    }

    /// Assemble the controller with explicit transfer tunables.
    pub fn with_transfer_config(
        storage: S,
        bus: BusEngine<SPI, CS, RDY>,
        transport: T,
        cfg: TransferConfig,
    ) -> Self {
        Self {
            storage,
            scheduler: ChannelScheduler::new(bus),
            receiver: Receiver::with_config(cfg),
            transport,
            diag: DiagQueue::new(),
            upload: Signal::new(),
        }
    }

    /// Load a file onto a channel (closing whatever was loaded before).
    pub async fn load(
        &mut self,
        channel: u8,
        path: &str,
        loop_enabled: bool,
    ) -> Result<(), CommandError> {
        let id = ChannelId::new(channel).ok_or(CommandError::InvalidChannel)?;
        self.scheduler
            .load(&mut self.storage, id, path, loop_enabled)
            .await
            .map_err(CommandError::from)
    }

    /// Start playback from the top of the loaded file.
    pub async fn play(&mut self, channel: u8) -> Result<(), CommandError> {
        let id = ChannelId::new(channel).ok_or(CommandError::InvalidChannel)?;
        self.scheduler.play(id).await.map_err(CommandError::from)
    }

    /// Stop one channel.
    pub async fn stop(&mut self, channel: u8) -> Result<(), CommandError> {
        let id = ChannelId::new(channel).ok_or(CommandError::InvalidChannel)?;
        self.scheduler.stop(id).await.map_err(CommandError::from)
    }

    /// Stop every playing channel.
    pub async fn stop_all(&mut self) {
        self.scheduler.stop_all().await;
    }

    /// Clamp and set a channel's volume.
    pub async fn set_volume(&mut self, channel: u8, volume: u16) -> Result<(), CommandError> {
        let id = ChannelId::new(channel).ok_or(CommandError::InvalidChannel)?;
        self.scheduler
            .set_volume(id, volume)
            .await
            .map_err(CommandError::from)
    }

    /// Snapshot every channel.
    pub fn status(&self) -> heapless::Vec<ChannelStatus, CHANNEL_COUNT> {
        self.scheduler.status()
    }

    /// State of one channel.
    pub fn channel_state(&self, channel: u8) -> Option<ChannelState> {
        ChannelId::new(channel).map(|id| self.scheduler.channel_state(id))
    }

    /// Arm a one-shot upload into `audio/ch<N>/<file_name>`.
    ///
    /// Creates the destination directories immediately; the transfer itself
    /// runs inside the next [`run_iteration`](Self::run_iteration). Arming
    /// twice before the loop consumes the request keeps the newest request.
    ///
    /// Fails with [`CommandError::StreamingActive`] while any channel is
    /// playing: an upload session and active streaming must never contend
    /// for the storage device.
    pub async fn begin_upload(
        &mut self,
        channel: u8,
        file_name: &str,
    ) -> Result<(), CommandError> {
        if ChannelId::new(channel).is_none() {
            return Err(CommandError::InvalidChannel);
        }
        if self.scheduler.any_playing() {
            return Err(CommandError::StreamingActive);
        }

        let mut dir = heapless::String::<32>::new();
        write!(dir, "audio/ch{channel}").map_err(|_| CommandError::PathTooLong)?;
        self.storage
            .create_dir_all(dir.as_str())
            .await
            .map_err(|_| CommandError::StorageFailed)?;

        let mut path = heapless::String::<PATH_LEN>::new();
        write!(path, "{dir}/{file_name}").map_err(|_| CommandError::PathTooLong)?;

        self.upload.signal(UploadRequest { channel, path });
        Ok(())
    }

    /// `true` while an upload request is armed and unconsumed.
    pub fn upload_pending(&self) -> bool {
        self.upload.signaled()
    }

    /// Queue diagnostic text for the next drain. Never blocks; the oldest
    /// backlog is overwritten under pressure.
    pub fn push_diag(&mut self, text: &[u8]) {
        self.diag.push_slice(text);
    }

    /// One cooperative loop iteration: diag drain, upload consumption,
    /// scheduler tick.
    ///
    /// Returns the outcome of an upload if one was consumed this iteration.
    /// The request is disarmed *before* the receiver runs, so a failed
    /// session never re-triggers by itself.
    pub async fn run_iteration(
        &mut self,
        diag_port: &mut impl DiagPort,
    ) -> Option<UploadOutcome<T::Error, S::Error>> {
        diag::drain(&mut self.diag, diag_port);

        let outcome = match self.upload.try_take() {
            Some(request) => Some(
                self.receiver
                    .run(&mut self.transport, &mut self.storage, request.path.as_str())
                    .await,
            ),
            None => None,
        };

        self.scheduler.tick().await;
        outcome
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use bus::engine::{PeerLines, TransferCompletion};
    use bus::protocol::PEER_COUNT;
    use embassy_time::Duration;
    use platform::mocks::{
        MemStorage, MockDiagPort, MockInputPin, MockOutputPin, MockSpi, ScriptedTransport,
    };

    fn fast_cfg() -> TransferConfig {
        TransferConfig {
            start_interval: Duration::from_millis(5),
            start_attempts: 2,
            packet_timeout: Duration::from_millis(20),
            timeout_retry_limit: 2,
            reject_retry_limit: 3,
            retry_pause: Duration::from_millis(1),
            ..TransferConfig::default()
        }
    }

    fn controller(
        storage: MemStorage,
        transport: ScriptedTransport,
    ) -> Controller<MemStorage, MockSpi, MockOutputPin, MockInputPin, ScriptedTransport> {
        let completion: &'static TransferCompletion =
            Box::leak(Box::new(TransferCompletion::new()));
        let spi = MockSpi::new().on_start(move || completion.signal());
        let peers = core::array::from_fn::<_, PEER_COUNT, _>(|_| {
            let (select, _, _) = MockOutputPin::new(false);
            let (ready, _) = MockInputPin::new(false); // always ready
            PeerLines { select, ready }
        });
        let engine = BusEngine::new(spi, peers, completion);
        Controller::with_transfer_config(storage, engine, transport, fast_cfg())
    }

    fn build_wav(samples: &[u16]) -> Vec<u8> {
        let mut data = Vec::new();
        for &s in samples {
            data.extend_from_slice(&s.to_le_bytes());
        }
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&((4 + 24 + 8 + data.len()) as u32).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&32_000u32.to_le_bytes());
        out.extend_from_slice(&64_000u32.to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&((samples.len() * 2) as u32).to_le_bytes());
        out.extend_from_slice(&data);
        out
    }

    #[tokio::test]
    async fn begin_upload_rejects_invalid_channel() {
        let mut c = controller(MemStorage::new(), ScriptedTransport::new());
        assert_eq!(
            c.begin_upload(6, "x.wav").await,
            Err(CommandError::InvalidChannel)
        );
    }

    #[tokio::test]
    async fn begin_upload_rejected_while_streaming() {
        let mut storage = MemStorage::new();
        let samples: Vec<u16> = (0..64).collect();
        storage.insert("audio/ch0/t.wav", &build_wav(&samples));
        let mut c = controller(storage, ScriptedTransport::new());

        c.load(0, "audio/ch0/t.wav", true).await.unwrap();
        c.play(0).await.unwrap();
        assert_eq!(
            c.begin_upload(1, "new.wav").await,
            Err(CommandError::StreamingActive)
        );

        // stop_all clears the contention and arming succeeds.
        c.stop_all().await;
        c.begin_upload(1, "new.wav").await.unwrap();
        assert!(c.upload_pending());
    }

    #[tokio::test]
    async fn begin_upload_arms_and_the_loop_consumes() {
        let mut c = controller(MemStorage::new(), ScriptedTransport::new());
        c.begin_upload(4, "clip.wav").await.unwrap();
        assert!(c.upload_pending());
        let mut port = MockDiagPort::new();
        let _ = c.run_iteration(&mut port).await; // consume (fails fast, no sender)
        assert!(!c.upload_pending());
    }

    #[tokio::test]
    async fn upload_request_is_one_shot() {
        let mut c = controller(MemStorage::new(), ScriptedTransport::new());
        c.begin_upload(0, "f.bin").await.unwrap();
        let mut port = MockDiagPort::new();

        let first = c.run_iteration(&mut port).await;
        assert!(first.is_some(), "armed request consumed");
        assert!(!c.upload_pending());

        let second = c.run_iteration(&mut port).await;
        assert!(second.is_none(), "a failed session must not re-trigger");
    }

    #[tokio::test]
    async fn newest_upload_request_wins() {
        let mut c = controller(MemStorage::new(), ScriptedTransport::new());
        c.begin_upload(0, "old.bin").await.unwrap();
        c.begin_upload(2, "new.bin").await.unwrap();
        assert!(c.upload_pending());
        // Only one consumption happens.
        let mut port = MockDiagPort::new();
        assert!(c.run_iteration(&mut port).await.is_some());
        assert!(c.run_iteration(&mut port).await.is_none());
    }

    #[tokio::test]
    async fn diag_drains_each_iteration() {
        let mut c = controller(MemStorage::new(), ScriptedTransport::new());
        c.push_diag(b"line one\r\n");
        let mut port = MockDiagPort::new();
        c.run_iteration(&mut port).await;
        assert_eq!(port.accepted(), b"line one\r\n");
    }

    #[tokio::test]
    async fn invalid_channel_is_rejected_across_the_surface() {
        let mut c = controller(MemStorage::new(), ScriptedTransport::new());
        assert_eq!(
            c.load(9, "x.wav", false).await,
            Err(CommandError::InvalidChannel)
        );
        assert_eq!(c.play(9).await, Err(CommandError::InvalidChannel));
        assert_eq!(c.stop(9).await, Err(CommandError::InvalidChannel));
        assert_eq!(c.set_volume(9, 100).await, Err(CommandError::InvalidChannel));
        assert_eq!(c.channel_state(9), None);
    }

    #[tokio::test]
    async fn status_covers_every_channel() {
        let c = controller(MemStorage::new(), ScriptedTransport::new());
        let status = c.status();
        assert_eq!(status.len(), CHANNEL_COUNT);
        assert!(status.iter().all(|s| s.state == ChannelState::Idle));
    }
}
