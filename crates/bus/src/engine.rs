//! The bus protocol engine.
//!
//! Owns the per-peer select/ready lines and the per-peer transfer buffers,
//! and tracks the single in-flight background transfer allowed across all
//! peers. Completion of that transfer is signalled from interrupt context
//! through [`TransferCompletion`]; the interrupt side mutates nothing but the
//! flag, and the engine releases the peer select when it next observes the
//! completion — either inside [`wait_complete`](BusEngine::wait_complete) or
//! lazily at the next [`send_data`](BusEngine::send_data).

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_futures::yield_now;
use embassy_time::{Duration, Instant, Timer};

use platform::gpio::{InputPin, OutputPin};
use platform::spi::SpiPeripheral;

use crate::protocol::{
    command_frame, data_header, Opcode, PeerId, SubChannel, DATA_HEADER_LEN,
    MAX_SAMPLES_PER_TRANSFER, PEER_COUNT, TRANSFER_BUF_LEN,
};

/// Settle time after asserting a peer select, dominated by peer wake-up.
const SELECT_SETTLE_US: u64 = 100;

/// Settle time before releasing a peer select.
const RELEASE_SETTLE_US: u64 = 2;

/// Completion flag shared between the hardware transfer-complete interrupt
/// and the engine.
///
/// The interrupt handler calls [`signal`](Self::signal) and nothing else —
/// no filesystem, no bus traffic, no blocking work. Lives in a `static` so
/// the interrupt can reach it without a lock.
pub struct TransferCompletion {
    done: AtomicBool,
}

impl TransferCompletion {
    /// New, unsignalled.
    pub const fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
        }
    }

    /// Mark the in-flight transfer complete. Interrupt-safe: flag mutation
    /// only.
    pub fn signal(&self) {
        self.done.store(true, Ordering::Release);
    }

    fn take(&self) -> bool {
        self.done.swap(false, Ordering::AcqRel)
    }

    fn clear(&self) {
        self.done.store(false, Ordering::Release);
    }
}

impl Default for TransferCompletion {
    fn default() -> Self {
        Self::new()
    }
}

/// The two dedicated lines wiring one peer to the controller.
pub struct PeerLines<CS, RDY> {
    /// Select line, asserted low for the peer's exclusive-access window.
    pub select: CS,
    /// Ready line, asserted low when the peer can accept a data block.
    pub ready: RDY,
}

/// Errors surfaced by engine operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError<E> {
    /// Peer index does not address a configured peer.
    InvalidPeer,
    /// A background transfer is still in flight; retry on a later tick.
    Busy,
    /// The in-flight transfer did not complete within the wait budget;
    /// recoverable — the engine stays armed and reaps the completion later.
    Timeout,
    /// Payload is empty or exceeds the transfer buffer capacity.
    InvalidLength,
    /// Transport-level failure from the bus peripheral.
    Spi(E),
}

impl<E: core::fmt::Debug> core::fmt::Display for BusError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidPeer => f.write_str("invalid peer id"),
            Self::Busy => f.write_str("transfer already in flight"),
            Self::Timeout => f.write_str("transfer completion timed out"),
            Self::InvalidLength => f.write_str("payload length out of range"),
            Self::Spi(e) => write!(f, "bus peripheral error: {e:?}"),
        }
    }
}

/// Protocol engine for the shared serial bus.
///
/// Generic over the bus peripheral and the two pin types so the whole engine
/// runs against mocks on the host.
pub struct BusEngine<SPI, CS, RDY> {
    spi: SPI,
    peers: [PeerLines<CS, RDY>; PEER_COUNT],
    /// One transfer buffer per peer, owned exclusively by the engine for the
    /// lifetime of an in-flight transfer.
    tx_bufs: [[u8; TRANSFER_BUF_LEN]; PEER_COUNT],
    completion: &'static TransferCompletion,
    in_flight: Option<PeerId>,
}

impl<SPI, CS, RDY> BusEngine<SPI, CS, RDY>
where
    SPI: SpiPeripheral,
    CS: OutputPin,
    RDY: InputPin,
{
    /// Build the engine and drive every select line to its released (high)
    /// state.
    pub fn new(
        spi: SPI,
        mut peers: [PeerLines<CS, RDY>; PEER_COUNT],
        completion: &'static TransferCompletion,
    ) -> Self {
        for lines in &mut peers {
            lines.select.set_high();
        }
        Self {
            spi,
            peers,
            tx_bufs: [[0u8; TRANSFER_BUF_LEN]; PEER_COUNT],
            completion,
            in_flight: None,
        }
    }

    /// Sample a peer's ready line. Active low: low means the peer can accept
    /// a data block. Commands are never gated on this; data packets must be.
    pub fn check_ready(&self, peer: PeerId) -> bool {
        self.peers
            .get(peer.index())
            .is_some_and(|lines| lines.ready.is_low())
    }

    /// `true` while a background transfer is armed and not yet reaped.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Transmit a command packet inside the peer's exclusive-access window.
    ///
    /// Synchronous: blocks for the duration of the 5-byte transfer. Commands
    /// are deliberately issued regardless of the ready line.
    pub async fn send_command(
        &mut self,
        peer: PeerId,
        sub: SubChannel,
        opcode: Opcode,
        param: u16,
    ) -> Result<(), BusError<SPI::Error>> {
        let frame = command_frame(sub, opcode, param);
        self.assert_select(peer).await?;
        let result = self.spi.write(&frame).await;
        self.release_select(peer).await?;
        result.map_err(BusError::Spi)
    }

    /// Start a background data transfer of `samples` to the peer.
    ///
    /// Fails fast with [`BusError::Busy`] when a previous transfer has not
    /// completed yet (after first reaping a completion that has already been
    /// signalled). Returns as soon as the transfer is started; pair with
    /// [`wait_complete`](Self::wait_complete).
    pub async fn send_data(
        &mut self,
        peer: PeerId,
        sub: SubChannel,
        samples: &[u16],
    ) -> Result<(), BusError<SPI::Error>> {
        if samples.is_empty() || samples.len() > MAX_SAMPLES_PER_TRANSFER {
            return Err(BusError::InvalidLength);
        }
        if self.in_flight.is_some() {
            // A completion may have fired since the last wait timed out.
            if self.completion.take() {
                self.finish_in_flight().await;
            } else {
                return Err(BusError::Busy);
            }
        }

        #[allow(clippy::cast_possible_truncation)] // len <= MAX_SAMPLES_PER_TRANSFER (2048)
        let count = samples.len() as u16;
        let header = data_header(sub, count);
        let total = DATA_HEADER_LEN.saturating_add(samples.len().saturating_mul(2));
        {
            let buf = self
                .tx_bufs
                .get_mut(peer.index())
                .ok_or(BusError::InvalidPeer)?;
            if let Some(head) = buf.get_mut(..DATA_HEADER_LEN) {
                head.copy_from_slice(&header);
            }
            // Samples travel little-endian, matching the peer DAC firmware.
            if let Some(payload) = buf.get_mut(DATA_HEADER_LEN..total) {
                for (slot, &sample) in payload.chunks_exact_mut(2).zip(samples) {
                    slot.copy_from_slice(&sample.to_le_bytes());
                }
            }
        }

        self.assert_select(peer).await?;
        self.completion.clear();
        self.in_flight = Some(peer);

        let buf = self.tx_bufs.get(peer.index()).ok_or(BusError::InvalidPeer)?;
        let data = buf.get(..total).ok_or(BusError::InvalidLength)?;
        if let Err(e) = self.spi.start_write(data) {
            self.in_flight = None;
            self.release_select(peer).await?;
            return Err(BusError::Spi(e));
        }
        Ok(())
    }

    /// Poll the completion flag until the in-flight transfer finishes or
    /// `timeout` elapses.
    ///
    /// The poll yields to the executor on every iteration so the completion
    /// interrupt (and everything else) keeps running. A timeout is an error
    /// but not a failure of the engine: the transfer stays armed and is
    /// reaped when the completion eventually arrives.
    pub async fn wait_complete(&mut self, timeout: Duration) -> Result<(), BusError<SPI::Error>> {
        if self.in_flight.is_none() {
            return Ok(());
        }
        let start = Instant::now();
        loop {
            if self.completion.take() {
                self.finish_in_flight().await;
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(BusError::Timeout);
            }
            yield_now().await;
        }
    }

    async fn finish_in_flight(&mut self) {
        if let Some(peer) = self.in_flight.take() {
            let _ = self.release_select(peer).await;
        }
    }

    /// Assert the peer select (low) and hold through the settle window the
    /// peer needs to wake its receive path.
    async fn assert_select(&mut self, peer: PeerId) -> Result<(), BusError<SPI::Error>> {
        let lines = self.peers.get_mut(peer.index()).ok_or(BusError::InvalidPeer)?;
        lines.select.set_low();
        Timer::after_micros(SELECT_SETTLE_US).await;
        Ok(())
    }

    /// Release the peer select (high) after a short tail settle.
    async fn release_select(&mut self, peer: PeerId) -> Result<(), BusError<SPI::Error>> {
        let lines = self.peers.get_mut(peer.index()).ok_or(BusError::InvalidPeer)?;
        Timer::after_micros(RELEASE_SETTLE_US).await;
        lines.select.set_high();
        Ok(())
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
    use platform::mocks::{MockInputPin, MockOutputPin, MockSpi};
    use std::sync::atomic::Ordering as AtomicOrdering;
    use std::sync::Arc;

    fn leak_completion() -> &'static TransferCompletion {
        Box::leak(Box::new(TransferCompletion::new()))
    }

    struct Harness {
        engine: BusEngine<MockSpi, MockOutputPin, MockInputPin>,
        completion: &'static TransferCompletion,
        activity: Arc<std::sync::Mutex<platform::mocks::SpiActivity>>,
        fail_write: Arc<std::sync::atomic::AtomicBool>,
        select_levels: Vec<Arc<std::sync::atomic::AtomicBool>>,
        ready_levels: Vec<Arc<std::sync::atomic::AtomicBool>>,
    }

    fn harness(auto_complete: bool) -> Harness {
        let completion = leak_completion();
        let spi = if auto_complete {
            MockSpi::new().on_start(move || completion.signal())
        } else {
            MockSpi::new()
        };
        let activity = spi.activity();
        let fail_write = spi.fail_next_write();
        let mut select_levels = Vec::new();
        let mut ready_levels = Vec::new();
        let peers = core::array::from_fn::<_, PEER_COUNT, _>(|_| {
            let (select, level, _asserts) = MockOutputPin::new(false);
            let (ready, rdy_level) = MockInputPin::new(true); // high = not ready
            select_levels.push(level);
            ready_levels.push(rdy_level);
            PeerLines { select, ready }
        });
        let engine = BusEngine::new(spi, peers, completion);
        Harness {
            engine,
            completion,
            activity,
            fail_write,
            select_levels,
            ready_levels,
        }
    }

    fn peer(raw: u8) -> PeerId {
        PeerId::new(raw).unwrap()
    }

    fn sub(raw: u8) -> SubChannel {
        SubChannel::new(raw).unwrap()
    }

    #[test]
    fn new_releases_every_select_line() {
        let h = harness(false);
        for level in &h.select_levels {
            assert!(level.load(AtomicOrdering::SeqCst), "select must idle high");
        }
    }

    #[tokio::test]
    async fn send_command_frames_five_bytes() {
        let mut h = harness(false);
        h.engine
            .send_command(peer(1), sub(0), Opcode::Play, 0)
            .await
            .unwrap();
        let log = h.activity.lock().unwrap();
        assert_eq!(log.written, vec![vec![0xC0, 0x00, 0x01, 0x00, 0x00]]);
        assert!(log.started.is_empty());
    }

    #[tokio::test]
    async fn send_command_ignores_ready_line() {
        let mut h = harness(false);
        // Ready lines idle high (peer busy) — commands must still go out.
        assert!(!h.engine.check_ready(peer(2)));
        h.engine
            .send_command(peer(2), sub(1), Opcode::SetVolume, 4095)
            .await
            .unwrap();
        let log = h.activity.lock().unwrap();
        assert_eq!(log.written[0], vec![0xC0, 0x01, 0x03, 0x0F, 0xFF]);
    }

    #[tokio::test]
    async fn send_command_releases_select_after_failure() {
        let mut h = harness(false);
        h.fail_write.store(true, AtomicOrdering::SeqCst);
        let err = h
            .engine
            .send_command(peer(0), sub(0), Opcode::Stop, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::Spi(_)));
        assert!(h.select_levels[0].load(AtomicOrdering::SeqCst));
    }

    #[tokio::test]
    async fn check_ready_is_active_low() {
        let h = harness(false);
        assert!(!h.engine.check_ready(peer(0)));
        h.ready_levels[0].store(false, AtomicOrdering::SeqCst);
        assert!(h.engine.check_ready(peer(0)));
    }

    #[tokio::test]
    async fn send_data_frames_header_and_le_samples() {
        let mut h = harness(true);
        let samples = [0x0123u16, 0x0FFF];
        h.engine.send_data(peer(0), sub(1), &samples).await.unwrap();
        h.engine
            .wait_complete(Duration::from_millis(100))
            .await
            .unwrap();
        let log = h.activity.lock().unwrap();
        assert_eq!(
            log.started[0],
            vec![0xDA, 0x01, 0x00, 0x02, 0x23, 0x01, 0xFF, 0x0F]
        );
        drop(log);
        assert!(
            h.select_levels[0].load(AtomicOrdering::SeqCst),
            "select released after completion"
        );
    }

    #[tokio::test]
    async fn send_data_rejects_oversize_and_empty() {
        let mut h = harness(true);
        let empty: [u16; 0] = [];
        assert!(matches!(
            h.engine.send_data(peer(0), sub(0), &empty).await,
            Err(BusError::InvalidLength)
        ));
        let oversize = vec![0u16; MAX_SAMPLES_PER_TRANSFER + 1];
        assert!(matches!(
            h.engine.send_data(peer(0), sub(0), &oversize).await,
            Err(BusError::InvalidLength)
        ));
    }

    #[tokio::test]
    async fn second_send_while_busy_fails_fast() {
        let mut h = harness(false); // completion never fires by itself
        let samples = [1u16; 8];
        h.engine.send_data(peer(0), sub(0), &samples).await.unwrap();
        let err = h
            .engine
            .send_data(peer(1), sub(0), &samples)
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::Busy));
        // Nothing further reached the wire.
        assert_eq!(h.activity.lock().unwrap().started.len(), 1);
    }

    #[tokio::test]
    async fn wait_complete_times_out_then_recovers() {
        let mut h = harness(false);
        let samples = [7u16; 4];
        h.engine.send_data(peer(2), sub(0), &samples).await.unwrap();

        let err = h
            .engine
            .wait_complete(Duration::from_millis(5))
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::Timeout));
        assert!(h.engine.is_busy());
        assert!(
            !h.select_levels[2].load(AtomicOrdering::SeqCst),
            "select stays asserted across a timeout"
        );

        // The completion interrupt eventually fires; the next send reaps it.
        h.completion.signal();
        h.engine.send_data(peer(0), sub(0), &samples).await.unwrap();
        assert!(
            h.select_levels[2].load(AtomicOrdering::SeqCst),
            "stale select released by the reap"
        );
    }

    #[tokio::test]
    async fn wait_complete_without_transfer_is_ok() {
        let mut h = harness(false);
        h.engine
            .wait_complete(Duration::from_millis(1))
            .await
            .unwrap();
    }
}
