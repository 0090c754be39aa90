//! The transfer-session state machine.
//!
//! ```text
//! AwaitSender ──first packet──▶ FileInfo ──ack──▶ Receiving ──EOT──▶ Done
//!      │                           │                  │ └─CAN──▶ Cancelled
//!      └─retries exhausted─▶ Failed└─bad block/CRC─▶ Failed (hard)
//! ```
//!
//! Once started, a session runs to completion without yielding to the
//! channel scheduler — potentially minutes for a large file. That is a
//! deliberate trade-off carried over from the tight per-packet timing
//! budget: audio playback stalls for the duration of an upload, and the run
//! loop suppresses diagnostic draining for the same window.
//!
//! Accepted payload accumulates in a fixed batch buffer and is written to
//! storage in size-aligned bursts; the batch buffer is reused (never
//! concurrently) across sessions.

use embassy_time::{Duration, Timer};

use platform::storage::{File, Storage};
use platform::transport::Transport;

use crate::crc::crc16_xmodem;
use crate::protocol::{FrameKind, ACK, CAN, CRC_REQUEST, MAX_PACKET, NAK, PACKET_OVERHEAD};

/// Write-accumulation capacity; also the default flush threshold.
pub const BATCH_CAPACITY: usize = 8192;

/// Session tunables.
///
/// The defaults reproduce the production timing budget; tests shrink the
/// intervals to keep the suite fast.
#[derive(Debug, Clone, Copy)]
pub struct TransferConfig {
    /// Interval between start-byte invitations while waiting for a sender.
    pub start_interval: Duration,
    /// Invitation attempts before giving up on the sender entirely.
    pub start_attempts: u32,
    /// Per-packet receive timeout once a session is live.
    pub packet_timeout: Duration,
    /// Consecutive receive timeouts tolerated before cancelling.
    pub timeout_retry_limit: u32,
    /// Packet rejections (bad block number or CRC) tolerated before
    /// cancelling.
    pub reject_retry_limit: u32,
    /// Pause before re-arming the receive after a timeout.
    pub retry_pause: Duration,
    /// Batch bytes accumulated before a storage write
    /// (clamped to [`BATCH_CAPACITY`]).
    pub flush_threshold: usize,
    /// Storage write granularity; the final partial batch is zero-padded up
    /// to a multiple of this.
    pub write_granularity: usize,
    /// Durable-sync cadence in accumulated payload bytes.
    pub sync_interval: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            start_interval: Duration::from_secs(1),
            start_attempts: 60,
            packet_timeout: Duration::from_secs(5),
            timeout_retry_limit: 5,
            reject_retry_limit: 10,
            retry_pause: Duration::from_millis(100),
            flush_threshold: BATCH_CAPACITY,
            write_granularity: 512,
            sync_interval: 1_048_576, // 1 MiB
        }
    }
}

/// How a session ended, short of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionEnd {
    /// Every block arrived and the file was finalised.
    Completed {
        /// Final stored length in bytes.
        bytes: u64,
    },
    /// The far end sent the cancel marker; nothing further was written.
    Cancelled,
}

/// Session-fatal failures.
#[derive(Debug)]
pub enum TransferError<TE, SE> {
    /// No sender answered the start-byte invitations.
    StartTimeout,
    /// Receive timeouts exhausted mid-session.
    PacketTimeout,
    /// The first packet was not a valid block-0 file-info packet.
    InvalidFileInfo,
    /// The file-info packet failed its checksum (hard failure, no retry).
    FileInfoCrc,
    /// Rejection retries exhausted (persistent block-number/CRC mismatch).
    RejectLimit,
    /// Hard transport fault.
    Transport(TE),
    /// Storage write/sync failure.
    Storage(SE),
}

impl<TE: core::fmt::Debug, SE: core::fmt::Debug> core::fmt::Display for TransferError<TE, SE> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::StartTimeout => f.write_str("timed out waiting for sender"),
            Self::PacketTimeout => f.write_str("receive timeouts exhausted"),
            Self::InvalidFileInfo => f.write_str("invalid file-info packet"),
            Self::FileInfoCrc => f.write_str("file-info checksum mismatch"),
            Self::RejectLimit => f.write_str("rejection retries exhausted"),
            Self::Transport(e) => write!(f, "transport fault: {e:?}"),
            Self::Storage(e) => write!(f, "storage failure: {e:?}"),
        }
    }
}

enum Frame {
    End,
    Cancel,
    Data(DataFrame),
}

struct DataFrame {
    payload_len: usize,
    block: u8,
    block_ok: bool,
    crc_ok: bool,
}

/// The transfer receiver with its reusable packet and batch buffers.
pub struct Receiver {
    cfg: TransferConfig,
    packet: [u8; MAX_PACKET],
    batch: [u8; BATCH_CAPACITY],
}

impl Receiver {
    /// Receiver with the production timing budget.
    pub fn new() -> Self {
        Self::with_config(TransferConfig::default())
    }

    /// Receiver with explicit tunables (tests shrink the intervals).
    pub fn with_config(cfg: TransferConfig) -> Self {
        Self {
            cfg,
            packet: [0u8; MAX_PACKET],
            batch: [0u8; BATCH_CAPACITY],
        }
    }

    /// Run one complete session: create `dest_path`, receive the file into
    /// it, and finalise.
    ///
    /// The destination file is synced and closed in every terminal state,
    /// and the transport's exclusive mode is released whatever the outcome.
    pub async fn run<T, S>(
        &mut self,
        transport: &mut T,
        storage: &mut S,
        dest_path: &str,
    ) -> Result<SessionEnd, TransferError<T::Error, S::Error>>
    where
        T: Transport,
        S: Storage,
        S::File: File<Error = S::Error>,
    {
        transport.begin_session();
        let result = self.session(transport, storage, dest_path).await;
        transport.end_session();
        result
    }

    async fn session<T, S>(
        &mut self,
        transport: &mut T,
        storage: &mut S,
        dest_path: &str,
    ) -> Result<SessionEnd, TransferError<T::Error, S::Error>>
    where
        T: Transport,
        S: Storage,
        S::File: File<Error = S::Error>,
    {
        let mut file = storage
            .create_file(dest_path)
            .await
            .map_err(TransferError::Storage)?;
        let outcome = self.drive(transport, &mut file).await;
        // Terminal states sync before close, success or not.
        let _ = file.sync().await;
        outcome
    }

    async fn drive<T, Fi>(
        &mut self,
        transport: &mut T,
        file: &mut Fi,
    ) -> Result<SessionEnd, TransferError<T::Error, Fi::Error>>
    where
        T: Transport,
        Fi: File,
    {
        // ── AwaitSender: invite a CRC-mode sender at a fixed cadence ──────
        let mut first = None;
        for _ in 0..self.cfg.start_attempts {
            // Invitation delivery is best-effort; a lost byte just costs one
            // interval.
            let _ = transport.write_byte(CRC_REQUEST).await;
            Timer::after_millis(10).await;
            if let Some(frame) = self
                .receive_frame(transport, self.cfg.start_interval)
                .await?
            {
                first = Some(frame);
                break;
            }
        }
        let Some(first) = first else {
            let _ = transport.write_byte(CAN).await;
            return Err(TransferError::StartTimeout);
        };

        // ── FileInfo: block 0 carries `name NUL size` ─────────────────────
        let declared_size = match first {
            Frame::Data(f) => {
                if f.block != 0 || !f.block_ok {
                    let _ = transport.write_byte(CAN).await;
                    return Err(TransferError::InvalidFileInfo);
                }
                if !f.crc_ok {
                    let _ = transport.write_byte(CAN).await;
                    return Err(TransferError::FileInfoCrc);
                }
                let declared = self
                    .packet
                    .get(3..3usize.saturating_add(f.payload_len))
                    .and_then(parse_declared_size);
                transport
                    .write_byte(ACK)
                    .await
                    .map_err(TransferError::Transport)?;
                // No start-byte invitation follows this acknowledgment: a
                // sender that streams the next packet on the bare ACK would
                // read a trailing invitation byte as data.
                declared
            }
            Frame::End | Frame::Cancel => {
                let _ = transport.write_byte(CAN).await;
                return Err(TransferError::InvalidFileInfo);
            }
        };

        // ── Receiving ─────────────────────────────────────────────────────
        let mut expected: u8 = 1;
        let mut batch_len: usize = 0;
        let mut total: u64 = 0;
        let mut last_sync: u64 = 0;
        let mut timeout_retries: u32 = 0;
        let mut reject_retries: u32 = 0;

        loop {
            let frame = match self
                .receive_frame(transport, self.cfg.packet_timeout)
                .await?
            {
                Some(f) => f,
                None => {
                    timeout_retries = timeout_retries.saturating_add(1);
                    if timeout_retries >= self.cfg.timeout_retry_limit {
                        let _ = transport.write_byte(CAN).await;
                        return Err(TransferError::PacketTimeout);
                    }
                    Timer::after(self.cfg.retry_pause).await;
                    continue;
                }
            };
            timeout_retries = 0;

            match frame {
                Frame::Cancel => {
                    // Sender abandoned the session; write nothing further.
                    return Ok(SessionEnd::Cancelled);
                }
                Frame::End => {
                    // Flush the partial batch, zero-padded to the storage
                    // write granularity; the padding is cut back off below.
                    if batch_len > 0 {
                        let padded = self.pad_batch(batch_len);
                        self.write_batch(file, padded)
                            .await
                            .map_err(TransferError::Storage)?;
                    }
                    transport
                        .write_byte(ACK)
                        .await
                        .map_err(TransferError::Transport)?;
                    let final_len = declared_size.map_or(total, |d| d.min(total));
                    file.truncate(final_len)
                        .await
                        .map_err(TransferError::Storage)?;
                    return Ok(SessionEnd::Completed { bytes: final_len });
                }
                Frame::Data(f) => {
                    let duplicate = f.block_ok && f.crc_ok && f.block == expected.wrapping_sub(1);
                    if duplicate {
                        // Our previous ACK was lost; acknowledge again but
                        // do not write or advance.
                        let _ = transport.write_byte(ACK).await;
                        reject_retries = 0;
                        continue;
                    }
                    if !f.block_ok || !f.crc_ok || f.block != expected {
                        reject_retries = reject_retries.saturating_add(1);
                        if reject_retries >= self.cfg.reject_retry_limit {
                            let _ = transport.write_byte(CAN).await;
                            return Err(TransferError::RejectLimit);
                        }
                        transport
                            .write_byte(NAK)
                            .await
                            .map_err(TransferError::Transport)?;
                        continue;
                    }

                    // Accepted.
                    reject_retries = 0;
                    expected = expected.wrapping_add(1);
                    // Mixed short/long blocks can land on an awkward batch
                    // length; flush before the append would overflow.
                    if batch_len.saturating_add(f.payload_len) > BATCH_CAPACITY {
                        self.write_batch(file, batch_len)
                            .await
                            .map_err(TransferError::Storage)?;
                        batch_len = 0;
                    }
                    batch_len = self.append_payload(batch_len, f.payload_len);
                    total = total.saturating_add(f.payload_len as u64);

                    if batch_len >= self.cfg.flush_threshold.min(BATCH_CAPACITY) {
                        self.write_batch(file, batch_len)
                            .await
                            .map_err(TransferError::Storage)?;
                        batch_len = 0;
                        if total.saturating_sub(last_sync) >= self.cfg.sync_interval {
                            let _ = file.sync().await;
                            last_sync = total;
                        }
                    }

                    transport
                        .write_byte(ACK)
                        .await
                        .map_err(TransferError::Transport)?;
                }
            }
        }
    }

    /// Read one frame: a bare EOT/CAN byte or a full data packet.
    ///
    /// `Ok(None)` covers both a receive timeout and a garbage header byte —
    /// the caller's stop-and-wait loop retries either way.
    async fn receive_frame<T, SE>(
        &mut self,
        transport: &mut T,
        timeout: Duration,
    ) -> Result<Option<Frame>, TransferError<T::Error, SE>>
    where
        T: Transport,
    {
        let mut header = [0u8; 1];
        let n = transport
            .read(&mut header, timeout)
            .await
            .map_err(TransferError::Transport)?;
        if n == 0 {
            return Ok(None);
        }
        let header_byte = header.first().copied().unwrap_or(0);
        let Some(kind) = FrameKind::from_header(header_byte) else {
            return Ok(None);
        };
        match kind {
            FrameKind::End => return Ok(Some(Frame::End)),
            FrameKind::Cancel => return Ok(Some(Frame::Cancel)),
            FrameKind::Short | FrameKind::Long => {}
        }

        let payload_len = kind.payload_len();
        // block + ~block + payload + crc hi + crc lo
        let body_len = payload_len.saturating_add(PACKET_OVERHEAD).saturating_sub(1);
        if let Some(slot) = self.packet.first_mut() {
            *slot = header_byte;
        }
        let Some(body) = self.packet.get_mut(1..1usize.saturating_add(body_len)) else {
            return Ok(None);
        };
        let n = transport
            .read(body, timeout)
            .await
            .map_err(TransferError::Transport)?;
        if n != body_len {
            return Ok(None);
        }

        let block = self.packet.get(1).copied().unwrap_or(0);
        let block_inv = self.packet.get(2).copied().unwrap_or(0);
        let payload = self
            .packet
            .get(3..3usize.saturating_add(payload_len))
            .unwrap_or(&[]);
        let crc_calc = crc16_xmodem(payload);
        let crc_hi = self
            .packet
            .get(3usize.saturating_add(payload_len))
            .copied()
            .unwrap_or(0);
        let crc_lo = self
            .packet
            .get(4usize.saturating_add(payload_len))
            .copied()
            .unwrap_or(0);
        let crc_recv = u16::from_be_bytes([crc_hi, crc_lo]);

        Ok(Some(Frame::Data(DataFrame {
            payload_len,
            block,
            block_ok: block == !block_inv,
            crc_ok: crc_calc == crc_recv,
        })))
    }

    /// Copy the packet payload into the batch; returns the new batch length.
    fn append_payload(&mut self, batch_len: usize, payload_len: usize) -> usize {
        let end = batch_len.saturating_add(payload_len).min(BATCH_CAPACITY);
        let count = end.saturating_sub(batch_len);
        if let (Some(dst), Some(src)) = (
            self.batch.get_mut(batch_len..end),
            self.packet.get(3..3usize.saturating_add(count)),
        ) {
            dst.copy_from_slice(src);
        }
        end
    }

    /// Zero-pad the batch tail up to the write granularity; returns the
    /// padded length.
    fn pad_batch(&mut self, batch_len: usize) -> usize {
        let gran = self.cfg.write_granularity.max(1);
        let padded = batch_len.div_ceil(gran).saturating_mul(gran).min(BATCH_CAPACITY);
        if let Some(tail) = self.batch.get_mut(batch_len..padded) {
            tail.fill(0);
        }
        padded
    }

    async fn write_batch<Fi: File>(&self, file: &mut Fi, len: usize) -> Result<(), Fi::Error> {
        match self.batch.get(..len) {
            Some(chunk) if !chunk.is_empty() => file.write_all(chunk).await,
            _ => Ok(()),
        }
    }
}

impl Default for Receiver {
    fn default() -> Self {
        Self::new()
    }
}

/// Block 0 payload is `file-name NUL ascii-size ...`; the declared size, when
/// present, bounds the final stored length so sender-side sub-block padding
/// and batch padding never appear in the file.
fn parse_declared_size(payload: &[u8]) -> Option<u64> {
    let mut parts = payload.splitn(2, |&b| b == 0);
    let name = parts.next()?;
    if name.is_empty() {
        return None;
    }
    let rest = parts.next()?;
    let mut size: u64 = 0;
    let mut any_digit = false;
    for &b in rest {
        if b.is_ascii_digit() {
            size = size
                .saturating_mul(10)
                .saturating_add(u64::from(b.wrapping_sub(b'0')));
            any_digit = true;
        } else {
            break;
        }
    }
    any_digit.then_some(size)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing,
    clippy::cast_possible_truncation
)]
mod tests {
    use super::*;
    use crate::protocol::{EOT, LONG_PAYLOAD, SHORT_PAYLOAD, SOH, STX};
    use platform::mocks::{MemStorage, ScriptedTransport};

    fn fast_config() -> TransferConfig {
        TransferConfig {
            start_interval: Duration::from_millis(5),
            start_attempts: 3,
            packet_timeout: Duration::from_millis(20),
            timeout_retry_limit: 3,
            reject_retry_limit: 4,
            retry_pause: Duration::from_millis(1),
            ..TransferConfig::default()
        }
    }

    fn packet(header: u8, block: u8, payload: &[u8]) -> Vec<u8> {
        let size = if header == SOH { SHORT_PAYLOAD } else { LONG_PAYLOAD };
        let mut body = payload.to_vec();
        body.resize(size, 0);
        let crc = crc16_xmodem(&body);
        let mut out = vec![header, block, !block];
        out.extend_from_slice(&body);
        out.extend_from_slice(&crc.to_be_bytes());
        out
    }

    fn file_info(name: &str, size: usize) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(name.as_bytes());
        payload.push(0);
        payload.extend_from_slice(size.to_string().as_bytes());
        packet(SOH, 0, &payload)
    }

    async fn run_session(
        transport: &mut ScriptedTransport,
        storage: &mut MemStorage,
    ) -> Result<
        SessionEnd,
        TransferError<core::convert::Infallible, platform::mocks::MemStorageError>,
    > {
        let mut receiver = Receiver::with_config(fast_config());
        receiver.run(transport, storage, "upload.bin").await
    }

    #[tokio::test]
    async fn happy_path_short_blocks() {
        let body: Vec<u8> = (0u16..300).map(|i| (i % 251) as u8).collect();
        let mut t = ScriptedTransport::new()
            .feed(&file_info("clip.wav", 300))
            .feed(&packet(SOH, 1, &body[..128]))
            .feed(&packet(SOH, 2, &body[128..256]))
            .feed(&packet(SOH, 3, &body[256..]))
            .feed(&[EOT]);
        let mut storage = MemStorage::new();
        let end = run_session(&mut t, &mut storage).await.unwrap();
        assert_eq!(end, SessionEnd::Completed { bytes: 300 });
        let stored = storage.contents("upload.bin").unwrap();
        assert_eq!(stored.len(), 300, "declared size strips padding");
        assert_eq!(&stored[..], &body[..]);
        // One invitation, then ACKs: file info + 3 blocks + EOT.
        assert_eq!(t.sent(), &[CRC_REQUEST, ACK, ACK, ACK, ACK, ACK]);
        assert_eq!(t.session_counts(), (1, 1));
    }

    #[tokio::test]
    async fn file_info_with_wrong_block_number_cancels_without_writing() {
        // Block number 2 where 0 is required.
        let mut bad = file_info("x.bin", 10);
        bad[1] = 2;
        bad[2] = !2u8;
        let mut t = ScriptedTransport::new().feed(&bad);
        let mut storage = MemStorage::new();
        match run_session(&mut t, &mut storage).await {
            Err(TransferError::InvalidFileInfo) => {}
            other => panic!("expected InvalidFileInfo, got {other:?}"),
        }
        assert_eq!(storage.contents("upload.bin").unwrap().len(), 0);
        assert_eq!(t.sent().last(), Some(&CAN));
    }

    #[tokio::test]
    async fn file_info_crc_mismatch_is_a_hard_failure() {
        let mut bad = file_info("x.bin", 10);
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;
        let mut t = ScriptedTransport::new().feed(&bad);
        let mut storage = MemStorage::new();
        match run_session(&mut t, &mut storage).await {
            Err(TransferError::FileInfoCrc) => {}
            other => panic!("expected FileInfoCrc, got {other:?}"),
        }
        assert_eq!(t.sent().last(), Some(&CAN));
    }

    #[tokio::test]
    async fn corrupt_data_block_is_nakked_then_retransmission_accepted() {
        let body = [0x5Au8; 128];
        let mut corrupt = packet(SOH, 1, &body);
        corrupt[10] ^= 0x01; // payload flip: CRC now wrong
        let mut t = ScriptedTransport::new()
            .feed(&file_info("c.bin", 128))
            .feed(&corrupt)
            .feed(&packet(SOH, 1, &body)) // retransmission, same block
            .feed(&[EOT]);
        let mut storage = MemStorage::new();
        let end = run_session(&mut t, &mut storage).await.unwrap();
        assert_eq!(end, SessionEnd::Completed { bytes: 128 });
        assert_eq!(storage.contents("upload.bin").unwrap(), body.to_vec());
        // info-ACK, NAK for the corrupt block, ACK for the retry, ACK for EOT.
        assert_eq!(t.sent(), &[CRC_REQUEST, ACK, NAK, ACK, ACK]);
    }

    #[tokio::test]
    async fn duplicate_block_is_acked_but_not_written_twice() {
        let body = [7u8; 128];
        let mut t = ScriptedTransport::new()
            .feed(&file_info("d.bin", 128))
            .feed(&packet(SOH, 1, &body))
            .feed(&packet(SOH, 1, &body)) // our ACK was lost; sender resent
            .feed(&[EOT]);
        let mut storage = MemStorage::new();
        let end = run_session(&mut t, &mut storage).await.unwrap();
        assert_eq!(end, SessionEnd::Completed { bytes: 128 });
        assert_eq!(storage.contents("upload.bin").unwrap().len(), 128);
    }

    #[tokio::test]
    async fn out_of_order_block_exhausts_reject_retries() {
        let body = [1u8; 128];
        let mut script = ScriptedTransport::new().feed(&file_info("o.bin", 512));
        // Block 5 where 1 is expected, repeated past the reject limit.
        for _ in 0..4 {
            script = script.feed(&packet(SOH, 5, &body));
        }
        let mut storage = MemStorage::new();
        match run_session(&mut script, &mut storage).await {
            Err(TransferError::RejectLimit) => {}
            other => panic!("expected RejectLimit, got {other:?}"),
        }
        assert_eq!(script.sent().last(), Some(&CAN));
    }

    #[tokio::test]
    async fn cancel_marker_ends_session_as_cancelled() {
        let body = [2u8; 128];
        let mut t = ScriptedTransport::new()
            .feed(&file_info("k.bin", 1024))
            .feed(&packet(SOH, 1, &body))
            .feed(&[CAN]);
        let mut storage = MemStorage::new();
        let end = run_session(&mut t, &mut storage).await.unwrap();
        assert_eq!(end, SessionEnd::Cancelled);
        // The buffered 128 bytes were never flushed: cancel writes nothing.
        assert_eq!(storage.contents("upload.bin").unwrap().len(), 0);
        assert_eq!(t.session_counts(), (1, 1));
    }

    #[tokio::test]
    async fn sender_never_appears_times_out() {
        let mut t = ScriptedTransport::new(); // every read times out
        let mut storage = MemStorage::new();
        match run_session(&mut t, &mut storage).await {
            Err(TransferError::StartTimeout) => {}
            other => panic!("expected StartTimeout, got {other:?}"),
        }
        // Three invitations, then the cancel.
        assert_eq!(t.sent(), &[CRC_REQUEST, CRC_REQUEST, CRC_REQUEST, CAN]);
    }

    #[tokio::test]
    async fn mid_session_timeouts_exhaust_and_cancel() {
        let mut t = ScriptedTransport::new()
            .feed(&file_info("t.bin", 4096))
            .gap()
            .gap()
            .gap();
        let mut storage = MemStorage::new();
        match run_session(&mut t, &mut storage).await {
            Err(TransferError::PacketTimeout) => {}
            other => panic!("expected PacketTimeout, got {other:?}"),
        }
        assert_eq!(t.sent().last(), Some(&CAN));
    }

    #[tokio::test]
    async fn long_blocks_with_declared_size_strip_sender_padding() {
        // 3000 bytes in three 1024-byte blocks; the sender pads the last.
        let body: Vec<u8> = (0u32..3000).map(|i| (i % 199) as u8).collect();
        let mut t = ScriptedTransport::new()
            .feed(&file_info("big.bin", 3000))
            .feed(&packet(STX, 1, &body[..1024]))
            .feed(&packet(STX, 2, &body[1024..2048]))
            .feed(&packet(STX, 3, &body[2048..]))
            .feed(&[EOT]);
        let mut storage = MemStorage::new();
        let end = run_session(&mut t, &mut storage).await.unwrap();
        assert_eq!(end, SessionEnd::Completed { bytes: 3000 });
        let stored = storage.contents("upload.bin").unwrap();
        assert_eq!(stored.len(), 3000);
        assert_eq!(&stored[..], &body[..]);
    }

    #[test]
    fn declared_size_parses_name_and_digits() {
        assert_eq!(parse_declared_size(b"a.wav\x003000 13245"), Some(3000));
        assert_eq!(parse_declared_size(b"a.wav\x00"), None);
        assert_eq!(parse_declared_size(b"\x00123"), None);
        assert_eq!(parse_declared_size(b"noterminator"), None);
    }

    #[test]
    fn default_config_matches_production_budget() {
        let cfg = TransferConfig::default();
        assert_eq!(cfg.start_attempts, 60);
        assert_eq!(cfg.timeout_retry_limit, 5);
        assert_eq!(cfg.reject_retry_limit, 10);
        assert_eq!(cfg.flush_threshold, 8192);
        assert_eq!(cfg.write_granularity, 512);
        assert_eq!(cfg.sync_interval, 1_048_576);
    }
}
