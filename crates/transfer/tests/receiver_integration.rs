//! Transfer-receiver integration against the local filesystem: batching,
//! granularity padding, and final-length truncation end to end.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing,
    clippy::cast_possible_truncation
)]

use embassy_time::Duration;
use platform::mocks::ScriptedTransport;
use platform::storage_local::LocalFileStorage;
use tempfile::TempDir;
use transfer::crc16_xmodem;
use transfer::protocol::{EOT, SOH, STX};
use transfer::{Receiver, SessionEnd, TransferConfig};

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
    let size = if header == SOH { 128 } else { 1024 };
    let mut body = payload.to_vec();
    body.resize(size, 0x1A); // senders pad the tail of the last block
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
    let mut body = payload;
    body.resize(128, 0);
    let crc = crc16_xmodem(&body);
    let mut out = vec![SOH, 0, 0xFF];
    out.extend_from_slice(&body);
    out.extend_from_slice(&crc.to_be_bytes());
    out
}

/// 3000 bytes in three 1024-byte blocks with a 512-byte storage write
/// granularity stores exactly 3000 bytes on disk — neither the sender's
/// sub-block padding nor the batch padding survives.
#[tokio::test]
async fn three_long_blocks_store_exactly_3000_bytes() {
    let tmp = TempDir::new().unwrap();
    let mut storage = LocalFileStorage::new(tmp.path().to_str().unwrap());
    let body: Vec<u8> = (0u32..3000).map(|i| (i * 7 % 256) as u8).collect();

    let mut transport = ScriptedTransport::new()
        .feed(&file_info("big.bin", 3000))
        .feed(&packet(STX, 1, &body[..1024]))
        .feed(&packet(STX, 2, &body[1024..2048]))
        .feed(&packet(STX, 3, &body[2048..]))
        .feed(&[EOT]);

    let mut receiver = Receiver::with_config(fast_config());
    let end = receiver
        .run(&mut transport, &mut storage, "big.bin")
        .await
        .unwrap();
    assert_eq!(end, SessionEnd::Completed { bytes: 3000 });

    let stored = std::fs::read(tmp.path().join("big.bin")).unwrap();
    assert_eq!(stored.len(), 3000);
    assert_eq!(stored, body);
}

/// A multi-batch file: more than one 8 KiB flush plus a padded remainder.
#[tokio::test]
async fn large_file_crosses_batch_boundaries() {
    let tmp = TempDir::new().unwrap();
    let mut storage = LocalFileStorage::new(tmp.path().to_str().unwrap());
    let total = 20_000usize; // 19 long blocks + remainder, 2 full batches
    let body: Vec<u8> = (0..total).map(|i| (i % 253) as u8).collect();

    let mut transport = ScriptedTransport::new().feed(&file_info("t.bin", total));
    let mut block = 1u8;
    for chunk in body.chunks(1024) {
        transport = transport.feed(&packet(STX, block, chunk));
        block = block.wrapping_add(1);
    }
    transport = transport.feed(&[EOT]);

    let mut receiver = Receiver::with_config(fast_config());
    let end = receiver
        .run(&mut transport, &mut storage, "t.bin")
        .await
        .unwrap();
    assert_eq!(end, SessionEnd::Completed { bytes: total as u64 });

    let stored = std::fs::read(tmp.path().join("t.bin")).unwrap();
    assert_eq!(stored, body);
}

/// The receiver's buffers are reused across sessions without bleed-through.
#[tokio::test]
async fn receiver_is_reusable_across_sessions() {
    let tmp = TempDir::new().unwrap();
    let mut storage = LocalFileStorage::new(tmp.path().to_str().unwrap());
    let mut receiver = Receiver::with_config(fast_config());

    let first: Vec<u8> = vec![0xAA; 1000];
    let mut t1 = ScriptedTransport::new()
        .feed(&file_info("one.bin", 1000))
        .feed(&packet(STX, 1, &first))
        .feed(&[EOT]);
    receiver.run(&mut t1, &mut storage, "one.bin").await.unwrap();

    let second: Vec<u8> = vec![0x55; 200];
    let mut t2 = ScriptedTransport::new()
        .feed(&file_info("two.bin", 200))
        .feed(&packet(SOH, 1, &second[..128]))
        .feed(&packet(SOH, 2, &second[128..]))
        .feed(&[EOT]);
    receiver.run(&mut t2, &mut storage, "two.bin").await.unwrap();

    assert_eq!(std::fs::read(tmp.path().join("one.bin")).unwrap(), first);
    assert_eq!(std::fs::read(tmp.path().join("two.bin")).unwrap(), second);
}
