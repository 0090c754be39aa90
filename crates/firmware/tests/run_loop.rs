//! Whole-firmware round trip: a WAV container uploaded over the transfer
//! protocol, then loaded and streamed to a peer by the scheduler — all
//! through the cooperative run loop.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing,
    clippy::cast_possible_truncation
)]

use bus::engine::{BusEngine, PeerLines, TransferCompletion};
use bus::protocol::PEER_COUNT;
use embassy_time::Duration;
use firmware::Controller;
use playback::channel::ChannelState;
use platform::mocks::{MemStorage, MockDiagPort, MockInputPin, MockOutputPin, MockSpi, ScriptedTransport};
use transfer::crc16_xmodem;
use transfer::protocol::{EOT, SOH, STX};
use transfer::{SessionEnd, TransferConfig};

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

fn packet(header: u8, block: u8, payload: &[u8]) -> Vec<u8> {
    let size = if header == SOH { 128 } else { 1024 };
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

fn fast_cfg() -> TransferConfig {
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

#[tokio::test]
async fn uploaded_file_plays_back_to_completion() {
    // A 1500-sample tone: two long blocks on the wire, one bus chunk.
    let samples: Vec<u16> = (0..1500u16).map(|i| i & 0x0FFF).collect();
    let wav = build_wav(&samples);

    let mut transport = ScriptedTransport::new().feed(&file_info("tone.wav", wav.len()));
    let mut block = 1u8;
    for chunk in wav.chunks(1024) {
        transport = transport.feed(&packet(STX, block, chunk));
        block = block.wrapping_add(1);
    }
    let transport = transport.feed(&[EOT]);

    let completion: &'static TransferCompletion =
        Box::leak(Box::new(TransferCompletion::new()));
    let spi = MockSpi::new().on_start(move || completion.signal());
    let activity = spi.activity();
    let peers = core::array::from_fn::<_, PEER_COUNT, _>(|_| {
        let (select, _, _) = MockOutputPin::new(false);
        let (ready, _) = MockInputPin::new(false); // peers always ready
        PeerLines { select, ready }
    });
    let engine = BusEngine::new(spi, peers, completion);
    let mut controller =
        Controller::with_transfer_config(MemStorage::new(), engine, transport, fast_cfg());
    let mut diag_port = MockDiagPort::new();

    // Arm and run the upload inside the loop.
    controller.push_diag(b"upload requested\r\n");
    controller.begin_upload(0, "tone.wav").await.unwrap();
    let outcome = controller.run_iteration(&mut diag_port).await;
    match outcome {
        Some(Ok(SessionEnd::Completed { bytes })) => {
            assert_eq!(bytes as usize, wav.len());
        }
        other => panic!("upload failed: {other:?}"),
    }
    assert_eq!(diag_port.accepted(), b"upload requested\r\n");

    // The file the transfer landed is immediately loadable and playable.
    controller
        .load(0, "audio/ch0/tone.wav", false)
        .await
        .unwrap();
    controller.play(0).await.unwrap();

    for _ in 0..10 {
        if controller.channel_state(0) != Some(ChannelState::Playing) {
            break;
        }
        controller.run_iteration(&mut diag_port).await;
    }

    assert_eq!(controller.channel_state(0), Some(ChannelState::Stopped));
    let status = controller.status();
    assert_eq!(status[0].samples_sent, 1500);
    assert_eq!(status[0].total_samples, 1500);

    // One data packet of 1500 samples reached the bus, then the EOF stop.
    let log = activity.lock().unwrap();
    assert_eq!(log.started.len(), 1);
    assert_eq!(&log.started[0][..4], &[0xDA, 0x00, 0x05, 0xDC]);
    assert_eq!(log.written.last().unwrap()[2], 0x02, "Stop command at EOF");
}
