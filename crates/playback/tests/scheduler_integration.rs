//! End-to-end scheduler tests: a real WAV container in in-memory storage,
//! streamed through the bus engine to mock peers.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing,
    clippy::cast_possible_truncation
)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bus::engine::{BusEngine, PeerLines, TransferCompletion};
use bus::protocol::PEER_COUNT;
use playback::channel::{ChannelId, ChannelState};
use playback::scheduler::ChannelScheduler;
use platform::mocks::{MemStorage, MockInputPin, MockOutputPin, MockSpi, SpiActivity};

fn build_wav(rate: u32, channels: u16, bits: u16, samples: &[u16]) -> Vec<u8> {
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
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&rate.to_le_bytes());
    out.extend_from_slice(&(rate * u32::from(channels) * 2).to_le_bytes());
    out.extend_from_slice(&(channels * 2).to_le_bytes());
    out.extend_from_slice(&bits.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&((samples.len() * 2) as u32).to_le_bytes());
    out.extend_from_slice(&data);
    out
}

struct Rig {
    scheduler: ChannelScheduler<MockSpi, MockOutputPin, MockInputPin, platform::mocks::MemFile>,
    storage: MemStorage,
    activity: Arc<Mutex<SpiActivity>>,
    ready_levels: Vec<Arc<AtomicBool>>,
}

fn rig() -> Rig {
    let completion: &'static TransferCompletion =
        Box::leak(Box::new(TransferCompletion::new()));
    let spi = MockSpi::new().on_start(move || completion.signal());
    let activity = spi.activity();
    let mut ready_levels = Vec::new();
    let peers = core::array::from_fn::<_, PEER_COUNT, _>(|_| {
        let (select, _level, _asserts) = MockOutputPin::new(false);
        let (ready, rdy) = MockInputPin::new(false); // low = ready
        ready_levels.push(rdy);
        PeerLines { select, ready }
    });
    let engine = BusEngine::new(spi, peers, completion);
    Rig {
        scheduler: ChannelScheduler::new(engine),
        storage: MemStorage::new(),
        activity,
        ready_levels,
    }
}

fn ch(raw: u8) -> ChannelId {
    ChannelId::new(raw).unwrap()
}

#[tokio::test]
async fn plays_whole_file_then_stops() {
    let mut rig = rig();
    let total = 5000usize; // 2048 + 2048 + 904
    let samples: Vec<u16> = (0..total as u16).map(|i| i & 0x0FFF).collect();
    rig.storage
        .insert("audio/ch0/tone.wav", &build_wav(32_000, 1, 16, &samples));

    rig.scheduler
        .load(&mut rig.storage, ch(0), "audio/ch0/tone.wav", false)
        .await
        .unwrap();
    assert_eq!(rig.scheduler.channel_state(ch(0)), ChannelState::Stopped);

    rig.scheduler.play(ch(0)).await.unwrap();
    assert_eq!(rig.scheduler.channel_state(ch(0)), ChannelState::Playing);

    for _ in 0..16 {
        if rig.scheduler.channel_state(ch(0)) != ChannelState::Playing {
            break;
        }
        rig.scheduler.tick().await;
    }

    assert_eq!(rig.scheduler.channel_state(ch(0)), ChannelState::Stopped);
    let status = rig.scheduler.status();
    assert_eq!(status[0].samples_sent, total as u32);
    assert_eq!(status[0].total_samples, total as u32);

    let log = rig.activity.lock().unwrap();
    // Play + volume refresh at start, stop at EOF.
    assert_eq!(log.written[0][2], 0x01, "Play opcode first");
    assert_eq!(log.written[1][2], 0x03, "volume refresh follows");
    assert_eq!(log.written.last().unwrap()[2], 0x02, "Stop at EOF");
    // Three data packets: 2048, 2048, 904 samples.
    assert_eq!(log.started.len(), 3);
    assert_eq!(&log.started[0][..4], &[0xDA, 0x00, 0x08, 0x00]);
    assert_eq!(&log.started[2][..4], &[0xDA, 0x00, 0x03, 0x88]);
}

#[tokio::test]
async fn loop_mode_rewinds_and_keeps_playing() {
    let mut rig = rig();
    let samples: Vec<u16> = (0..100).collect();
    rig.storage
        .insert("audio/ch0/loop.wav", &build_wav(32_000, 1, 16, &samples));

    rig.scheduler
        .load(&mut rig.storage, ch(0), "audio/ch0/loop.wav", true)
        .await
        .unwrap();
    rig.scheduler.play(ch(0)).await.unwrap();

    // Each pair of ticks streams the whole file then rewinds.
    for _ in 0..6 {
        rig.scheduler.tick().await;
    }
    assert_eq!(rig.scheduler.channel_state(ch(0)), ChannelState::Playing);
    let sent = rig.scheduler.status()[0].samples_sent;
    assert!(sent > 100, "looped past EOF, sent {sent}");
}

#[tokio::test]
async fn not_ready_peer_receives_nothing() {
    let mut rig = rig();
    let samples: Vec<u16> = (0..64).collect();
    rig.storage
        .insert("audio/ch2/t.wav", &build_wav(32_000, 1, 16, &samples));

    // Channel 2 lives on peer 1; drive that ready line high (busy).
    rig.ready_levels[1].store(true, Ordering::SeqCst);

    rig.scheduler
        .load(&mut rig.storage, ch(2), "audio/ch2/t.wav", false)
        .await
        .unwrap();
    rig.scheduler.play(ch(2)).await.unwrap();
    rig.scheduler.tick().await;
    rig.scheduler.tick().await;

    assert_eq!(rig.activity.lock().unwrap().started.len(), 0);
    assert_eq!(rig.scheduler.channel_state(ch(2)), ChannelState::Playing);

    // Peer frees up; streaming resumes.
    rig.ready_levels[1].store(false, Ordering::SeqCst);
    rig.scheduler.tick().await;
    assert_eq!(rig.activity.lock().unwrap().started.len(), 1);
}

#[tokio::test]
async fn one_channel_error_never_stalls_the_others() {
    let mut rig = rig();
    let samples: Vec<u16> = (0..32).collect();
    rig.storage
        .insert("audio/ch0/ok.wav", &build_wav(32_000, 1, 16, &samples));

    // Channel 1's load fails outright (missing file) and parks it in Error.
    assert!(rig
        .scheduler
        .load(&mut rig.storage, ch(1), "audio/ch1/missing.wav", false)
        .await
        .is_err());
    assert_eq!(rig.scheduler.channel_state(ch(1)), ChannelState::Error);

    rig.scheduler
        .load(&mut rig.storage, ch(0), "audio/ch0/ok.wav", false)
        .await
        .unwrap();
    rig.scheduler.play(ch(0)).await.unwrap();
    for _ in 0..4 {
        rig.scheduler.tick().await;
    }
    assert_eq!(rig.scheduler.channel_state(ch(0)), ChannelState::Stopped);
    assert_eq!(rig.scheduler.status()[0].samples_sent, 32);
}

#[tokio::test]
async fn wrong_sample_rate_is_rejected_at_load() {
    let mut rig = rig();
    let samples: Vec<u16> = (0..16).collect();
    rig.storage
        .insert("audio/ch0/cd.wav", &build_wav(44_100, 1, 16, &samples));

    let err = rig
        .scheduler
        .load(&mut rig.storage, ch(0), "audio/ch0/cd.wav", false)
        .await
        .unwrap_err();
    assert_eq!(err, playback::scheduler::ControlError::InvalidFormat);
    assert_eq!(rig.scheduler.channel_state(ch(0)), ChannelState::Error);
}

#[tokio::test]
async fn volume_is_clamped_to_twelve_bits() {
    let mut rig = rig();
    rig.scheduler.set_volume(ch(3), 9999).await.unwrap();
    assert_eq!(rig.scheduler.status()[3].volume, 4095);

    let log = rig.activity.lock().unwrap();
    let frame = log.written.last().unwrap();
    // Channel 3 = peer 1, sub-channel 1; param = 0x0FFF.
    assert_eq!(frame.as_slice(), &[0xC0, 0x01, 0x03, 0x0F, 0xFF]);
}

#[tokio::test]
async fn stop_is_effective_even_mid_file() {
    let mut rig = rig();
    let samples: Vec<u16> = (0..4096).map(|i| i & 0x0FFF).collect();
    rig.storage
        .insert("audio/ch0/long.wav", &build_wav(32_000, 1, 16, &samples));

    rig.scheduler
        .load(&mut rig.storage, ch(0), "audio/ch0/long.wav", false)
        .await
        .unwrap();
    rig.scheduler.play(ch(0)).await.unwrap();
    rig.scheduler.tick().await; // first chunk only
    rig.scheduler.stop(ch(0)).await.unwrap();
    assert_eq!(rig.scheduler.channel_state(ch(0)), ChannelState::Stopped);

    let sent_after_stop = rig.scheduler.status()[0].samples_sent;
    rig.scheduler.tick().await;
    assert_eq!(
        rig.scheduler.status()[0].samples_sent,
        sent_after_stop,
        "no further data after stop"
    );
}
