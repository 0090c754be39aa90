//! Multi-channel audio distribution controller - hardware entry point.
//!
//! Hardware-only entry point for STM32H723ZG.

#![no_std]
#![no_main]

use embassy_executor::Spawner;
use embassy_stm32::dma::NoDma;
use embassy_stm32::gpio::{Input, Level, Output, Pin, Pull, Speed};
use embassy_stm32::spi::{Config as SpiConfig, Spi};
use embassy_stm32::time::Hertz;
use embassy_time::Timer;

use bus::engine::{BusEngine, PeerLines, TransferCompletion};
use firmware::hal::{NullTransport, PollingSpi, ReadyPin, RttDiag, SelectPin};
use firmware::Controller;
use platform::storage_sdmmc::SdmmcStorage;

use defmt_rtt as _;
// Panic handler
use panic_probe as _;

/// Completion flag shared with the SPI transfer-complete path.
///
/// Today the blocking bring-up SPI signals it inline; once the TX DMA
/// channel is wired, its transfer-complete interrupt takes over and nothing
/// else changes.
static TRANSFER_DONE: TransferCompletion = TransferCompletion::new();

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    defmt::info!("audio distribution controller v{=str}", "0.1.0");
    defmt::info!("initializing STM32H723ZG");

    let p = embassy_stm32::init(Default::default());

    // Shared serial bus: SPI1 transmit-only, mode 0.
    let mut spi_config = SpiConfig::default();
    spi_config.frequency = Hertz(10_000_000);
    let spi = Spi::new_txonly(p.SPI1, p.PA5, p.PA7, NoDma, NoDma, spi_config);

    // Peer select lines idle high (released); ready lines are pulled up and
    // driven low by a peer that can accept a data block.
    let peers = [
        PeerLines {
            select: SelectPin(Output::new(p.PE2.degrade(), Level::High, Speed::VeryHigh)),
            ready: ReadyPin(Input::new(p.PE3.degrade(), Pull::Up)),
        },
        PeerLines {
            select: SelectPin(Output::new(p.PE4.degrade(), Level::High, Speed::VeryHigh)),
            ready: ReadyPin(Input::new(p.PE5.degrade(), Pull::Up)),
        },
        PeerLines {
            select: SelectPin(Output::new(p.PE6.degrade(), Level::High, Speed::VeryHigh)),
            ready: ReadyPin(Input::new(p.PE7.degrade(), Pull::Up)),
        },
    ];

    let engine = BusEngine::new(PollingSpi::new(spi, &TRANSFER_DONE), peers, &TRANSFER_DONE);

    // TODO: mount the card with embedded-sdmmc over SDMMC1 (HSI48 kernel
    // clock) and replace this stub — load/upload return NotImplemented
    // until then. Pins: PC12 CLK, PD2 CMD, PC8-PC11 D0-D3.
    let storage = SdmmcStorage::new();

    // TODO: feed a static ByteRing from the USB-CDC receive interrupt and
    // hand `RingTransport` (or `IoTransport` over the command UART) here.
    let transport = NullTransport;

    let mut controller = Controller::new(storage, engine, transport);
    let mut diag = RttDiag::new();

    defmt::info!("run loop started: {=usize} playback channels", playback::channel::CHANNEL_COUNT);
    controller.push_diag(b"system ready\n");

    loop {
        if let Some(outcome) = controller.run_iteration(&mut diag).await {
            match outcome {
                Ok(end) => defmt::info!("upload session finished: {}", end),
                Err(_) => defmt::warn!("upload session failed"),
            }
        }
        // Idle pacing between iterations.
        Timer::after_millis(1).await;
    }
}
