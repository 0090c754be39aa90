//! Hardware adapters binding the platform traits to embassy-stm32.
//!
//! Bring-up status: the bus path (SPI + select/ready lines) is wired with a
//! blocking SPI fallback whose `start_write` completes synchronously and
//! signals the completion flag itself.
//!
//! # TODO
//! - Switch `PollingSpi` to the SPI1 TX DMA channel and signal
//!   [`TransferCompletion`](bus::engine::TransferCompletion) from the
//!   transfer-complete interrupt instead of inline.
//! - Replace [`NullTransport`] with `IoTransport` over the command
//!   `BufferedUart` once the USB-CDC ring feed lands.

use bus::engine::TransferCompletion;
use embassy_stm32::dma::NoDma;
use embassy_stm32::gpio::{AnyPin, Input, Output};
use embassy_stm32::peripherals::SPI1;
use embassy_stm32::spi::Spi;
use embassy_time::{Duration, Timer};

use platform::gpio::{InputPin, OutputPin};
use platform::spi::SpiPeripheral;
use platform::transport::{DiagPort, Transport};

/// Peer-select line (push-pull output, idles high).
pub struct SelectPin(pub Output<'static, AnyPin>);

impl OutputPin for SelectPin {
    fn set_high(&mut self) {
        self.0.set_high();
    }

    fn set_low(&mut self) {
        self.0.set_low();
    }
}

/// Peer ready line (pulled-up input, active low).
pub struct ReadyPin(pub Input<'static, AnyPin>);

impl InputPin for ReadyPin {
    fn is_high(&self) -> bool {
        self.0.is_high()
    }
}

/// Blocking-SPI bring-up fallback.
///
/// `start_write` transmits synchronously and signals the completion flag
/// before returning, so the engine's busy/complete protocol behaves exactly
/// as it will once the DMA path is in.
pub struct PollingSpi {
    spi: Spi<'static, SPI1, NoDma, NoDma>,
    completion: &'static TransferCompletion,
}

impl PollingSpi {
    /// Wrap a configured transmit-only SPI.
    pub fn new(spi: Spi<'static, SPI1, NoDma, NoDma>, completion: &'static TransferCompletion) -> Self {
        Self { spi, completion }
    }
}

impl SpiPeripheral for PollingSpi {
    type Error = embassy_stm32::spi::Error;

    async fn write(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.spi.blocking_write(data)
    }

    fn start_write(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.spi.blocking_write(data)?;
        self.completion.signal();
        Ok(())
    }
}

/// Placeholder upload transport: every read times out, writes vanish.
pub struct NullTransport;

impl Transport for NullTransport {
    type Error = core::convert::Infallible;

    async fn read(&mut self, _buf: &mut [u8], timeout: Duration) -> Result<usize, Self::Error> {
        Timer::after(timeout).await;
        Ok(0)
    }

    async fn write_byte(&mut self, _byte: u8) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Diagnostic port that forwards completed lines to defmt.
pub struct RttDiag {
    line: heapless::String<128>,
}

impl RttDiag {
    /// Empty line buffer.
    pub const fn new() -> Self {
        Self {
            line: heapless::String::new(),
        }
    }
}

impl Default for RttDiag {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagPort for RttDiag {
    fn try_write(&mut self, byte: u8) -> bool {
        if byte == b'\n' {
            defmt::info!("{=str}", self.line.as_str());
            self.line.clear();
            return true;
        }
        if byte == b'\r' {
            return true;
        }
        if self.line.push(byte as char).is_err() {
            defmt::info!("{=str}", self.line.as_str());
            self.line.clear();
            let _ = self.line.push(byte as char);
        }
        true
    }
}
