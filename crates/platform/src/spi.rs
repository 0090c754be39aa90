//! Shared serial bus peripheral abstraction.
//!
//! The bus engine issues two kinds of transmissions: small synchronous
//! command frames and large background (DMA-style) data frames whose
//! completion is signalled out-of-band by the hardware transfer controller.
//! This trait splits the two paths accordingly.

/// SPI peripheral abstraction (transmit-only master).
pub trait SpiPeripheral {
    /// Error type
    type Error: core::fmt::Debug;

    /// Transmit `data` synchronously, returning once the transfer is on the
    /// wire. Used for command frames (a handful of bytes).
    fn write(
        &mut self,
        data: &[u8],
    ) -> impl core::future::Future<Output = Result<(), Self::Error>>;

    /// Start a background transfer of `data` and return immediately.
    ///
    /// Completion is reported through the hardware transfer-complete
    /// notification, not through this trait. Implementations either hand the
    /// buffer to a DMA channel (the caller keeps the backing buffer alive and
    /// untouched until it observes the completion) or copy into an internal
    /// DMA-safe region before returning.
    fn start_write(&mut self, data: &[u8]) -> Result<(), Self::Error>;
}
