//! Byte-stream transports for the file-transfer link.
//!
//! The transfer receiver speaks to the far end through exactly two
//! operations — "read N bytes with a timeout" and "write one byte" — so
//! either physical link (the command UART or the USB-CDC ring fed by the
//! receive interrupt) can carry a session through the same interface.

use embassy_time::Duration;

use crate::byte_ring::ByteRing;

/// A byte-stream transport capable of carrying a transfer session.
pub trait Transport {
    /// Error type for hard link faults. A timeout is not an error: it is
    /// reported as a short read.
    type Error: core::fmt::Debug;

    /// Read up to `buf.len()` bytes, waiting at most `timeout`.
    ///
    /// Returns the number of bytes read; fewer than requested only when the
    /// timeout elapsed first.
    fn read(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> impl core::future::Future<Output = Result<usize, Self::Error>>;

    /// Transmit a single byte, blocking until it is accepted by the link.
    fn write_byte(
        &mut self,
        byte: u8,
    ) -> impl core::future::Future<Output = Result<(), Self::Error>>;

    /// Enter exclusive (binary) mode for the duration of a session.
    ///
    /// Default: no-op. The USB-CDC transport discards buffered command-mode
    /// bytes here so they are not mistaken for packet data.
    fn begin_session(&mut self) {}

    /// Leave exclusive mode after a session ends (any outcome).
    fn end_session(&mut self) {}
}

/// Non-blocking sink for diagnostic text (the log UART).
///
/// `try_write` returns `false` when the port cannot accept the byte right
/// now; the caller keeps the byte queued and retries on a later iteration.
pub trait DiagPort {
    /// Offer one byte to the port. Never blocks.
    fn try_write(&mut self, byte: u8) -> bool;
}

/// [`Transport`] adapter over an `embedded-io-async` byte stream (the UART
/// path).
pub struct IoTransport<T> {
    inner: T,
}

impl<T> IoTransport<T> {
    /// Wrap a byte stream.
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Consume the adapter, returning the underlying stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T> Transport for IoTransport<T>
where
    T: embedded_io_async::Read + embedded_io_async::Write,
{
    type Error = T::Error;

    async fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, Self::Error> {
        let start = embassy_time::Instant::now();
        let mut filled = 0;
        while filled < buf.len() {
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                break;
            }
            let remaining = timeout.checked_sub(elapsed).unwrap_or(Duration::from_ticks(0));
            let slice = buf.get_mut(filled..).unwrap_or(&mut []);
            match embassy_time::with_timeout(remaining, self.inner.read(slice)).await {
                Ok(Ok(0)) => break, // stream closed
                Ok(Ok(n)) => filled = filled.saturating_add(n),
                Ok(Err(e)) => return Err(e),
                Err(embassy_time::TimeoutError) => break,
            }
        }
        Ok(filled)
    }

    async fn write_byte(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.inner.write_all(&[byte]).await?;
        self.inner.flush().await
    }
}

/// [`Transport`] over a [`ByteRing`] fed by the receive interrupt, with an
/// `embedded-io-async` writer for the return path (the USB-CDC path).
///
/// `begin_session` clears the ring so stale command-mode bytes never leak
/// into the first packet.
pub struct RingTransport<'a, W, const N: usize> {
    rx: &'a ByteRing<N>,
    tx: W,
}

impl<'a, W, const N: usize> RingTransport<'a, W, N> {
    /// Build a transport reading from `rx` and writing through `tx`.
    pub fn new(rx: &'a ByteRing<N>, tx: W) -> Self {
        Self { rx, tx }
    }
}

impl<W, const N: usize> Transport for RingTransport<'_, W, N>
where
    W: embedded_io_async::Write,
{
    type Error = W::Error;

    async fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, Self::Error> {
        Ok(self.rx.read_into(buf, timeout).await)
    }

    async fn write_byte(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.tx.write_all(&[byte]).await?;
        self.tx.flush().await
    }

    fn begin_session(&mut self) {
        self.rx.clear();
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

    /// Minimal in-memory embedded-io stream for the adapter tests.
    struct LoopbackIo {
        incoming: std::collections::VecDeque<u8>,
        outgoing: Vec<u8>,
    }

    impl embedded_io_async::ErrorType for LoopbackIo {
        type Error = core::convert::Infallible;
    }

    impl embedded_io_async::Read for LoopbackIo {
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            if self.incoming.is_empty() {
                // Pend forever; IoTransport's timeout bounds the wait.
                core::future::pending::<()>().await;
            }
            let mut n = 0;
            while n < buf.len() {
                match self.incoming.pop_front() {
                    Some(b) => {
                        buf[n] = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        }
    }

    impl embedded_io_async::Write for LoopbackIo {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            self.outgoing.extend_from_slice(buf);
            Ok(buf.len())
        }
    }

    #[tokio::test]
    async fn io_transport_reads_available_bytes() {
        let io = LoopbackIo {
            incoming: [1u8, 2, 3].into_iter().collect(),
            outgoing: Vec::new(),
        };
        let mut t = IoTransport::new(io);
        let mut buf = [0u8; 3];
        let n = t.read(&mut buf, Duration::from_millis(50)).await.unwrap();
        assert_eq!(n, 3);
        assert_eq!(buf, [1, 2, 3]);
    }

    #[tokio::test]
    async fn io_transport_short_read_on_timeout() {
        let io = LoopbackIo {
            incoming: [7u8].into_iter().collect(),
            outgoing: Vec::new(),
        };
        let mut t = IoTransport::new(io);
        let mut buf = [0u8; 4];
        let n = t.read(&mut buf, Duration::from_millis(10)).await.unwrap();
        assert_eq!(n, 1);
        assert_eq!(buf[0], 7);
    }

    #[tokio::test]
    async fn io_transport_write_byte() {
        let io = LoopbackIo {
            incoming: std::collections::VecDeque::new(),
            outgoing: Vec::new(),
        };
        let mut t = IoTransport::new(io);
        t.write_byte(0x06).await.unwrap();
        t.write_byte(0x15).await.unwrap();
        assert_eq!(t.into_inner().outgoing, vec![0x06, 0x15]);
    }

    #[tokio::test]
    async fn ring_transport_begin_session_clears_stale_bytes() {
        let ring: ByteRing<32> = ByteRing::new();
        ring.push_slice(b"STATUS\r\n"); // leftover command-mode traffic
        let io = LoopbackIo {
            incoming: std::collections::VecDeque::new(),
            outgoing: Vec::new(),
        };
        let mut t = RingTransport::new(&ring, io);
        t.begin_session();
        ring.push_slice(&[0x01, 0x00, 0xFF]);
        let mut buf = [0u8; 3];
        let n = t.read(&mut buf, Duration::from_millis(10)).await.unwrap();
        assert_eq!(n, 3);
        assert_eq!(buf, [0x01, 0x00, 0xFF]);
    }
}
