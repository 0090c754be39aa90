//! Lock-free single-producer single-consumer byte ring, plus the
//! overwrite-on-full queue used for outbound diagnostic text.
//!
//! [`ByteRing`] bridges an asynchronous byte-arrival event (the USB receive
//! callback, running at interrupt priority) and the synchronous consumer in
//! the run loop. It uses atomic head/tail indices; occupancy is always
//! derived from the two indices and never independently counted, so one
//! concurrent writer and one concurrent reader are safe without a lock.
//!
//! # Safety Contract
//!
//! - Only ONE context may call [`push()`](ByteRing::push) (the "producer").
//! - Only ONE context may call [`pop()`](ByteRing::pop) /
//!   [`clear()`](ByteRing::clear) / [`read_into()`](ByteRing::read_into)
//!   (the "consumer").
//! - These may be different contexts (ISR vs. main loop) running
//!   concurrently.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicUsize, Ordering};

use embassy_time::{Duration, Instant, Timer};

/// A lock-free SPSC ring of bytes.
///
/// The usable capacity is `N - 1` (one slot is reserved for full/empty
/// disambiguation via the Lamport queue algorithm).
pub struct ByteRing<const N: usize> {
    buf: [UnsafeCell<u8>; N],
    /// Write position (only modified by the producer).
    head: AtomicUsize,
    /// Read position (only modified by the consumer).
    tail: AtomicUsize,
}

// SAFETY: The SPSC contract (single producer, single consumer) ensures that
// head and tail are each modified by exactly one side, and the Acquire/Release
// pairs on them order the buffer accesses. A slot is never read and written
// concurrently: the producer only writes slots outside [tail, head), the
// consumer only reads slots inside it.
unsafe impl<const N: usize> Sync for ByteRing<N> {}
unsafe impl<const N: usize> Send for ByteRing<N> {}

impl<const N: usize> ByteRing<N> {
    /// Create a new empty ring.
    ///
    /// This function is `const` so rings may live in `static` variables and
    /// be shared with the receive interrupt without a runtime initialiser.
    pub const fn new() -> Self {
        assert!(N >= 2, "byte ring must have at least 2 slots (1 usable)");
        Self {
            // SAFETY: an all-zero array of UnsafeCell<u8> is a valid value;
            // UnsafeCell is a transparent wrapper.
            buf: unsafe { MaybeUninit::<[UnsafeCell<u8>; N]>::zeroed().assume_init() },
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// Push one byte (producer side).
    ///
    /// Returns `Err(byte)` when the ring is full; the byte is dropped by
    /// the caller, never silently overwritten.
    #[allow(clippy::arithmetic_side_effects)] // Safety: index wrap via % N, N >= 2
    #[allow(clippy::indexing_slicing)] // Safety: head < N invariant
    pub fn push(&self, byte: u8) -> Result<(), u8> {
        let head = self.head.load(Ordering::Relaxed);
        let next = (head + 1) % N;
        if next == self.tail.load(Ordering::Acquire) {
            return Err(byte);
        }
        // SAFETY: we are the sole producer; `next != tail` guarantees the
        // consumer is not reading this slot.
        unsafe {
            *self.buf[head].get() = byte;
        }
        // Release ordering makes the slot write visible before head advances.
        self.head.store(next, Ordering::Release);
        Ok(())
    }

    /// Push a slice (producer side), returning the number of bytes accepted.
    ///
    /// Stops at the first byte that does not fit.
    pub fn push_slice(&self, bytes: &[u8]) -> usize {
        for (i, &b) in bytes.iter().enumerate() {
            if self.push(b).is_err() {
                return i;
            }
        }
        bytes.len()
    }

    /// Pop one byte (consumer side). Returns `None` when empty.
    #[allow(clippy::arithmetic_side_effects)] // Safety: index wrap via % N, N >= 2
    #[allow(clippy::indexing_slicing)] // Safety: tail < N invariant
    pub fn pop(&self) -> Option<u8> {
        let tail = self.tail.load(Ordering::Relaxed);
        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }
        // SAFETY: we are the sole consumer; `tail != head` guarantees the
        // slot holds a byte the producer has published.
        let byte = unsafe { *self.buf[tail].get() };
        self.tail.store((tail + 1) % N, Ordering::Release);
        Some(byte)
    }

    /// Number of bytes currently readable.
    ///
    /// Derived from the two indices; exact from the consumer's point of
    /// view, a lower bound from the producer's.
    #[allow(clippy::arithmetic_side_effects)] // Safety: (head + N - tail) < 2N, wrap via % N
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (head + N - tail) % N
    }

    /// `true` when no bytes are readable.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard all buffered bytes (consumer side).
    ///
    /// Used when entering a transfer session so stale command-mode bytes are
    /// not mistaken for packet data.
    pub fn clear(&self) {
        self.tail
            .store(self.head.load(Ordering::Acquire), Ordering::Release);
    }

    /// Read up to `buf.len()` bytes, waiting up to `timeout` for data
    /// (consumer side).
    ///
    /// Polls at a 1 ms cadence while the ring is empty so the producer-side
    /// interrupt always gets serviced between polls. Returns the number of
    /// bytes read, which is less than `buf.len()` only if the timeout
    /// elapsed first.
    pub async fn read_into(&self, buf: &mut [u8], timeout: Duration) -> usize {
        let start = Instant::now();
        let mut filled = 0;
        while filled < buf.len() {
            match self.pop() {
                Some(byte) => {
                    if let Some(slot) = buf.get_mut(filled) {
                        *slot = byte;
                    }
                    filled = filled.saturating_add(1);
                }
                None => {
                    if start.elapsed() >= timeout {
                        break;
                    }
                    Timer::after_millis(1).await;
                }
            }
        }
        filled
    }
}

impl<const N: usize> Default for ByteRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-capacity byte queue for outbound diagnostic text.
///
/// Single-context (not shared with interrupts): both producer and consumer
/// run in the main loop. When full, the **oldest** bytes are overwritten so
/// that a stalled drain degrades log history, never forward progress.
pub struct DiagQueue<const N: usize> {
    buf: [u8; N],
    /// Index of the next slot to read from.
    read: usize,
    /// Index of the next slot to write to.
    write: usize,
    /// Number of valid bytes currently held.
    count: usize,
}

impl<const N: usize> DiagQueue<N> {
    /// Create a new, empty queue.
    pub const fn new() -> Self {
        Self {
            buf: [0u8; N],
            read: 0,
            write: 0,
            count: 0,
        }
    }

    /// Append one byte, overwriting the oldest byte when full.
    #[allow(clippy::arithmetic_side_effects)] // Safety: index wrap via % N; count <= N
    #[allow(clippy::indexing_slicing)] // Safety: write < N, read < N invariants
    pub fn push(&mut self, byte: u8) {
        if self.count == N {
            // Drop the oldest byte to make room.
            self.read = (self.read + 1) % N;
            self.count -= 1;
        }
        self.buf[self.write] = byte;
        self.write = (self.write + 1) % N;
        self.count += 1;
    }

    /// Append a slice, overwriting the oldest bytes when full.
    pub fn push_slice(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.push(b);
        }
    }

    /// Remove and return the oldest byte, or `None` when empty.
    #[allow(clippy::arithmetic_side_effects)] // Safety: index wrap via % N; count > 0 checked
    #[allow(clippy::indexing_slicing)] // Safety: read < N invariant
    pub fn pop(&mut self) -> Option<u8> {
        if self.count == 0 {
            return None;
        }
        let byte = self.buf[self.read];
        self.read = (self.read + 1) % N;
        self.count -= 1;
        Some(byte)
    }

    /// The oldest byte without removing it, or `None` when empty.
    #[allow(clippy::indexing_slicing)] // Safety: read < N invariant
    pub fn peek(&self) -> Option<u8> {
        if self.count == 0 {
            None
        } else {
            Some(self.buf[self.read])
        }
    }

    /// Number of bytes currently queued.
    pub fn len(&self) -> usize {
        self.count
    }

    /// `true` when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Maximum number of bytes the queue can hold.
    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for DiagQueue<N> {
    fn default() -> Self {
        Self::new()
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

    #[test]
    fn ring_push_then_pop() {
        let ring: ByteRing<8> = ByteRing::new();
        ring.push(0xAA).unwrap();
        ring.push(0xBB).unwrap();
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.pop(), Some(0xAA));
        assert_eq!(ring.pop(), Some(0xBB));
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn ring_full_rejects_byte() {
        let ring: ByteRing<4> = ByteRing::new();
        // Usable capacity is N - 1 = 3.
        assert_eq!(ring.push_slice(&[1, 2, 3]), 3);
        assert_eq!(ring.push(4), Err(4));
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn ring_wraps_around() {
        let ring: ByteRing<4> = ByteRing::new();
        for round in 0u8..10 {
            ring.push(round).unwrap();
            assert_eq!(ring.pop(), Some(round));
        }
        assert!(ring.is_empty());
    }

    #[test]
    fn ring_clear_discards_pending() {
        let ring: ByteRing<8> = ByteRing::new();
        ring.push_slice(b"junk");
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.pop(), None);
    }

    #[tokio::test]
    async fn ring_read_into_times_out_short() {
        let ring: ByteRing<8> = ByteRing::new();
        ring.push_slice(&[1, 2]);
        let mut buf = [0u8; 4];
        let n = ring.read_into(&mut buf, Duration::from_millis(10)).await;
        assert_eq!(n, 2);
        assert_eq!(&buf[..2], &[1, 2]);
    }

    #[tokio::test]
    async fn ring_read_into_fills_exact() {
        let ring: ByteRing<16> = ByteRing::new();
        ring.push_slice(&[9; 5]);
        let mut buf = [0u8; 5];
        let n = ring.read_into(&mut buf, Duration::from_millis(10)).await;
        assert_eq!(n, 5);
        assert_eq!(buf, [9; 5]);
    }

    #[test]
    fn ring_concurrent_producer_consumer() {
        use std::sync::Arc;

        let ring: Arc<ByteRing<64>> = Arc::new(ByteRing::new());
        let producer = {
            let ring = Arc::clone(&ring);
            std::thread::spawn(move || {
                for i in 0u32..10_000 {
                    #[allow(clippy::cast_possible_truncation)]
                    let byte = (i % 251) as u8;
                    while ring.push(byte).is_err() {
                        std::thread::yield_now();
                    }
                }
            })
        };
        let mut received = Vec::with_capacity(10_000);
        while received.len() < 10_000 {
            match ring.pop() {
                Some(b) => received.push(b),
                None => std::thread::yield_now(),
            }
        }
        producer.join().unwrap();
        for (i, &b) in received.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let expected = (i % 251) as u8;
            assert_eq!(b, expected, "FIFO order broken at index {i}");
        }
    }

    #[test]
    fn diag_queue_overwrites_oldest() {
        let mut q: DiagQueue<4> = DiagQueue::new();
        q.push_slice(b"abcd");
        assert_eq!(q.len(), 4);
        q.push(b'e'); // overwrites 'a'
        assert_eq!(q.len(), 4);
        assert_eq!(q.pop(), Some(b'b'));
        assert_eq!(q.pop(), Some(b'c'));
        assert_eq!(q.pop(), Some(b'd'));
        assert_eq!(q.pop(), Some(b'e'));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn diag_queue_fifo() {
        let mut q: DiagQueue<16> = DiagQueue::new();
        q.push_slice(b"log line");
        let mut out = Vec::new();
        while let Some(b) = q.pop() {
            out.push(b);
        }
        assert_eq!(out, b"log line");
    }
}
