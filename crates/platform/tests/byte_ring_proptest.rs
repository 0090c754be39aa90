//! Property-based tests for the SPSC byte ring and the diagnostic queue.
//! Verifies invariants hold for ALL valid inputs, not just fixed examples.

#![allow(clippy::arithmetic_side_effects, clippy::indexing_slicing)]

use platform::byte_ring::{ByteRing, DiagQueue};

proptest::proptest! {
    /// Whatever interleaving of pushes and pops occurs, bytes come out in
    /// FIFO order and none are duplicated or invented.
    #[test]
    fn byte_ring_preserves_fifo_order(ops in proptest::collection::vec(proptest::bool::ANY, 0..256)) {
        let ring: ByteRing<16> = ByteRing::new();
        let mut next_in: u8 = 0;
        let mut next_out: u8 = 0;
        for push in ops {
            if push {
                if ring.push(next_in).is_ok() {
                    next_in = next_in.wrapping_add(1);
                }
            } else if let Some(byte) = ring.pop() {
                assert_eq!(byte, next_out, "FIFO order broken");
                next_out = next_out.wrapping_add(1);
            }
        }
        // Drain the remainder; the sequences must meet exactly.
        while let Some(byte) = ring.pop() {
            assert_eq!(byte, next_out);
            next_out = next_out.wrapping_add(1);
        }
        assert_eq!(next_in, next_out, "bytes lost or invented");
    }

    /// len() never exceeds usable capacity (N - 1) and matches the
    /// difference between pushes accepted and pops served.
    #[test]
    fn byte_ring_len_is_derived_occupancy(data in proptest::collection::vec(0u8..=255, 0..64)) {
        let ring: ByteRing<32> = ByteRing::new();
        let accepted = ring.push_slice(&data);
        assert!(ring.len() <= 31);
        assert_eq!(ring.len(), accepted);
        let mut popped = 0usize;
        while ring.pop().is_some() {
            popped += 1;
        }
        assert_eq!(popped, accepted);
        assert!(ring.is_empty());
    }

    /// The diagnostic queue never holds more than its capacity and always
    /// yields the most recent bytes when overrun.
    #[test]
    fn diag_queue_keeps_newest_bytes(data in proptest::collection::vec(0u8..=255, 0..256)) {
        let mut q: DiagQueue<8> = DiagQueue::new();
        q.push_slice(&data);
        assert!(q.len() <= 8);
        let tail_len = data.len().min(8);
        let expected = &data[data.len() - tail_len..];
        let mut drained = Vec::new();
        while let Some(b) = q.pop() {
            drained.push(b);
        }
        assert_eq!(drained, expected);
    }
}
