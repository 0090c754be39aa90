//! Reliable file-transfer receiver — the packet/retry/CRC state machine that
//! accepts a file over an unreliable byte stream and lands it on storage in
//! size-aligned batches.
#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]

pub mod crc;
pub mod protocol;
pub mod receiver;

pub use crc::crc16_xmodem;
pub use receiver::{Receiver, SessionEnd, TransferConfig, TransferError};
