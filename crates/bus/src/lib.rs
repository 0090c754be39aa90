//! Bus protocol engine — command/data framing for the shared serial bus to
//! the DAC peer boards, per-peer select/ready signalling, and the single
//! in-flight background transfer with its interrupt-signalled completion.
#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]

pub mod engine;
pub mod protocol;

pub use engine::{BusEngine, BusError, PeerLines, TransferCompletion};
pub use protocol::{Opcode, PeerId, SubChannel, PEER_COUNT, SUB_CHANNELS_PER_PEER};
