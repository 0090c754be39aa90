//! Audio playback — fixed-format WAV sample sources and the per-tick
//! multi-channel streaming scheduler.
#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]

pub mod channel;
pub mod scheduler;
pub mod wav;

pub use channel::{ChannelId, ChannelState, ChannelStatus, CHANNEL_COUNT};
pub use scheduler::{ChannelScheduler, ControlError, DEFAULT_VOLUME, MAX_VOLUME};
pub use wav::{WavSource, WavError};
