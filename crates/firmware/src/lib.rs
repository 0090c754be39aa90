//! Multi-channel audio distribution controller firmware.
//!
//! A master node streams decoded PCM over a shared serial bus to DAC peer
//! boards while accepting new audio files from a host over a USB-serial
//! link. One cooperative run loop drives everything; the only preemptive
//! code path is the bus engine's transfer-complete interrupt.
//!
//! # Architecture
//!
//! ```text
//! Run loop + command surface (this crate)
//!         ↓
//! playback (scheduler, WAV sources)   transfer (upload receiver)
//!         ↓                                   ↓
//! bus (serial bus engine)             platform transports
//!         ↓
//! Platform HAL (Embassy, STM32)
//! ```
//!
//! # Features
//!
//! - `hardware` - build for the STM32H723 target (embassy, defmt)
//! - `std` - host-side testing support
//!
//! # Hardware Target
//!
//! ```bash
//! cargo build --release --target thumbv7em-none-eabihf --features hardware
//! ```

#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::await_holding_lock)]
#![deny(unsafe_op_in_unsafe_fn)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod controller;
pub mod diag;
#[cfg(feature = "hardware")]
pub mod hal;

pub use controller::{CommandError, Controller, UploadOutcome, UploadRequest};
