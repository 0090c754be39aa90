//! Hardware Abstraction Layer for the multi-channel audio distribution
//! controller.
//!
//! This crate provides trait-based abstractions for every hardware seam the
//! protocol engines touch, enabling development and testing without physical
//! hardware.
//!
//! # Architecture Layers
//!
//! ```text
//! Run loop + command surface (firmware crate)
//!         ↓
//! Protocol engines (bus, playback, transfer)
//!         ↓
//! Platform HAL (this crate - trait abstractions)
//!         ↓
//! Hardware Layer (Embassy HAL + PAC)
//! ```
//!
//! # Abstractions
//!
//! - [`gpio`] - peer-select and ready-line pin traits
//! - [`spi`] - the shared serial bus peripheral
//! - [`transport`] - byte-stream transports for the file-transfer link
//! - [`storage`] - file system access (read and write paths)
//! - [`byte_ring`] - SPSC byte ring and the diagnostic text queue
//!
//! # Features
//!
//! - `std`: standard library support (mocks, local-filesystem storage)
//! - `hardware`: physical hardware implementations
//! - `defmt`: enable defmt derives on platform types

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::must_use_candidate)] // hardware accessors — callers decide
#![allow(clippy::missing_errors_doc)]
#![allow(async_fn_in_trait)] // single-executor no_std: Send bounds not needed

pub mod byte_ring;
pub mod gpio;
pub mod spi;
pub mod storage;
pub mod transport;

#[cfg(any(test, feature = "std"))]
pub mod mocks;
#[cfg(any(test, feature = "std"))]
pub mod storage_local;
#[cfg(feature = "hardware")]
pub mod storage_sdmmc;

// Re-export main traits
pub use byte_ring::{ByteRing, DiagQueue};
pub use gpio::{InputPin, OutputPin, PinState};
pub use spi::SpiPeripheral;
pub use storage::{File, Storage};
pub use transport::{DiagPort, IoTransport, RingTransport, Transport};
