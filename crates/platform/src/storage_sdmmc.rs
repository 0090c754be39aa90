//! SDMMC-backed Storage stub for the hardware target.
//!
//! This is a placeholder that compiles but always returns `NotImplemented`.
//! The full implementation mounts the card with `embedded-sdmmc` over the
//! Embassy SDMMC peripheral.
//!
//! # TODO
//! Replace the stub bodies with `embedded-sdmmc` volume/file calls once the
//! SDMMC clock tree (HSI48 kernel clock) is configured in the boot path.

use crate::storage::{File, Storage};

/// Error type for SDMMC storage operations.
#[derive(Debug)]
pub enum SdmmcError {
    /// This stub operation is not yet implemented.
    NotImplemented,
    /// Underlying SDMMC I/O error.
    Io,
}

impl core::fmt::Display for SdmmcError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotImplemented => f.write_str("SDMMC not yet implemented"),
            Self::Io => f.write_str("SDMMC I/O error"),
        }
    }
}

/// Placeholder file for SDMMC (stub — always returns `NotImplemented`).
pub struct SdmmcFile;

impl File for SdmmcFile {
    type Error = SdmmcError;

    async fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> {
        Err(SdmmcError::NotImplemented)
    }

    async fn write_all(&mut self, _buf: &[u8]) -> Result<(), Self::Error> {
        Err(SdmmcError::NotImplemented)
    }

    async fn seek(&mut self, _pos: u64) -> Result<u64, Self::Error> {
        Err(SdmmcError::NotImplemented)
    }

    async fn truncate(&mut self, _len: u64) -> Result<(), Self::Error> {
        Err(SdmmcError::NotImplemented)
    }

    async fn sync(&mut self) -> Result<(), Self::Error> {
        Err(SdmmcError::NotImplemented)
    }

    fn size(&self) -> u64 {
        0
    }
}

/// SDMMC-backed Storage — stub implementation.
pub struct SdmmcStorage;

impl SdmmcStorage {
    /// Create a new (stub) SDMMC storage instance.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for SdmmcStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for SdmmcStorage {
    type Error = SdmmcError;
    type File = SdmmcFile;

    async fn open_file(&mut self, _path: &str) -> Result<Self::File, Self::Error> {
        Err(SdmmcError::NotImplemented)
    }

    async fn create_file(&mut self, _path: &str) -> Result<Self::File, Self::Error> {
        Err(SdmmcError::NotImplemented)
    }

    async fn create_dir_all(&mut self, _path: &str) -> Result<(), Self::Error> {
        Err(SdmmcError::NotImplemented)
    }

    async fn exists(&mut self, _path: &str) -> Result<bool, Self::Error> {
        Err(SdmmcError::NotImplemented)
    }
}
