//! Storage abstraction for file systems.
//!
//! Reading covers the sample-source path (audio containers streamed from the
//! card); writing covers the upload path (received files appended in
//! size-aligned batches, synced periodically, truncated to their final
//! length before close).

/// Storage trait for file system access.
pub trait Storage {
    /// Error type
    type Error: core::fmt::Debug;
    /// File type
    type File: File;

    /// Open an existing file for reading.
    fn open_file(
        &mut self,
        path: &str,
    ) -> impl core::future::Future<Output = Result<Self::File, Self::Error>>;

    /// Create (or truncate) a file for writing.
    fn create_file(
        &mut self,
        path: &str,
    ) -> impl core::future::Future<Output = Result<Self::File, Self::Error>>;

    /// Create a directory and any missing parents. Existing directories are
    /// not an error.
    fn create_dir_all(
        &mut self,
        path: &str,
    ) -> impl core::future::Future<Output = Result<(), Self::Error>>;

    /// Check if path exists
    fn exists(
        &mut self,
        path: &str,
    ) -> impl core::future::Future<Output = Result<bool, Self::Error>>;
}

/// File trait for reading and writing files.
pub trait File {
    /// Error type
    type Error: core::fmt::Debug;

    /// Read from current position
    fn read(
        &mut self,
        buf: &mut [u8],
    ) -> impl core::future::Future<Output = Result<usize, Self::Error>>;

    /// Write all of `buf` at the current position.
    fn write_all(
        &mut self,
        buf: &[u8],
    ) -> impl core::future::Future<Output = Result<(), Self::Error>>;

    /// Seek to position
    fn seek(&mut self, pos: u64) -> impl core::future::Future<Output = Result<u64, Self::Error>>;

    /// Cut the file to `len` bytes.
    fn truncate(
        &mut self,
        len: u64,
    ) -> impl core::future::Future<Output = Result<(), Self::Error>>;

    /// Durably flush buffered writes to the medium.
    fn sync(&mut self) -> impl core::future::Future<Output = Result<(), Self::Error>>;

    /// Get file size
    fn size(&self) -> u64;
}
