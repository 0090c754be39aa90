//! Local filesystem Storage implementation for host-side tests.
//!
//! `LocalFileStorage` implements [`Storage`] using `std::fs`.
//! Only compiled with the `std` feature (or under `cfg(test)`).
//! All paths are resolved relative to the root provided at construction.

use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use crate::storage::{File, Storage};

/// Error type for local filesystem operations.
#[derive(Debug)]
pub struct LocalStorageError(pub std::io::Error);

impl core::fmt::Display for LocalStorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "local storage error: {}", self.0)
    }
}

impl std::error::Error for LocalStorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

/// An open file on the local filesystem.
pub struct LocalFile {
    inner: fs::File,
    size: u64,
}

impl File for LocalFile {
    type Error = LocalStorageError;

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        Read::read(&mut self.inner, buf).map_err(LocalStorageError)
    }

    async fn write_all(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        Write::write_all(&mut self.inner, buf).map_err(LocalStorageError)?;
        self.size = self.size.max(
            Seek::stream_position(&mut self.inner).map_err(LocalStorageError)?,
        );
        Ok(())
    }

    async fn seek(&mut self, pos: u64) -> Result<u64, Self::Error> {
        Seek::seek(&mut self.inner, SeekFrom::Start(pos)).map_err(LocalStorageError)
    }

    async fn truncate(&mut self, len: u64) -> Result<(), Self::Error> {
        self.inner.set_len(len).map_err(LocalStorageError)?;
        self.size = len;
        Ok(())
    }

    async fn sync(&mut self) -> Result<(), Self::Error> {
        self.inner.sync_all().map_err(LocalStorageError)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// A [`Storage`] implementation backed by `std::fs`.
///
/// Paths passed to [`LocalFileStorage::open_file`] and friends are resolved
/// relative to the root provided at construction.
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    /// Create a new storage rooted at `root`.
    #[must_use]
    pub fn new(root: &str) -> Self {
        Self {
            root: PathBuf::from(root),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl Storage for LocalFileStorage {
    type Error = LocalStorageError;
    type File = LocalFile;

    async fn open_file(&mut self, path: &str) -> Result<Self::File, Self::Error> {
        let full = self.resolve(path);
        let file = fs::File::open(&full).map_err(LocalStorageError)?;
        let meta = file.metadata().map_err(LocalStorageError)?;
        Ok(LocalFile {
            inner: file,
            size: meta.len(),
        })
    }

    async fn create_file(&mut self, path: &str) -> Result<Self::File, Self::Error> {
        let full = self.resolve(path);
        let file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&full)
            .map_err(LocalStorageError)?;
        Ok(LocalFile {
            inner: file,
            size: 0,
        })
    }

    async fn create_dir_all(&mut self, path: &str) -> Result<(), Self::Error> {
        fs::create_dir_all(self.resolve(path)).map_err(LocalStorageError)
    }

    async fn exists(&mut self, path: &str) -> Result<bool, Self::Error> {
        Ok(self.resolve(path).exists())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::storage::{File, Storage};
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn local_storage_read_full_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("test.bin"), b"hello world").unwrap();
        let mut storage = LocalFileStorage::new(tmp.path().to_str().unwrap());
        let mut file = storage.open_file("test.bin").await.unwrap();
        let mut buf = [0u8; 11];
        let n = file.read(&mut buf).await.unwrap();
        assert_eq!(n, 11);
        assert_eq!(&buf, b"hello world");
    }

    #[tokio::test]
    async fn local_storage_seek_and_read() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("seek.bin"), b"ABCDEFGH").unwrap();
        let mut storage = LocalFileStorage::new(tmp.path().to_str().unwrap());
        let mut file = storage.open_file("seek.bin").await.unwrap();
        file.seek(4).await.unwrap();
        let mut buf = [0u8; 4];
        file.read(&mut buf).await.unwrap();
        assert_eq!(&buf, b"EFGH");
    }

    #[tokio::test]
    async fn local_storage_write_then_read_back() {
        let tmp = TempDir::new().unwrap();
        let mut storage = LocalFileStorage::new(tmp.path().to_str().unwrap());
        {
            let mut file = storage.create_file("out.bin").await.unwrap();
            file.write_all(b"batch one ").await.unwrap();
            file.write_all(b"batch two").await.unwrap();
            file.sync().await.unwrap();
        }
        let data = fs::read(tmp.path().join("out.bin")).unwrap();
        assert_eq!(data, b"batch one batch two");
    }

    #[tokio::test]
    async fn local_storage_truncate_cuts_padding() {
        let tmp = TempDir::new().unwrap();
        let mut storage = LocalFileStorage::new(tmp.path().to_str().unwrap());
        {
            let mut file = storage.create_file("padded.bin").await.unwrap();
            file.write_all(&[0xAB; 512]).await.unwrap();
            file.truncate(300).await.unwrap();
            file.sync().await.unwrap();
            assert_eq!(file.size(), 300);
        }
        let data = fs::read(tmp.path().join("padded.bin")).unwrap();
        assert_eq!(data.len(), 300);
    }

    #[tokio::test]
    async fn local_storage_create_dir_all_nested() {
        let tmp = TempDir::new().unwrap();
        let mut storage = LocalFileStorage::new(tmp.path().to_str().unwrap());
        storage.create_dir_all("audio/ch3").await.unwrap();
        // Repeating is not an error.
        storage.create_dir_all("audio/ch3").await.unwrap();
        assert!(storage.exists("audio/ch3").await.unwrap());
        let mut file = storage.create_file("audio/ch3/clip.wav").await.unwrap();
        file.write_all(b"RIFF").await.unwrap();
    }

    #[tokio::test]
    async fn local_storage_exists_false() {
        let tmp = TempDir::new().unwrap();
        let mut storage = LocalFileStorage::new(tmp.path().to_str().unwrap());
        assert!(!storage.exists("missing.bin").await.unwrap());
    }
}
