//! Mock implementations for testing
//!
//! This module provides mock implementations of all platform traits
//! for use in unit and integration tests.

#![cfg(any(test, feature = "std"))]
#![allow(clippy::cast_possible_truncation)] // u64 file cursors fit host usize in tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use embassy_time::Duration;

use crate::gpio::{InputPin, OutputPin};
use crate::spi::SpiPeripheral;
use crate::storage::{File, Storage};
use crate::transport::{DiagPort, Transport};

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ---------------------------------------------------------------------------
// GPIO
// ---------------------------------------------------------------------------

/// Mock output pin whose level is observable through a shared handle.
pub struct MockOutputPin {
    level_high: Arc<AtomicBool>,
    assert_count: Arc<AtomicUsize>,
}

impl MockOutputPin {
    /// Create a pin at the given initial level.
    ///
    /// Returns the pin plus a handle reading `true` while the pin is high,
    /// and a counter of high→low transitions (select assertions).
    pub fn new(initial_high: bool) -> (Self, Arc<AtomicBool>, Arc<AtomicUsize>) {
        let level = Arc::new(AtomicBool::new(initial_high));
        let asserts = Arc::new(AtomicUsize::new(0));
        (
            Self {
                level_high: Arc::clone(&level),
                assert_count: Arc::clone(&asserts),
            },
            level,
            asserts,
        )
    }
}

impl OutputPin for MockOutputPin {
    fn set_high(&mut self) {
        self.level_high.store(true, Ordering::SeqCst);
    }

    fn set_low(&mut self) {
        if self.level_high.swap(false, Ordering::SeqCst) {
            self.assert_count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Mock input pin whose level is driven through a shared handle.
pub struct MockInputPin {
    level_high: Arc<AtomicBool>,
}

impl MockInputPin {
    /// Create a pin at the given initial level; flip the returned handle to
    /// drive it.
    pub fn new(initial_high: bool) -> (Self, Arc<AtomicBool>) {
        let level = Arc::new(AtomicBool::new(initial_high));
        (
            Self {
                level_high: Arc::clone(&level),
            },
            level,
        )
    }
}

impl InputPin for MockInputPin {
    fn is_high(&self) -> bool {
        self.level_high.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// SPI
// ---------------------------------------------------------------------------

/// Everything a [`MockSpi`] has transmitted, for post-hoc assertions.
#[derive(Default)]
pub struct SpiActivity {
    /// Frames sent through the synchronous `write` path (command packets).
    pub written: Vec<Vec<u8>>,
    /// Frames handed to `start_write` (background data transfers).
    pub started: Vec<Vec<u8>>,
}

/// Error type for injected SPI failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockSpiError;

/// Mock SPI peripheral recording all traffic.
///
/// `on_start` runs after each `start_write`; tests use it to signal the
/// engine's completion flag, standing in for the transfer-complete interrupt.
pub struct MockSpi {
    activity: Arc<Mutex<SpiActivity>>,
    fail_next_write: Arc<AtomicBool>,
    fail_next_start: Arc<AtomicBool>,
    on_start: Option<Box<dyn FnMut() + Send>>,
}

impl MockSpi {
    /// Create a new mock with empty activity.
    pub fn new() -> Self {
        Self {
            activity: Arc::new(Mutex::new(SpiActivity::default())),
            fail_next_write: Arc::new(AtomicBool::new(false)),
            fail_next_start: Arc::new(AtomicBool::new(false)),
            on_start: None,
        }
    }

    /// Shared handle to the recorded traffic.
    pub fn activity(&self) -> Arc<Mutex<SpiActivity>> {
        Arc::clone(&self.activity)
    }

    /// Handle that, when set, makes the next `write` fail once.
    pub fn fail_next_write(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.fail_next_write)
    }

    /// Handle that, when set, makes the next `start_write` fail once.
    pub fn fail_next_start(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.fail_next_start)
    }

    /// Install a hook invoked after every accepted `start_write`.
    #[must_use]
    pub fn on_start(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.on_start = Some(Box::new(hook));
        self
    }
}

impl Default for MockSpi {
    fn default() -> Self {
        Self::new()
    }
}

impl SpiPeripheral for MockSpi {
    type Error = MockSpiError;

    async fn write(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(MockSpiError);
        }
        lock_or_recover(&self.activity).written.push(data.to_vec());
        Ok(())
    }

    fn start_write(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        if self.fail_next_start.swap(false, Ordering::SeqCst) {
            return Err(MockSpiError);
        }
        lock_or_recover(&self.activity).started.push(data.to_vec());
        if let Some(hook) = self.on_start.as_mut() {
            hook();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

enum ScriptStep {
    Bytes(VecDeque<u8>),
    Timeout,
}

/// Scripted far-end for transfer-receiver tests.
///
/// Build the incoming byte stream up front with [`feed`](Self::feed) and
/// [`gap`](Self::gap) (one read window that times out), then run the
/// receiver and assert on [`sent`](Self::sent) — the handshake bytes the
/// receiver transmitted.
pub struct ScriptedTransport {
    steps: VecDeque<ScriptStep>,
    sent: Vec<u8>,
    sessions_begun: usize,
    sessions_ended: usize,
}

impl ScriptedTransport {
    /// Create an empty script (every read times out).
    pub fn new() -> Self {
        Self {
            steps: VecDeque::new(),
            sent: Vec::new(),
            sessions_begun: 0,
            sessions_ended: 0,
        }
    }

    /// Append bytes the far end will send.
    #[must_use]
    pub fn feed(mut self, bytes: &[u8]) -> Self {
        self.steps
            .push_back(ScriptStep::Bytes(bytes.iter().copied().collect()));
        self
    }

    /// Append one read window that yields nothing (a transport timeout).
    #[must_use]
    pub fn gap(mut self) -> Self {
        self.steps.push_back(ScriptStep::Timeout);
        self
    }

    /// Bytes the receiver transmitted, in order.
    pub fn sent(&self) -> &[u8] {
        &self.sent
    }

    /// Number of `begin_session` / `end_session` calls observed.
    pub fn session_counts(&self) -> (usize, usize) {
        (self.sessions_begun, self.sessions_ended)
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for ScriptedTransport {
    type Error = core::convert::Infallible;

    async fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, Self::Error> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.steps.front_mut() {
                None => break,
                Some(ScriptStep::Timeout) => {
                    self.steps.pop_front();
                    break;
                }
                Some(ScriptStep::Bytes(q)) => match q.pop_front() {
                    Some(b) => {
                        if let Some(slot) = buf.get_mut(filled) {
                            *slot = b;
                        }
                        filled = filled.saturating_add(1);
                    }
                    None => {
                        self.steps.pop_front();
                    }
                },
            }
        }
        Ok(filled)
    }

    async fn write_byte(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.sent.push(byte);
        Ok(())
    }

    fn begin_session(&mut self) {
        self.sessions_begun = self.sessions_begun.saturating_add(1);
    }

    fn end_session(&mut self) {
        self.sessions_ended = self.sessions_ended.saturating_add(1);
    }
}

/// Mock diagnostic port with an optional per-test acceptance budget.
pub struct MockDiagPort {
    accepted: Vec<u8>,
    budget: Option<usize>,
}

impl MockDiagPort {
    /// Port that accepts everything.
    pub fn new() -> Self {
        Self {
            accepted: Vec::new(),
            budget: None,
        }
    }

    /// Port that accepts at most `budget` bytes, then refuses.
    pub fn with_budget(budget: usize) -> Self {
        Self {
            accepted: Vec::new(),
            budget: Some(budget),
        }
    }

    /// Bytes accepted so far.
    pub fn accepted(&self) -> &[u8] {
        &self.accepted
    }
}

impl Default for MockDiagPort {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagPort for MockDiagPort {
    fn try_write(&mut self, byte: u8) -> bool {
        if let Some(budget) = self.budget.as_mut() {
            if *budget == 0 {
                return false;
            }
            *budget = budget.saturating_sub(1);
        }
        self.accepted.push(byte);
        true
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Error type for in-memory storage operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemStorageError {
    /// No file exists at the requested path.
    NotFound,
}

/// An open handle into a [`MemStorage`] file.
pub struct MemFile {
    data: Arc<Mutex<Vec<u8>>>,
    pos: u64,
}

impl File for MemFile {
    type Error = MemStorageError;

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let data = lock_or_recover(&self.data);
        let pos = self.pos as usize;
        if pos >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len().saturating_sub(pos));
        if let (Some(dst), Some(src)) = (buf.get_mut(..n), data.get(pos..pos.saturating_add(n))) {
            dst.copy_from_slice(src);
        }
        self.pos = self.pos.saturating_add(n as u64);
        Ok(n)
    }

    async fn write_all(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        let mut data = lock_or_recover(&self.data);
        let pos = self.pos as usize;
        let end = pos.saturating_add(buf.len());
        if data.len() < end {
            data.resize(end, 0);
        }
        if let Some(dst) = data.get_mut(pos..end) {
            dst.copy_from_slice(buf);
        }
        self.pos = end as u64;
        Ok(())
    }

    async fn seek(&mut self, pos: u64) -> Result<u64, Self::Error> {
        self.pos = pos;
        Ok(pos)
    }

    async fn truncate(&mut self, len: u64) -> Result<(), Self::Error> {
        lock_or_recover(&self.data).truncate(len as usize);
        Ok(())
    }

    async fn sync(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn size(&self) -> u64 {
        lock_or_recover(&self.data).len() as u64
    }
}

/// In-memory [`Storage`] for fixture-driven tests.
///
/// Contents written through open handles stay visible through
/// [`contents`](Self::contents) after the handle is dropped.
pub struct MemStorage {
    files: HashMap<String, Arc<Mutex<Vec<u8>>>>,
    dirs: HashSet<String>,
}

impl MemStorage {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
            dirs: HashSet::new(),
        }
    }

    /// Install a fixture file.
    pub fn insert(&mut self, path: &str, contents: &[u8]) {
        self.files
            .insert(path.to_owned(), Arc::new(Mutex::new(contents.to_vec())));
    }

    /// Snapshot a file's current contents, or `None` if it does not exist.
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.files
            .get(path)
            .map(|data| lock_or_recover(data).clone())
    }

    /// `true` if a directory was created at `path`.
    pub fn dir_exists(&self, path: &str) -> bool {
        self.dirs.contains(path)
    }
}

impl Default for MemStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemStorage {
    type Error = MemStorageError;
    type File = MemFile;

    async fn open_file(&mut self, path: &str) -> Result<Self::File, Self::Error> {
        let data = self.files.get(path).ok_or(MemStorageError::NotFound)?;
        Ok(MemFile {
            data: Arc::clone(data),
            pos: 0,
        })
    }

    async fn create_file(&mut self, path: &str) -> Result<Self::File, Self::Error> {
        let data = Arc::new(Mutex::new(Vec::new()));
        self.files.insert(path.to_owned(), Arc::clone(&data));
        Ok(MemFile { data, pos: 0 })
    }

    async fn create_dir_all(&mut self, path: &str) -> Result<(), Self::Error> {
        let mut prefix = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(part);
            self.dirs.insert(prefix.clone());
        }
        Ok(())
    }

    async fn exists(&mut self, path: &str) -> Result<bool, Self::Error> {
        Ok(self.files.contains_key(path) || self.dirs.contains(path))
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
    fn mock_output_pin_counts_assertions() {
        let (mut pin, level, asserts) = MockOutputPin::new(true);
        pin.set_low();
        pin.set_low(); // already low, not a new assertion
        pin.set_high();
        pin.set_low();
        assert!(!level.load(Ordering::SeqCst));
        assert_eq!(asserts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn mock_spi_records_and_fails_on_demand() {
        let mut spi = MockSpi::new();
        let activity = spi.activity();
        let fail = spi.fail_next_write();

        spi.write(&[0xC0, 0x00]).await.unwrap();
        fail.store(true, Ordering::SeqCst);
        assert!(spi.write(&[0xC0, 0x01]).await.is_err());
        // Failure is one-shot.
        spi.write(&[0xC0, 0x02]).await.unwrap();

        let log = lock_or_recover(&activity);
        assert_eq!(log.written.len(), 2);
        assert_eq!(log.written[0], vec![0xC0, 0x00]);
    }

    #[test]
    fn mock_spi_start_hook_fires() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let mut spi = MockSpi::new().on_start(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        spi.start_write(&[0xDA, 0x00]).unwrap();
        spi.start_write(&[0xDA, 0x01]).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn scripted_transport_serves_bytes_then_times_out() {
        let mut t = ScriptedTransport::new().feed(&[1, 2, 3]).gap().feed(&[4]);
        let mut buf = [0u8; 3];
        assert_eq!(t.read(&mut buf, Duration::from_secs(1)).await.unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(t.read(&mut buf, Duration::from_secs(1)).await.unwrap(), 0);
        assert_eq!(t.read(&mut buf[..1], Duration::from_secs(1)).await.unwrap(), 1);
        assert_eq!(buf[0], 4);
    }

    #[tokio::test]
    async fn mem_storage_write_visible_after_drop() {
        let mut storage = MemStorage::new();
        {
            let mut f = storage.create_file("upload.bin").await.unwrap();
            f.write_all(&[1, 2, 3, 4]).await.unwrap();
            f.truncate(3).await.unwrap();
            f.sync().await.unwrap();
        }
        assert_eq!(storage.contents("upload.bin").unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn mem_storage_read_with_seek() {
        let mut storage = MemStorage::new();
        storage.insert("a.bin", b"ABCDEFGH");
        let mut f = storage.open_file("a.bin").await.unwrap();
        f.seek(4).await.unwrap();
        let mut buf = [0u8; 8];
        let n = f.read(&mut buf).await.unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf[..4], b"EFGH");
    }

    #[tokio::test]
    async fn mem_storage_dirs() {
        let mut storage = MemStorage::new();
        storage.create_dir_all("audio/ch2").await.unwrap();
        assert!(storage.dir_exists("audio"));
        assert!(storage.dir_exists("audio/ch2"));
        assert!(storage.exists("audio/ch2").await.unwrap());
    }

    #[test]
    fn diag_port_budget_refuses_after_limit() {
        let mut port = MockDiagPort::with_budget(2);
        assert!(port.try_write(b'a'));
        assert!(port.try_write(b'b'));
        assert!(!port.try_write(b'c'));
        assert_eq!(port.accepted(), b"ab");
    }
}
