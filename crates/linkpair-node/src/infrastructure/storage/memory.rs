//! In-memory [`NonVolatileStorage`] for tests and simulations.
//!
//! Keeps the staged image and the committed image apart, so a test can see
//! exactly what would survive a reset ([`MemoryStorage::committed`]) and
//! "reboot" a node from it ([`MemoryStorage::reboot`]).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::file::{checked_range, ERASED};
use crate::application::persistence::{NonVolatileStorage, StorageError};

#[derive(Debug)]
struct Images {
    staged: Vec<u8>,
    committed: Vec<u8>,
}

/// Memory-backed storage with a commit counter and injectable write failure.
#[derive(Debug)]
pub struct MemoryStorage {
    images: Mutex<Images>,
    commits: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    /// A factory-fresh region of `capacity` erased bytes.
    pub fn erased(capacity: usize) -> Self {
        Self::with_contents(&vec![ERASED; capacity])
    }

    /// A region whose staged and committed contents are `bytes`.
    pub fn with_contents(bytes: &[u8]) -> Self {
        Self {
            images: Mutex::new(Images {
                staged: bytes.to_vec(),
                committed: bytes.to_vec(),
            }),
            commits: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Contents as of the last commit.
    pub fn committed(&self) -> Vec<u8> {
        self.images().committed.clone()
    }

    /// Number of successful commits.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Makes every later `write` fail with an I/O error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// A new region holding only what was committed, as after a power cycle.
    pub fn reboot(&self) -> Self {
        Self::with_contents(&self.committed())
    }

    fn images(&self) -> MutexGuard<'_, Images> {
        self.images.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NonVolatileStorage for MemoryStorage {
    fn capacity(&self) -> usize {
        self.images().staged.len()
    }

    fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>, StorageError> {
        let images = self.images();
        let range = checked_range(offset, len, images.staged.len())?;
        Ok(images.staged[range].to_vec())
    }

    fn write(&self, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected write failure",
            )));
        }
        let mut images = self.images();
        let range = checked_range(offset, data.len(), images.staged.len())?;
        images.staged[range].copy_from_slice(data);
        Ok(())
    }

    fn commit(&self) -> Result<(), StorageError> {
        let mut images = self.images();
        images.committed = images.staged.clone();
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
