//! Persistence port and the pairing-record adapter.
//!
//! [`NonVolatileStorage`] is the narrow interface to byte-addressable storage
//! that survives power loss (EEPROM, a flash page, an image file).
//! [`PairingPersistence`] sits on top of it and knows exactly one thing: where
//! the 7-byte pairing record lives and how to read and write it.
//!
//! Saves are synchronous and always followed by a commit, so a reset
//! immediately after a pairing transition cannot lose the update.

use std::sync::Arc;

use linkpair_core::domain::record::{RECORD_LEN, RECORD_OFFSET};
use linkpair_core::{decode_record, encode_record, PairingRecord, ProtocolError};
use thiserror::Error;
use tracing::{debug, info};

/// Error type for non-volatile storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested range lies outside the storage region.
    #[error("range {offset}..{end} is outside the {capacity}-byte region")]
    OutOfRange {
        offset: usize,
        end: usize,
        capacity: usize,
    },
    /// The backing device failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The stored bytes could not be interpreted.
    #[error("stored record is unreadable: {0}")]
    Corrupt(#[from] ProtocolError),
}

/// Fixed-size byte-addressable durable storage.
///
/// Writes are staged until [`commit`](NonVolatileStorage::commit) makes them
/// durable, matching EEPROM-emulation semantics on flash.
#[cfg_attr(test, mockall::automock)]
pub trait NonVolatileStorage: Send + Sync {
    /// Total size of the region in bytes.
    fn capacity(&self) -> usize;

    /// Reads `len` bytes starting at `offset`.
    fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>, StorageError>;

    /// Stages `data` at `offset`.
    fn write(&self, offset: usize, data: &[u8]) -> Result<(), StorageError>;

    /// Makes all staged writes durable.
    fn commit(&self) -> Result<(), StorageError>;
}

/// Reads and writes the single pairing record.
#[derive(Clone)]
pub struct PairingPersistence {
    storage: Arc<dyn NonVolatileStorage>,
}

impl PairingPersistence {
    pub fn new(storage: Arc<dyn NonVolatileStorage>) -> Self {
        Self { storage }
    }

    /// Loads the raw record.  No validation: see [`PairingRecord::normalize`].
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the region cannot be read.
    pub fn load(&self) -> Result<PairingRecord, StorageError> {
        let bytes = self.storage.read(RECORD_OFFSET, RECORD_LEN)?;
        let record = decode_record(&bytes)?;
        info!(
            address = %record.address,
            status = record.status_code,
            "pairing record loaded"
        );
        Ok(record)
    }

    /// Writes the record and commits it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the write or the commit fails.
    pub fn save(&self, record: &PairingRecord) -> Result<(), StorageError> {
        let bytes = encode_record(record)?;
        self.storage.write(RECORD_OFFSET, &bytes)?;
        self.storage.commit()?;
        debug!(
            address = %record.address,
            status = record.status_code,
            "pairing record saved"
        );
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
