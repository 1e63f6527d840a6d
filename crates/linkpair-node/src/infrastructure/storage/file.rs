//! EEPROM-like storage backed by a fixed-size image file.
//!
//! The whole image is held in memory.  Writes change the in-memory copy and
//! [`commit`](NonVolatileStorage::commit) writes the image back and fsyncs,
//! the same way EEPROM emulation on flash stages writes in RAM until commit.
//! A missing file is created erased (every byte `0xFF`).

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::application::persistence::{NonVolatileStorage, StorageError};

/// Value of an erased byte.
pub const ERASED: u8 = 0xFF;

/// A file-backed [`NonVolatileStorage`] image.
pub struct FileStorage {
    path: PathBuf,
    image: Mutex<Vec<u8>>,
}

impl FileStorage {
    /// Opens the image at `path`, creating an erased `capacity`-byte image
    /// (and its parent directory) if it does not exist.
    ///
    /// An existing image of a different size is padded with erased bytes or
    /// truncated to `capacity`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the file cannot be read or created.
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Result<Self, StorageError> {
        let path = path.into();
        let image = match fs::read(&path) {
            Ok(mut bytes) => {
                bytes.resize(capacity, ERASED);
                debug!(path = %path.display(), "storage image opened");
                bytes
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let bytes = vec![ERASED; capacity];
                write_image(&path, &bytes)?;
                info!(path = %path.display(), capacity, "created erased storage image");
                bytes
            }
            Err(e) => return Err(StorageError::Io(e)),
        };
        Ok(Self {
            path,
            image: Mutex::new(image),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn image(&self) -> MutexGuard<'_, Vec<u8>> {
        self.image.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NonVolatileStorage for FileStorage {
    fn capacity(&self) -> usize {
        self.image().len()
    }

    fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>, StorageError> {
        let image = self.image();
        let range = checked_range(offset, len, image.len())?;
        Ok(image[range].to_vec())
    }

    fn write(&self, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        let mut image = self.image();
        let range = checked_range(offset, data.len(), image.len())?;
        image[range].copy_from_slice(data);
        Ok(())
    }

    fn commit(&self) -> Result<(), StorageError> {
        let image = self.image();
        write_image(&self.path, &image)
    }
}

/// Validates `offset..offset + len` against `capacity`.
pub(crate) fn checked_range(
    offset: usize,
    len: usize,
    capacity: usize,
) -> Result<std::ops::Range<usize>, StorageError> {
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(offset..end),
        _ => Err(StorageError::OutOfRange {
            offset,
            end: offset.saturating_add(len),
            capacity,
        }),
    }
}

fn write_image(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("linkpair_nv_{}", Uuid::new_v4()))
            .join("pairing.bin")
    }

    #[test]
    fn test_open_creates_erased_image() {
        // Arrange
        let path = temp_path();

        // Act
        let storage = FileStorage::open(&path, 7).expect("open");

        // Assert
        assert_eq!(storage.capacity(), 7);
        assert_eq!(storage.read(0, 7).unwrap(), vec![ERASED; 7]);
        assert_eq!(fs::read(&path).unwrap(), vec![ERASED; 7]);

        fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_uncommitted_write_is_not_durable() {
        let path = temp_path();
        let storage = FileStorage::open(&path, 7).unwrap();

        storage.write(0, &[1, 2, 3]).unwrap();
        drop(storage);
        let reopened = FileStorage::open(&path, 7).unwrap();

        assert_eq!(reopened.read(0, 3).unwrap(), vec![ERASED; 3]);
        fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_committed_write_survives_reopen() {
        // Arrange
        let path = temp_path();
        let storage = FileStorage::open(&path, 7).unwrap();

        // Act
        storage.write(0, &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x01]).unwrap();
        storage.commit().unwrap();
        drop(storage);
        let reopened = FileStorage::open(&path, 7).unwrap();

        // Assert
        assert_eq!(
            reopened.read(0, 7).unwrap(),
            vec![0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x01]
        );
        fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_access_past_end_is_out_of_range() {
        let path = temp_path();
        let storage = FileStorage::open(&path, 7).unwrap();

        assert!(matches!(
            storage.read(4, 4),
            Err(StorageError::OutOfRange {
                offset: 4,
                end: 8,
                capacity: 7
            })
        ));
        assert!(matches!(
            storage.write(usize::MAX, &[0]),
            Err(StorageError::OutOfRange { .. })
        ));
        fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_short_existing_image_is_padded_erased() {
        let path = temp_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, [0x01, 0x02]).unwrap();

        let storage = FileStorage::open(&path, 4).unwrap();

        assert_eq!(storage.read(0, 4).unwrap(), vec![0x01, 0x02, ERASED, ERASED]);
        fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
