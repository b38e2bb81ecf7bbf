//! Fixed-layout record stores
//!
//! A [`RecordStore`] is a flat file of homogeneous fixed-size records
//! addressed by a 1-based identifier:
//!
//! ```text
//! offset(id) = (id - 1) * R::SIZE
//! ```
//!
//! There is no header, free list or versioning. The file only grows through
//! [`RecordStore::append`]; [`RecordStore::write`] replaces an existing
//! record in place.
//!
//! # Thread Safety
//!
//! All I/O is positional (`pread`/`pwrite` through [`FileExt`]), so a single
//! handle is shared by every worker without a seek cursor. The store does no
//! locking of its own: callers serialize mutations through
//! [`crate::core::RecordLockManager`].

pub mod layout;

use crate::types::{LedgerError, RecordId, StoreKind};
use std::fs::{File, OpenOptions};
use std::marker::PhantomData;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

/// A fixed-size record type
pub trait Record: Sized {
    /// Store the record type lives in
    const KIND: StoreKind;

    /// Encoded size in bytes
    const SIZE: usize;

    /// Positional identifier carried inside the record
    fn id(&self) -> RecordId;

    /// Encode into a zeroed buffer of exactly `SIZE` bytes
    fn encode(&self, buf: &mut [u8]) -> Result<(), LedgerError>;

    /// Decode from a buffer of exactly `SIZE` bytes
    fn decode(buf: &[u8]) -> Result<Self, String>;
}

/// File-backed store of `R` records
#[derive(Debug)]
pub struct RecordStore<R> {
    path: PathBuf,
    file: File,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> RecordStore<R> {
    /// Open the store at `path`, creating an empty file if needed
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| LedgerError::IoError {
                message: format!("cannot open {}: {}", path.display(), e),
            })?;
        Ok(RecordStore {
            path,
            file,
            _record: PhantomData,
        })
    }

    /// Open the store for `R` inside a data directory
    pub fn open_in(data_dir: impl AsRef<Path>) -> Result<Self, LedgerError> {
        Self::open(data_dir.as_ref().join(R::KIND.file_name()))
    }

    pub fn kind(&self) -> StoreKind {
        R::KIND
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of whole records in the file
    ///
    /// A trailing partial record (from an interrupted append) is ignored.
    pub fn count(&self) -> Result<u32, LedgerError> {
        let len = self.file.metadata()?.len();
        let count = len / R::SIZE as u64;
        u32::try_from(count).map_err(|_| LedgerError::IoError {
            message: format!("{} holds more records than identifiers allow", self.path.display()),
        })
    }

    /// Identifier the next appended record must carry
    pub fn next_id(&self) -> Result<RecordId, LedgerError> {
        Ok(self.count()? + 1)
    }

    fn offset(id: RecordId) -> u64 {
        u64::from(id - 1) * R::SIZE as u64
    }

    fn decode_at(id: RecordId, buf: &[u8]) -> Result<R, LedgerError> {
        let record =
            R::decode(buf).map_err(|reason| LedgerError::corrupt_record(R::KIND, id, &reason))?;
        if record.id() != id {
            return Err(LedgerError::corrupt_record(
                R::KIND,
                id,
                &format!("positional record carries id {}", record.id()),
            ));
        }
        Ok(record)
    }

    /// Read the record with the given identifier
    ///
    /// # Errors
    ///
    /// - `NotFound` if `id` is 0 or lies past the end of the file
    /// - `CorruptRecord` if the bytes do not decode or carry another id
    pub fn read(&self, id: RecordId) -> Result<R, LedgerError> {
        if id == 0 || id > self.count()? {
            return Err(LedgerError::not_found(R::KIND, id));
        }
        let mut buf = vec![0u8; R::SIZE];
        self.file.read_exact_at(&mut buf, Self::offset(id))?;
        Self::decode_at(id, &buf)
    }

    /// Replace an existing record in place
    ///
    /// The target position is taken from the record's own identifier. Writing
    /// past the current end is refused; growth only happens through
    /// [`RecordStore::append`].
    pub fn write(&self, record: &R) -> Result<(), LedgerError> {
        let id = record.id();
        if id == 0 || id > self.count()? {
            return Err(LedgerError::not_found(R::KIND, id));
        }
        let mut buf = vec![0u8; R::SIZE];
        record.encode(&mut buf)?;
        self.file.write_all_at(&buf, Self::offset(id))?;
        Ok(())
    }

    /// Append a record at the end of the store
    ///
    /// The record must carry [`RecordStore::next_id`]; a record built from a
    /// stale count is refused with `StaleIdentifier` instead of being written
    /// at the wrong position.
    pub fn append(&self, record: &R) -> Result<RecordId, LedgerError> {
        let expected = self.next_id()?;
        if record.id() != expected {
            return Err(LedgerError::StaleIdentifier {
                store: R::KIND,
                expected,
                actual: record.id(),
            });
        }
        let mut buf = vec![0u8; R::SIZE];
        record.encode(&mut buf)?;
        self.file.write_all_at(&buf, Self::offset(expected))?;
        Ok(expected)
    }

    /// Read every record, oldest first
    pub fn scan(&self) -> Result<Vec<R>, LedgerError> {
        let count = self.count()?;
        let mut buf = vec![0u8; count as usize * R::SIZE];
        self.file.read_exact_at(&mut buf, 0)?;
        buf.chunks_exact(R::SIZE)
            .zip(1..)
            .map(|(chunk, id)| Self::decode_at(id, chunk))
            .collect()
    }

    /// Flush written records to disk
    pub fn sync(&self) -> Result<(), LedgerError> {
        self.file.sync_data()?;
        Ok(())
    }
}
