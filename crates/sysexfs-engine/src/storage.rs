//! Storage capability boundary
//!
//! The engine drives whatever block storage the firmware provides
//! through this narrow trait. Implementations return [`StorageError`]
//! values from a fixed native vocabulary; the dispatcher translates
//! them into wire statuses with [`map_storage_error`], so no native
//! code ever reaches the host.

use thiserror::Error;

use sysexfs_core::{DirEntry, EntryInfo, StatusCode};

/// Native storage result vocabulary
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    #[error("no such file or directory")]
    NotFound,

    #[error("entry already exists")]
    Exists,

    #[error("directory not empty")]
    NotEmpty,

    #[error("not a directory")]
    NotADirectory,

    #[error("is a directory")]
    IsADirectory,

    #[error("no space left on storage")]
    NoSpace,

    #[error("invalid name")]
    InvalidName,

    #[error("storage i/o failure")]
    Io,
}

/// The capability set the engine needs from the filesystem driver.
///
/// All operations are synchronous and bounded; a driver that can stall
/// indefinitely violates this contract.
pub trait Storage {
    /// Open-file resource owned by a handle slot until closed.
    type File;

    /// Open `path`, creating a missing file when `write` is set
    /// (existing content is kept). Returns the resource and the current
    /// file size.
    fn open(&self, path: &str, write: bool) -> Result<(Self::File, u32), StorageError>;

    fn close(&self, file: Self::File) -> Result<(), StorageError>;

    /// Read at `offset` into `buf`, returning the byte count. Reading at
    /// or past end of file is a short (possibly empty) read, not an
    /// error.
    fn read(&self, file: &mut Self::File, offset: u32, buf: &mut [u8])
        -> Result<usize, StorageError>;

    /// Write `data` at `offset`, extending the file when the range ends
    /// past the current size. Returns the byte count written.
    fn write(&self, file: &mut Self::File, offset: u32, data: &[u8])
        -> Result<usize, StorageError>;

    /// Remove a file or an empty directory.
    fn remove(&self, path: &str) -> Result<(), StorageError>;

    /// Create a single directory level with the given timestamp. The
    /// parent must already exist.
    fn mkdir(&self, path: &str, date: u16, time: u16) -> Result<(), StorageError>;

    fn rename(&self, from: &str, to: &str) -> Result<(), StorageError>;

    fn set_time(&self, path: &str, date: u16, time: u16) -> Result<(), StorageError>;

    /// One page of directory entries starting at `offset`, plus whether
    /// more remain.
    fn list_dir(
        &self,
        path: &str,
        offset: u32,
        limit: u32,
    ) -> Result<(Vec<DirEntry>, bool), StorageError>;

    fn stat(&self, path: &str) -> Result<EntryInfo, StorageError>;
}

/// Translate a native storage result into the wire status vocabulary.
///
/// `NotADirectory` collapses into `NotFound`: a path with a file where a
/// directory component should be does not resolve, which is all the
/// host can act on.
pub fn map_storage_error(e: StorageError) -> StatusCode {
    match e {
        StorageError::NotFound => StatusCode::NotFound,
        StorageError::Exists => StatusCode::AlreadyExists,
        StorageError::NotEmpty => StatusCode::NotEmpty,
        StorageError::NotADirectory => StatusCode::NotFound,
        StorageError::IsADirectory => StatusCode::IoError,
        StorageError::NoSpace => StatusCode::StorageFull,
        StorageError::InvalidName => StatusCode::MalformedRequest,
        StorageError::Io => StatusCode::IoError,
    }
}
