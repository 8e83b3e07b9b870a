//! Path/directory management
//!
//! Multi-level directory creation and timestamp updates on top of the
//! storage capability. Creation is deliberately not transactional:
//! levels created before a failing component stay in place, which is
//! what hosts observe and retry against.

use tracing::debug;

use sysexfs_core::path::components;

use crate::storage::{Storage, StorageError};

/// Create every missing directory level of `path`, in order, stamping
/// each new level with the given timestamp.
///
/// Stops at the first failure: a component that already exists as a
/// file reports [`StorageError::Exists`], a full storage reports
/// [`StorageError::NoSpace`]. Levels already created are left in place.
pub fn create_path_directories<S: Storage>(
    storage: &S,
    path: &str,
    date: u16,
    time: u16,
) -> Result<(), StorageError> {
    let mut prefix = String::with_capacity(path.len());

    for component in components(path) {
        prefix.push('/');
        prefix.push_str(component);

        match storage.stat(&prefix) {
            Ok(info) if info.is_dir => continue,
            Ok(_) => return Err(StorageError::Exists),
            Err(StorageError::NotFound) => {
                debug!("mkdir {prefix}");
                storage.mkdir(&prefix, date, time)?;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

/// Stamp an existing entry with a new modification timestamp.
pub fn update_time<S: Storage>(
    storage: &S,
    path: &str,
    date: u16,
    time: u16,
) -> Result<(), StorageError> {
    storage.set_time(path, date, time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memfs::MemStorage;

    #[test]
    fn test_creates_all_levels_in_order() {
        let fs = MemStorage::new();
        create_path_directories(&fs, "/a/b/c", 0x5021, 0x4800).unwrap();

        for path in ["/a", "/a/b", "/a/b/c"] {
            let info = fs.stat(path).unwrap();
            assert!(info.is_dir, "{path} should be a directory");
            assert_eq!(info.date, 0x5021);
        }
    }

    #[test]
    fn test_existing_levels_are_skipped() {
        let fs = MemStorage::new();
        fs.mkdir("/a", 1, 1).unwrap();
        create_path_directories(&fs, "/a/b", 2, 2).unwrap();

        // The pre-existing level keeps its own timestamp
        assert_eq!(fs.stat("/a").unwrap().date, 1);
        assert_eq!(fs.stat("/a/b").unwrap().date, 2);
    }

    #[test]
    fn test_idempotent_when_fully_present() {
        let fs = MemStorage::new();
        create_path_directories(&fs, "/a/b", 0, 0).unwrap();
        create_path_directories(&fs, "/a/b", 9, 9).unwrap();
        assert_eq!(fs.stat("/a/b").unwrap().date, 0);
    }

    #[test]
    fn test_file_conflict_leaves_partial_state() {
        let fs = MemStorage::new();
        fs.mkdir("/a", 0, 0).unwrap();
        let (f, _) = fs.open("/a/b", true).unwrap();
        fs.close(f).unwrap();

        let err = create_path_directories(&fs, "/a/b/c", 0, 0).unwrap_err();
        assert_eq!(err, StorageError::Exists);

        // The level before the conflict remains, the one after was never made
        assert!(fs.stat("/a").unwrap().is_dir);
        assert!(!fs.stat("/a/b").unwrap().is_dir);
        assert_eq!(fs.stat("/a/b/c").unwrap_err(), StorageError::NotFound);
    }

    #[test]
    fn test_update_time() {
        let fs = MemStorage::new();
        fs.mkdir("/d", 0, 0).unwrap();
        update_time(&fs, "/d", 0x1111, 0x2222).unwrap();
        assert_eq!(fs.stat("/d").unwrap().time, 0x2222);

        assert_eq!(
            update_time(&fs, "/nope", 0, 0).unwrap_err(),
            StorageError::NotFound
        );
    }
}
