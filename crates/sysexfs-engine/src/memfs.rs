//! In-memory storage backend
//!
//! A path-keyed tree implementing the full [`Storage`] capability,
//! including FAT-style timestamps and an optional byte-capacity cap.
//! Used by the protocol tests and by host-side tooling that wants to
//! stage a device image without real hardware; firmware links its own
//! flash-backed implementation instead.

use std::collections::HashMap;

use parking_lot::Mutex;

use sysexfs_core::path::parent;
use sysexfs_core::{DirEntry, EntryInfo};

use crate::storage::{Storage, StorageError};

struct Node {
    data: Vec<u8>,
    is_dir: bool,
    date: u16,
    time: u16,
}

impl Node {
    fn dir(date: u16, time: u16) -> Self {
        Self {
            data: Vec::new(),
            is_dir: true,
            date,
            time,
        }
    }

    fn file() -> Self {
        Self {
            data: Vec::new(),
            is_dir: false,
            date: 0,
            time: 0,
        }
    }
}

struct Tree {
    nodes: HashMap<String, Node>,
    used: usize,
}

/// In-memory [`Storage`] implementation
pub struct MemStorage {
    tree: Mutex<Tree>,
    capacity: Option<usize>,
}

/// Open-file resource for [`MemStorage`]
#[derive(Debug)]
pub struct MemFile {
    path: String,
    write: bool,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::with_limit(None)
    }

    /// A storage whose file data may not exceed `capacity` bytes, for
    /// exercising out-of-space handling.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_limit(Some(capacity))
    }

    fn with_limit(capacity: Option<usize>) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert("/".to_string(), Node::dir(0, 0));
        Self {
            tree: Mutex::new(Tree { nodes, used: 0 }),
            capacity,
        }
    }

    /// Number of entries, not counting the root.
    pub fn entry_count(&self) -> usize {
        self.tree.lock().nodes.len() - 1
    }

    fn require_parent_dir(tree: &Tree, path: &str) -> Result<(), StorageError> {
        match tree.nodes.get(parent(path)) {
            Some(node) if node.is_dir => Ok(()),
            Some(_) => Err(StorageError::NotADirectory),
            None => Err(StorageError::NotFound),
        }
    }

    fn is_child_of(parent_path: &str, key: &str) -> bool {
        let prefix = if parent_path == "/" { "" } else { parent_path };
        if key == parent_path || !key.starts_with(prefix) {
            return false;
        }
        let rest = &key[prefix.len()..];
        rest.starts_with('/') && !rest[1..].contains('/') && rest.len() > 1
    }
}

impl Default for MemStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemStorage {
    type File = MemFile;

    fn open(&self, path: &str, write: bool) -> Result<(MemFile, u32), StorageError> {
        let mut tree = self.tree.lock();
        match tree.nodes.get(path) {
            Some(node) if node.is_dir => Err(StorageError::IsADirectory),
            Some(node) => Ok((
                MemFile {
                    path: path.to_string(),
                    write,
                },
                node.data.len() as u32,
            )),
            None if write => {
                Self::require_parent_dir(&tree, path)?;
                tree.nodes.insert(path.to_string(), Node::file());
                Ok((
                    MemFile {
                        path: path.to_string(),
                        write,
                    },
                    0,
                ))
            }
            None => Err(StorageError::NotFound),
        }
    }

    fn close(&self, _file: MemFile) -> Result<(), StorageError> {
        Ok(())
    }

    fn read(
        &self,
        file: &mut MemFile,
        offset: u32,
        buf: &mut [u8],
    ) -> Result<usize, StorageError> {
        let tree = self.tree.lock();
        let node = tree.nodes.get(&file.path).ok_or(StorageError::Io)?;

        let offset = offset as usize;
        if offset >= node.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(node.data.len() - offset);
        buf[..n].copy_from_slice(&node.data[offset..offset + n]);
        Ok(n)
    }

    fn write(
        &self,
        file: &mut MemFile,
        offset: u32,
        data: &[u8],
    ) -> Result<usize, StorageError> {
        if !file.write {
            return Err(StorageError::Io);
        }

        let mut tree = self.tree.lock();
        let used = tree.used;
        let node = tree.nodes.get_mut(&file.path).ok_or(StorageError::Io)?;

        let offset = offset as usize;
        let end = offset + data.len();
        let growth = end.saturating_sub(node.data.len());
        if let Some(cap) = self.capacity {
            if used + growth > cap {
                return Err(StorageError::NoSpace);
            }
        }

        if end > node.data.len() {
            node.data.resize(end, 0);
        }
        node.data[offset..end].copy_from_slice(data);
        tree.used = used + growth;
        Ok(data.len())
    }

    fn remove(&self, path: &str) -> Result<(), StorageError> {
        if path == "/" {
            return Err(StorageError::InvalidName);
        }

        let mut tree = self.tree.lock();
        let node = tree.nodes.get(path).ok_or(StorageError::NotFound)?;
        if node.is_dir && tree.nodes.keys().any(|k| Self::is_child_of(path, k)) {
            return Err(StorageError::NotEmpty);
        }

        let node = tree.nodes.remove(path).expect("checked above");
        tree.used -= node.data.len();
        Ok(())
    }

    fn mkdir(&self, path: &str, date: u16, time: u16) -> Result<(), StorageError> {
        let mut tree = self.tree.lock();
        if tree.nodes.contains_key(path) {
            return Err(StorageError::Exists);
        }
        Self::require_parent_dir(&tree, path)?;
        tree.nodes.insert(path.to_string(), Node::dir(date, time));
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), StorageError> {
        if from == "/" || to == from || to.starts_with(&format!("{from}/")) {
            return Err(StorageError::InvalidName);
        }

        let mut tree = self.tree.lock();
        if !tree.nodes.contains_key(from) {
            return Err(StorageError::NotFound);
        }
        if tree.nodes.contains_key(to) {
            return Err(StorageError::Exists);
        }
        Self::require_parent_dir(&tree, to)?;

        let node = tree.nodes.remove(from).expect("checked above");
        let was_dir = node.is_dir;
        tree.nodes.insert(to.to_string(), node);

        if was_dir {
            let prefix = format!("{from}/");
            let moved: Vec<String> = tree
                .nodes
                .keys()
                .filter(|k| k.starts_with(&prefix))
                .cloned()
                .collect();
            for key in moved {
                let node = tree.nodes.remove(&key).expect("key just listed");
                let new_key = format!("{to}{}", &key[from.len()..]);
                tree.nodes.insert(new_key, node);
            }
        }

        Ok(())
    }

    fn set_time(&self, path: &str, date: u16, time: u16) -> Result<(), StorageError> {
        let mut tree = self.tree.lock();
        let node = tree.nodes.get_mut(path).ok_or(StorageError::NotFound)?;
        node.date = date;
        node.time = time;
        Ok(())
    }

    fn list_dir(
        &self,
        path: &str,
        offset: u32,
        limit: u32,
    ) -> Result<(Vec<DirEntry>, bool), StorageError> {
        let tree = self.tree.lock();
        match tree.nodes.get(path) {
            Some(node) if node.is_dir => {}
            Some(_) => return Err(StorageError::NotADirectory),
            None => return Err(StorageError::NotFound),
        }

        let mut names: Vec<&String> = tree
            .nodes
            .keys()
            .filter(|k| Self::is_child_of(path, k))
            .collect();
        names.sort();

        let offset = offset as usize;
        let limit = limit as usize;
        let page_end = names.len().min(offset + limit);
        let has_more = page_end < names.len();

        let entries = names
            .get(offset..page_end)
            .unwrap_or(&[])
            .iter()
            .map(|key| {
                let node = &tree.nodes[*key];
                let name = key.rsplit('/').next().unwrap_or(key);
                DirEntry::new(
                    name,
                    node.data.len() as u32,
                    node.date,
                    node.time,
                    node.is_dir,
                )
            })
            .collect();

        Ok((entries, has_more))
    }

    fn stat(&self, path: &str) -> Result<EntryInfo, StorageError> {
        let tree = self.tree.lock();
        let node = tree.nodes.get(path).ok_or(StorageError::NotFound)?;
        Ok(EntryInfo {
            size: node.data.len() as u32,
            date: node.date,
            time: node.time,
            is_dir: node.is_dir,
        })
    }
}
