//! Core type definitions for sysexfs
//!
//! These types are shared between the wire protocol and the engine and
//! describe files as the host sees them.

use serde::{Deserialize, Serialize};

/// File handle identifier within the fixed slot pool
pub type Fid = u32;

/// How a file handle was opened
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

impl OpenMode {
    pub fn from_write_flag(write: bool) -> Self {
        if write {
            OpenMode::Write
        } else {
            OpenMode::Read
        }
    }
}

/// One directory listing entry
///
/// `date` and `time` use the storage layer's packed 16-bit encoding
/// (year/month/day and hour/minute/2-second fields).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
    pub name: String,
    pub size: u32,
    pub date: u16,
    pub time: u16,
    pub dir: bool,
}

impl DirEntry {
    pub fn new(name: impl Into<String>, size: u32, date: u16, time: u16, dir: bool) -> Self {
        Self {
            name: name.into(),
            size,
            date,
            time,
            dir,
        }
    }
}

/// Metadata for a single entry, as returned by a storage stat
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryInfo {
    pub size: u32,
    pub date: u16,
    pub time: u16,
    pub is_dir: bool,
}
