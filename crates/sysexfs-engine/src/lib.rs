//! SysEx FS Engine - the device-side remote-filesystem protocol engine
//!
//! An external host reads, writes, lists, renames, and deletes files on
//! the device's local storage through MIDI System Exclusive messages.
//! This crate is the firmware-resident half of that protocol:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │            MIDI receive path (interrupt context)            │
//! │  on_bytes_received() only appends raw bytes per channel     │
//! └─────────────────────────────┬───────────────────────────────┘
//!                               │ crossbeam-channel
//!                               │ (bounded, one frame per slot)
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Main control loop (cooperative)                │
//! │  pump() decodes and dispatches at most one envelope,        │
//! │  drives the storage capability, replies via the transport   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! All resource bounds (handle slots, path length, block and envelope
//! sizes) are compile-time constants from `sysexfs-core`; nothing here
//! grows at runtime.

pub mod dirs;
pub mod dispatcher;
pub mod framing;
pub mod handles;
pub mod memfs;
pub mod storage;
pub mod transport;

pub use dispatcher::Engine;
pub use framing::{send_envelope, Framer};
pub use handles::HandleTable;
pub use memfs::MemStorage;
pub use storage::{map_storage_error, Storage, StorageError};
pub use transport::{ChannelId, Transport};
