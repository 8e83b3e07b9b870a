//! SysEx FS Core - Shared types, wire protocol, and block codec
//!
//! This crate contains the foundational types used across all sysexfs
//! components. It has no dependencies on transport or storage code.

pub mod codec;
pub mod error;
pub mod path;
pub mod protocol;
pub mod types;

pub use error::*;
pub use protocol::*;
pub use types::*;

/// Protocol version
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum path length in bytes, including the NUL terminator the storage
/// layer appends. A path string may therefore be at most 254 bytes long.
pub const MAX_PATH_LEN: usize = 255;

/// Maximum data bytes carried by a single read/write block
pub const MAX_BLOCK_LEN: usize = 512;

/// Maximum size of one complete SysEx envelope on the wire
pub const MAX_ENVELOPE_LEN: usize = 2048;

/// Default transport fragment size for outgoing envelopes
pub const DEFAULT_FRAGMENT_LEN: usize = 256;

/// Number of slots in the open-file handle pool
pub const FILE_HANDLE_SLOTS: usize = 8;

/// Number of complete frames that may wait for the dispatcher pump
pub const PENDING_FRAME_SLOTS: usize = 8;

/// Maximum directory entries returned per page
pub const MAX_DIR_PAGE: u32 = 32;
