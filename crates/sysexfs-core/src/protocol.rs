//! Wire protocol definitions
//!
//! Every envelope is a JSON object carried inside one SysEx frame:
//!
//! ```text
//! F0 7D <json bytes> [00 <packed block>] F7
//! ```
//!
//! The JSON object holds the command tag and scalar arguments. At most
//! one binary block may follow the JSON text, separated by a 0x00 byte
//! (which cannot appear in JSON) and packed 7-bit by [`crate::codec`].
//! 0x7D is the MIDI non-commercial manufacturer id; frames from other
//! manufacturers share the same cable and are ignored.

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::{ProtocolError, StatusCode};
use crate::types::{DirEntry, Fid};
use crate::MAX_ENVELOPE_LEN;

/// SysEx frame start byte
pub const SYSEX_START: u8 = 0xF0;

/// SysEx frame terminator
pub const SYSEX_END: u8 = 0xF7;

/// Manufacturer id claimed by this protocol
pub const MANUFACTURER_ID: u8 = 0x7D;

/// Separator between the JSON envelope and the packed block
pub const BLOB_SEPARATOR: u8 = 0x00;

/// All protocol messages, requests and replies alike
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
pub enum Message {
    // Session
    StartDirect,
    StartReply(StartReply),
    SessionReply(SessionReply),
    Ping,
    Pong,

    // File transfer
    OpenFile(OpenFile),
    OpenFileReply(OpenFileReply),
    CloseFile(CloseFile),
    CloseFileReply(CloseFileReply),
    ReadBlock(ReadBlock),
    ReadBlockReply(ReadBlockReply),
    WriteBlock(WriteBlock),
    WriteBlockReply(WriteBlockReply),

    // Directories and metadata
    GetDirEntries(GetDirEntries),
    DirEntriesReply(DirEntriesReply),
    DeleteFile(DeleteFile),
    DeleteFileReply(DeleteFileReply),
    CreateDirectory(CreateDirectory),
    CreateDirectoryReply(CreateDirectoryReply),
    Rename(Rename),
    RenameReply(RenameReply),
    UpdateTime(UpdateTime),
    UpdateTimeReply(UpdateTimeReply),
}

// === Session Messages ===

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StartReply {
    /// Correlation token chosen by the host
    pub token: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionReply {
    /// Session identity, echoed by the device
    pub sid: u32,
    pub version: u32,
}

// === File Transfer Messages ===

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpenFile {
    pub path: String,
    pub write: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpenFileReply {
    pub status: StatusCode,
    pub fid: Fid,
    /// Current file size, so hosts can size their read loops up front
    pub size: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CloseFile {
    pub fid: Fid,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CloseFileReply {
    pub status: StatusCode,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReadBlock {
    pub fid: Fid,
    pub offset: u32,
    pub size: u32,
}

/// Reply to [`ReadBlock`]; the data rides as the frame's packed block.
/// `size` is the number of bytes actually read, which is short of the
/// request at end of file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReadBlockReply {
    pub status: StatusCode,
    pub fid: Fid,
    pub offset: u32,
    pub size: u32,
}

/// The data to write rides as the frame's packed block; `size` is its
/// unpacked length and must match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WriteBlock {
    pub fid: Fid,
    pub offset: u32,
    pub size: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WriteBlockReply {
    pub status: StatusCode,
    pub size: u32,
}

// === Directory & Metadata Messages ===

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GetDirEntries {
    pub path: String,
    /// Continuation cursor from a previous page
    pub offset: u32,
    pub limit: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirEntriesReply {
    pub status: StatusCode,
    pub entries: Vec<DirEntry>,
    pub next_offset: u32,
    pub has_more: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeleteFile {
    pub path: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeleteFileReply {
    pub status: StatusCode,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateDirectory {
    pub path: String,
    pub date: u16,
    pub time: u16,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateDirectoryReply {
    pub status: StatusCode,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rename {
    pub from: String,
    pub to: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenameReply {
    pub status: StatusCode,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateTime {
    pub path: String,
    pub date: u16,
    pub time: u16,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateTimeReply {
    pub status: StatusCode,
}

// === Frame Encoding ===

/// Encode a message (and optional raw block) into one complete SysEx
/// frame, packing the block 7-bit.
pub fn encode_frame(msg: &Message, blob: Option<&[u8]>) -> Result<Vec<u8>, ProtocolError> {
    let json = serde_json::to_vec(msg)?;

    let packed = blob.map(codec::pack);
    let blob_len = packed.as_ref().map(|p| p.len() + 1).unwrap_or(0);

    let size = 2 + json.len() + blob_len + 1;
    if size > MAX_ENVELOPE_LEN {
        return Err(ProtocolError::EnvelopeTooLarge { size });
    }

    let mut frame = Vec::with_capacity(size);
    frame.push(SYSEX_START);
    frame.push(MANUFACTURER_ID);
    frame.extend_from_slice(&json);
    if let Some(packed) = packed {
        frame.push(BLOB_SEPARATOR);
        frame.extend_from_slice(&packed);
    }
    frame.push(SYSEX_END);

    Ok(frame)
}

/// Decode one complete SysEx frame.
///
/// The trailing block, if present, is returned still 7-bit packed;
/// callers decode it with [`codec::unpack`] against their own
/// destination capacity.
pub fn decode_frame(frame: &[u8]) -> Result<(Message, Option<Vec<u8>>), ProtocolError> {
    if frame.len() > MAX_ENVELOPE_LEN {
        return Err(ProtocolError::EnvelopeTooLarge { size: frame.len() });
    }
    if frame.len() < 3 || frame[0] != SYSEX_START {
        return Err(ProtocolError::NotSysEx);
    }
    if frame[frame.len() - 1] != SYSEX_END {
        return Err(ProtocolError::UnterminatedFrame);
    }
    if frame[1] != MANUFACTURER_ID {
        return Err(ProtocolError::ForeignManufacturer(frame[1]));
    }

    let body = &frame[2..frame.len() - 1];
    let (json, packed) = match body.iter().position(|&b| b == BLOB_SEPARATOR) {
        Some(idx) => (&body[..idx], Some(body[idx + 1..].to_vec())),
        None => (body, None),
    };

    let msg = serde_json::from_slice(json)?;
    Ok((msg, packed))
}
