//! Error types for the sysexfs protocol

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{MAX_ENVELOPE_LEN, MAX_PATH_LEN};

/// Protocol-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("not a sysex frame")]
    NotSysEx,

    #[error("frame missing sysex terminator")]
    UnterminatedFrame,

    #[error("foreign manufacturer id {0:#04x}")]
    ForeignManufacturer(u8),

    #[error("envelope too large: {size} bytes (max {})", MAX_ENVELOPE_LEN)]
    EnvelopeTooLarge { size: usize },

    #[error("payload exceeds destination capacity: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("malformed payload block")]
    MalformedPayload,

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("path too long: {len} bytes (max {}, terminator included)", MAX_PATH_LEN)]
    PathTooLong { len: usize },

    #[error("invalid path: {0}")]
    InvalidPath(&'static str),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        ProtocolError::MalformedEnvelope(e.to_string())
    }
}

/// Wire status codes (sent back to the host in every reply)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum StatusCode {
    Ok = 0,
    MalformedRequest = 1,
    PathTooLong = 2,
    InvalidHandle = 3,
    TooManyOpenFiles = 4,
    NotFound = 5,
    AlreadyExists = 6,
    NotEmpty = 7,
    StorageFull = 8,
    TruncatedInput = 9,
    IoError = 10,
}

impl StatusCode {
    pub fn is_ok(self) -> bool {
        self == StatusCode::Ok
    }
}

impl From<&ProtocolError> for StatusCode {
    fn from(e: &ProtocolError) -> Self {
        match e {
            ProtocolError::NotSysEx => StatusCode::MalformedRequest,
            ProtocolError::UnterminatedFrame => StatusCode::MalformedRequest,
            ProtocolError::ForeignManufacturer(_) => StatusCode::MalformedRequest,
            ProtocolError::EnvelopeTooLarge { .. } => StatusCode::MalformedRequest,
            ProtocolError::PayloadTooLarge { .. } => StatusCode::TruncatedInput,
            ProtocolError::MalformedPayload => StatusCode::MalformedRequest,
            ProtocolError::MalformedEnvelope(_) => StatusCode::MalformedRequest,
            ProtocolError::PathTooLong { .. } => StatusCode::PathTooLong,
            ProtocolError::InvalidPath(_) => StatusCode::MalformedRequest,
        }
    }
}
