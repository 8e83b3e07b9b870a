//! Transport capability boundary
//!
//! The engine never talks to MIDI hardware directly. The embedding
//! firmware injects a [`Transport`] and addresses each physical or
//! virtual cable with an opaque [`ChannelId`], so the engine runs
//! unchanged against USB host, USB peripheral, DIN, or a test harness.

use std::fmt;

use sysexfs_core::DEFAULT_FRAGMENT_LEN;

/// Opaque identifier for one transport endpoint (a MIDI cable)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u32);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// Outgoing byte path to the host
///
/// `send` must accept the fragment synchronously; delivery itself may be
/// lossy, which the protocol tolerates (hosts retry unanswered
/// requests). The transport must pass SysEx payload bytes through
/// unmodified.
pub trait Transport {
    /// Emit one fragment of an envelope on the given channel.
    fn send(&self, channel: ChannelId, bytes: &[u8]);

    /// Largest fragment the transport can carry in one message.
    fn max_fragment_len(&self) -> usize {
        DEFAULT_FRAGMENT_LEN
    }
}
