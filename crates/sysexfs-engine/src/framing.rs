//! SysEx framing layer
//!
//! Reassembles raw incoming byte fragments into complete frames and
//! re-chunks outgoing envelopes into transport-sized fragments. The
//! receive side is safe to call from an interrupt context: it only
//! appends bytes and recognizes frame boundaries, then parks complete
//! frames on a bounded queue for the dispatcher pump. Malformed or
//! truncated input is discarded at this boundary and never reaches a
//! handler.

use bytes::BytesMut;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use dashmap::DashMap;
use tracing::{trace, warn};

use sysexfs_core::protocol::{encode_frame, Message, SYSEX_END, SYSEX_START};
use sysexfs_core::{ProtocolError, MAX_ENVELOPE_LEN, PENDING_FRAME_SLOTS};

use crate::transport::{ChannelId, Transport};

/// Per-channel reassembly state
#[derive(Default)]
struct RxBuffer {
    buf: BytesMut,
    in_frame: bool,
}

/// Frame reassembler and pending-frame queue
pub struct Framer {
    rx: DashMap<ChannelId, RxBuffer>,
    pending_tx: Sender<(ChannelId, Vec<u8>)>,
    pending_rx: Receiver<(ChannelId, Vec<u8>)>,
}

impl Framer {
    pub fn new() -> Self {
        let (pending_tx, pending_rx) = bounded(PENDING_FRAME_SLOTS);
        Self {
            rx: DashMap::new(),
            pending_tx,
            pending_rx,
        }
    }

    /// Append raw bytes received on a channel, queueing every complete
    /// frame found.
    ///
    /// Bytes outside a frame (realtime status, stray data on a shared
    /// cable) are ignored. A frame that outgrows the envelope bound is
    /// abandoned and its bytes discarded.
    pub fn on_bytes_received(&self, channel: ChannelId, bytes: &[u8]) {
        let mut state = self.rx.entry(channel).or_default();

        for &byte in bytes {
            if !state.in_frame {
                if byte == SYSEX_START {
                    state.buf.clear();
                    state.buf.extend_from_slice(&[SYSEX_START]);
                    state.in_frame = true;
                }
                continue;
            }

            state.buf.extend_from_slice(&[byte]);

            if byte == SYSEX_END {
                state.in_frame = false;
                let frame = state.buf.split().to_vec();
                trace!("{channel}: frame complete, {} bytes", frame.len());
                self.enqueue(channel, frame);
            } else if state.buf.len() > MAX_ENVELOPE_LEN {
                warn!("{channel}: frame exceeds {MAX_ENVELOPE_LEN} bytes, discarding");
                state.buf.clear();
                state.in_frame = false;
            }
        }
    }

    fn enqueue(&self, channel: ChannelId, frame: Vec<u8>) {
        match self.pending_tx.try_send((channel, frame)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("{channel}: pending frame queue full, dropping frame");
            }
            Err(TrySendError::Disconnected(_)) => unreachable!("receiver lives with the framer"),
        }
    }

    /// Take the next complete frame, if any. Called by the dispatcher
    /// pump; at most one frame is handed out per call.
    pub fn next_frame(&self) -> Option<(ChannelId, Vec<u8>)> {
        self.pending_rx.try_recv().ok()
    }

    /// Forget reassembly state for a torn-down channel.
    pub fn drop_channel(&self, channel: ChannelId) {
        self.rx.remove(&channel);
    }

    /// Keep reassembly state only for channels passing the check.
    pub fn retain_channels(&self, keep: impl Fn(ChannelId) -> bool) {
        self.rx.retain(|ch, _| keep(*ch));
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode an envelope and emit it in transport-sized fragments.
pub fn send_envelope<T: Transport + ?Sized>(
    transport: &T,
    channel: ChannelId,
    msg: &Message,
    blob: Option<&[u8]>,
) -> Result<(), ProtocolError> {
    let frame = encode_frame(msg, blob)?;
    trace!("{channel}: sending {} bytes: {}", frame.len(), hex::encode(&frame));

    let max = transport.max_fragment_len().max(1);
    for fragment in frame.chunks(max) {
        transport.send(channel, fragment);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use sysexfs_core::protocol::decode_frame;

    struct CollectingTransport {
        max: usize,
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl Transport for CollectingTransport {
        fn send(&self, _channel: ChannelId, bytes: &[u8]) {
            self.sent.lock().push(bytes.to_vec());
        }

        fn max_fragment_len(&self) -> usize {
            self.max
        }
    }

    fn ping_frame() -> Vec<u8> {
        encode_frame(&Message::Ping, None).unwrap()
    }

    #[test]
    fn test_single_complete_frame() {
        let framer = Framer::new();
        let ch = ChannelId(1);
        framer.on_bytes_received(ch, &ping_frame());

        let (channel, frame) = framer.next_frame().unwrap();
        assert_eq!(channel, ch);
        assert_eq!(decode_frame(&frame).unwrap().0, Message::Ping);
        assert!(framer.next_frame().is_none());
    }

    #[test]
    fn test_byte_at_a_time() {
        let framer = Framer::new();
        let ch = ChannelId(1);
        for byte in ping_frame() {
            framer.on_bytes_received(ch, &[byte]);
        }
        assert!(framer.next_frame().is_some());
    }

    #[test]
    fn test_two_frames_one_push() {
        let framer = Framer::new();
        let ch = ChannelId(1);
        let mut bytes = ping_frame();
        bytes.extend_from_slice(&ping_frame());
        framer.on_bytes_received(ch, &bytes);

        assert!(framer.next_frame().is_some());
        assert!(framer.next_frame().is_some());
        assert!(framer.next_frame().is_none());
    }

    #[test]
    fn test_noise_between_frames_ignored() {
        let framer = Framer::new();
        let ch = ChannelId(1);
        let mut bytes = vec![0xFE, 0x42, 0xFE];
        bytes.extend_from_slice(&ping_frame());
        bytes.extend_from_slice(&[0x00, 0x7F]);
        framer.on_bytes_received(ch, &bytes);

        assert!(framer.next_frame().is_some());
        assert!(framer.next_frame().is_none());
    }

    #[test]
    fn test_oversized_frame_discarded() {
        let framer = Framer::new();
        let ch = ChannelId(1);
        let mut bytes = vec![SYSEX_START];
        bytes.extend_from_slice(&[0x41; MAX_ENVELOPE_LEN + 16]);
        framer.on_bytes_received(ch, &bytes);
        assert!(framer.next_frame().is_none());

        // The channel recovers for the next frame
        framer.on_bytes_received(ch, &ping_frame());
        assert!(framer.next_frame().is_some());
    }

    #[test]
    fn test_channels_reassemble_independently() {
        let framer = Framer::new();
        let frame = ping_frame();
        let (head, tail) = frame.split_at(3);

        framer.on_bytes_received(ChannelId(1), head);
        framer.on_bytes_received(ChannelId(2), &frame);
        framer.on_bytes_received(ChannelId(1), tail);

        let (first, _) = framer.next_frame().unwrap();
        let (second, _) = framer.next_frame().unwrap();
        assert_eq!(first, ChannelId(2));
        assert_eq!(second, ChannelId(1));
    }

    #[test]
    fn test_queue_overflow_drops_newest() {
        let framer = Framer::new();
        let ch = ChannelId(1);
        for _ in 0..PENDING_FRAME_SLOTS + 3 {
            framer.on_bytes_received(ch, &ping_frame());
        }

        let mut count = 0;
        while framer.next_frame().is_some() {
            count += 1;
        }
        assert_eq!(count, PENDING_FRAME_SLOTS);
    }

    #[test]
    fn test_send_fragments_at_transport_size() {
        let transport = CollectingTransport {
            max: 4,
            sent: Mutex::new(Vec::new()),
        };
        send_envelope(&transport, ChannelId(1), &Message::Ping, None).unwrap();

        let sent = transport.sent.lock();
        assert!(sent.len() > 1);
        assert!(sent.iter().all(|f| f.len() <= 4));

        let joined: Vec<u8> = sent.iter().flatten().copied().collect();
        assert_eq!(decode_frame(&joined).unwrap().0, Message::Ping);
    }
}
