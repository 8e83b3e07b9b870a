//! Command dispatcher
//!
//! Routes decoded envelopes to their handlers and drives the
//! request/response exchange. Every handler validates its arguments
//! before touching storage and always answers with a reply carrying a
//! wire status; nothing propagates past this boundary, and a failed
//! command never tears down the session.

use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use tracing::{debug, info, trace, warn};

use sysexfs_core::codec;
use sysexfs_core::path::validate_path;
use sysexfs_core::protocol::*;
use sysexfs_core::{
    DirEntry, OpenMode, StatusCode, MAX_BLOCK_LEN, MAX_DIR_PAGE, PROTOCOL_VERSION,
};

use crate::dirs;
use crate::framing::{send_envelope, Framer};
use crate::handles::HandleTable;
use crate::storage::{map_storage_error, Storage, StorageError};
use crate::transport::{ChannelId, Transport};

/// The protocol engine: one per device, shared by all transport
/// channels. Handle slots are drawn from a single global pool.
pub struct Engine<S: Storage, T: Transport> {
    storage: S,
    transport: T,
    framer: Framer,
    handles: HandleTable<S::File>,
    sessions: DashMap<ChannelId, u32>,
    next_sid: AtomicU32,
}

impl<S: Storage, T: Transport> Engine<S, T> {
    pub fn new(storage: S, transport: T) -> Self {
        Self {
            storage,
            transport,
            framer: Framer::new(),
            handles: HandleTable::new(),
            sessions: DashMap::new(),
            next_sid: AtomicU32::new(1),
        }
    }

    /// Feed raw bytes from the MIDI receive path. Safe to call from an
    /// interrupt context; no handler logic runs here.
    pub fn on_bytes_received(&self, channel: ChannelId, bytes: &[u8]) {
        self.framer.on_bytes_received(channel, bytes);
    }

    /// Process at most one pending envelope. Call from the main control
    /// loop; returns whether a frame was consumed.
    ///
    /// Unparsable frames are dropped here without a reply: a request
    /// that failed to parse has no reliable return address.
    pub fn pump(&self) -> bool {
        let Some((channel, frame)) = self.framer.next_frame() else {
            return false;
        };

        match decode_frame(&frame) {
            Ok((msg, packed)) => self.dispatch(channel, msg, packed),
            Err(e) => trace!("{channel}: dropping undecodable frame: {e}"),
        }

        true
    }

    /// Release all state owned by a disconnected channel.
    pub fn release_channel(&self, channel: ChannelId) {
        self.framer.drop_channel(channel);
        self.sessions.remove(&channel);
        for file in self.handles.release_channel(channel) {
            let _ = self.storage.close(file);
        }
    }

    /// Release handles and sessions of every channel the reachability
    /// check rejects. Must run before slot exhaustion caused by dead
    /// channels becomes observable to live ones.
    pub fn sweep(&self, reachable: impl Fn(ChannelId) -> bool) {
        for file in self.handles.sweep(&reachable) {
            let _ = self.storage.close(file);
        }
        self.sessions.retain(|ch, _| reachable(*ch));
        self.framer.retain_channels(reachable);
    }

    pub fn open_handles(&self) -> usize {
        self.handles.open_count()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn dispatch(&self, channel: ChannelId, msg: Message, packed: Option<Vec<u8>>) {
        debug!("{channel}: {}", command_name(&msg));

        let reply = match msg {
            Message::StartDirect => Some(self.handle_start(channel, None)),
            Message::StartReply(req) => Some(self.handle_start(channel, Some(req.token))),
            Message::Ping => Some((Message::Pong, None)),

            Message::OpenFile(req) => Some(self.handle_open_file(channel, req)),
            Message::CloseFile(req) => Some(self.handle_close_file(req)),
            Message::ReadBlock(req) => Some(self.handle_read_block(req)),
            Message::WriteBlock(req) => Some(self.handle_write_block(req, packed)),

            Message::GetDirEntries(req) => Some(self.handle_get_dir_entries(req)),
            Message::DeleteFile(req) => Some(self.handle_delete_file(req)),
            Message::CreateDirectory(req) => Some(self.handle_create_directory(req)),
            Message::Rename(req) => Some(self.handle_rename(req)),
            Message::UpdateTime(req) => Some(self.handle_update_time(req)),

            // Reply-shaped envelopes have no business arriving here
            Message::SessionReply(_)
            | Message::Pong
            | Message::OpenFileReply(_)
            | Message::CloseFileReply(_)
            | Message::ReadBlockReply(_)
            | Message::WriteBlockReply(_)
            | Message::DirEntriesReply(_)
            | Message::DeleteFileReply(_)
            | Message::CreateDirectoryReply(_)
            | Message::RenameReply(_)
            | Message::UpdateTimeReply(_) => {
                debug!("{channel}: ignoring reply-shaped envelope");
                None
            }
        };

        if let Some((msg, blob)) = reply {
            if let Err(e) = send_envelope(&self.transport, channel, &msg, blob.as_deref()) {
                warn!("{channel}: failed to encode reply: {e}");
            }
        }
    }

    /// Session establishment. Idempotent: repeating the handshake keeps
    /// the existing identity unless the host supplies a new correlation
    /// token.
    fn handle_start(&self, channel: ChannelId, token: Option<u32>) -> (Message, Option<Vec<u8>>) {
        let sid = match token {
            Some(token) => {
                self.sessions.insert(channel, token);
                token
            }
            None => *self
                .sessions
                .entry(channel)
                .or_insert_with(|| self.next_sid.fetch_add(1, Ordering::Relaxed)),
        };

        info!("{channel}: session {sid} active");
        let reply = Message::SessionReply(SessionReply {
            sid,
            version: PROTOCOL_VERSION,
        });
        (reply, None)
    }

    fn handle_open_file(&self, channel: ChannelId, req: OpenFile) -> (Message, Option<Vec<u8>>) {
        let reply = |status, fid, size| {
            (
                Message::OpenFileReply(OpenFileReply { status, fid, size }),
                None,
            )
        };

        if let Err(e) = validate_path(&req.path) {
            return reply(StatusCode::from(&e), 0, 0);
        }
        if self.handles.is_full() {
            return reply(StatusCode::TooManyOpenFiles, 0, 0);
        }

        let (file, size) = match self.storage.open(&req.path, req.write) {
            Ok(opened) => opened,
            Err(e) => return reply(map_storage_error(e), 0, 0),
        };

        let mode = OpenMode::from_write_flag(req.write);
        match self.handles.allocate(channel, file, mode) {
            Ok(fid) => reply(StatusCode::Ok, fid, size),
            Err(file) => {
                let _ = self.storage.close(file);
                reply(StatusCode::TooManyOpenFiles, 0, 0)
            }
        }
    }

    fn handle_close_file(&self, req: CloseFile) -> (Message, Option<Vec<u8>>) {
        let status = match self.handles.release(req.fid) {
            Some(file) => match self.storage.close(file) {
                Ok(()) => StatusCode::Ok,
                Err(e) => map_storage_error(e),
            },
            None => StatusCode::InvalidHandle,
        };
        (Message::CloseFileReply(CloseFileReply { status }), None)
    }

    fn handle_read_block(&self, req: ReadBlock) -> (Message, Option<Vec<u8>>) {
        let size = (req.size as usize).min(MAX_BLOCK_LEN);

        let outcome = self.handles.with_slot(req.fid, |slot| {
            let mut buf = vec![0u8; size];
            match self.storage.read(&mut slot.file, req.offset, &mut buf) {
                Ok(n) => {
                    buf.truncate(n);
                    slot.offset = req.offset + n as u32;
                    Ok(buf)
                }
                Err(e) => Err(e),
            }
        });

        let reply = |status, size| {
            Message::ReadBlockReply(ReadBlockReply {
                status,
                fid: req.fid,
                offset: req.offset,
                size,
            })
        };

        match outcome {
            Some(Ok(data)) => {
                let msg = reply(StatusCode::Ok, data.len() as u32);
                (msg, Some(data))
            }
            Some(Err(e)) => (reply(map_storage_error(e), 0), None),
            None => (reply(StatusCode::InvalidHandle, 0), None),
        }
    }

    fn handle_write_block(
        &self,
        req: WriteBlock,
        packed: Option<Vec<u8>>,
    ) -> (Message, Option<Vec<u8>>) {
        let reply =
            |status, size| (Message::WriteBlockReply(WriteBlockReply { status, size }), None);

        let Some(packed) = packed else {
            return reply(StatusCode::MalformedRequest, 0);
        };
        let data = match codec::unpack(&packed, MAX_BLOCK_LEN) {
            Ok(data) => data,
            Err(e) => return reply(StatusCode::from(&e), 0),
        };
        if data.len() as u32 != req.size {
            return reply(StatusCode::MalformedRequest, 0);
        }

        let outcome = self.handles.with_slot(req.fid, |slot| {
            if slot.mode != OpenMode::Write {
                return Err(StorageError::Io);
            }
            let n = self.storage.write(&mut slot.file, req.offset, &data)?;
            slot.offset = req.offset + n as u32;
            Ok(n)
        });

        match outcome {
            Some(Ok(n)) => reply(StatusCode::Ok, n as u32),
            Some(Err(e)) => reply(map_storage_error(e), 0),
            None => reply(StatusCode::InvalidHandle, 0),
        }
    }

    fn handle_get_dir_entries(&self, req: GetDirEntries) -> (Message, Option<Vec<u8>>) {
        let reply = |status, entries: Vec<DirEntry>, next_offset, has_more| {
            (
                Message::DirEntriesReply(DirEntriesReply {
                    status,
                    entries,
                    next_offset,
                    has_more,
                }),
                None,
            )
        };

        if let Err(e) = validate_path(&req.path) {
            return reply(StatusCode::from(&e), Vec::new(), req.offset, false);
        }

        let limit = if req.limit == 0 {
            MAX_DIR_PAGE
        } else {
            req.limit.min(MAX_DIR_PAGE)
        };

        match self.storage.list_dir(&req.path, req.offset, limit) {
            Ok((entries, has_more)) => {
                let next_offset = req.offset + entries.len() as u32;
                reply(StatusCode::Ok, entries, next_offset, has_more)
            }
            Err(e) => reply(map_storage_error(e), Vec::new(), req.offset, false),
        }
    }

    fn handle_delete_file(&self, req: DeleteFile) -> (Message, Option<Vec<u8>>) {
        let status = match validate_path(&req.path) {
            Ok(()) => match self.storage.remove(&req.path) {
                Ok(()) => StatusCode::Ok,
                Err(e) => map_storage_error(e),
            },
            Err(e) => StatusCode::from(&e),
        };
        (Message::DeleteFileReply(DeleteFileReply { status }), None)
    }

    fn handle_create_directory(&self, req: CreateDirectory) -> (Message, Option<Vec<u8>>) {
        let status = match validate_path(&req.path) {
            Ok(()) => {
                match dirs::create_path_directories(&self.storage, &req.path, req.date, req.time) {
                    Ok(()) => StatusCode::Ok,
                    Err(e) => map_storage_error(e),
                }
            }
            Err(e) => StatusCode::from(&e),
        };
        (
            Message::CreateDirectoryReply(CreateDirectoryReply { status }),
            None,
        )
    }

    fn handle_rename(&self, req: Rename) -> (Message, Option<Vec<u8>>) {
        let status = match validate_path(&req.from).and_then(|()| validate_path(&req.to)) {
            Ok(()) => match self.storage.rename(&req.from, &req.to) {
                Ok(()) => StatusCode::Ok,
                Err(e) => map_storage_error(e),
            },
            Err(e) => StatusCode::from(&e),
        };
        (Message::RenameReply(RenameReply { status }), None)
    }

    fn handle_update_time(&self, req: UpdateTime) -> (Message, Option<Vec<u8>>) {
        let status = match validate_path(&req.path) {
            Ok(()) => match dirs::update_time(&self.storage, &req.path, req.date, req.time) {
                Ok(()) => StatusCode::Ok,
                Err(e) => map_storage_error(e),
            },
            Err(e) => StatusCode::from(&e),
        };
        (Message::UpdateTimeReply(UpdateTimeReply { status }), None)
    }
}

fn command_name(msg: &Message) -> &'static str {
    match msg {
        Message::StartDirect => "startDirect",
        Message::StartReply(_) => "startReply",
        Message::SessionReply(_) => "sessionReply",
        Message::Ping => "ping",
        Message::Pong => "pong",
        Message::OpenFile(_) => "openFile",
        Message::OpenFileReply(_) => "openFileReply",
        Message::CloseFile(_) => "closeFile",
        Message::CloseFileReply(_) => "closeFileReply",
        Message::ReadBlock(_) => "readBlock",
        Message::ReadBlockReply(_) => "readBlockReply",
        Message::WriteBlock(_) => "writeBlock",
        Message::WriteBlockReply(_) => "writeBlockReply",
        Message::GetDirEntries(_) => "getDirEntries",
        Message::DirEntriesReply(_) => "dirEntriesReply",
        Message::DeleteFile(_) => "deleteFile",
        Message::DeleteFileReply(_) => "deleteFileReply",
        Message::CreateDirectory(_) => "createDirectory",
        Message::CreateDirectoryReply(_) => "createDirectoryReply",
        Message::Rename(_) => "rename",
        Message::RenameReply(_) => "renameReply",
        Message::UpdateTime(_) => "updateTime",
        Message::UpdateTimeReply(_) => "updateTimeReply",
    }
}
