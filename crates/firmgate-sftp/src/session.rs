//! Per-connection SFTP session state machine.
//!
//! One [`SftpSession`] exists per authenticated connection. Raw channel
//! bytes go in through [`SftpSession::handle_data`], which reassembles
//! length-prefixed packets, decodes each into a typed
//! [`Request`](crate::protocol::Request) and dispatches it; the returned
//! bytes are complete framed responses ready for the channel.
//!
//! Every filesystem verb maps onto the object store: reads fetch the
//! whole object at open, writes accumulate in memory and commit at
//! close, directories are synthesized from listing prefixes.

use crate::access::{self, AccessOp};
use crate::audit::AuditLogger;
use crate::config::Config;
use crate::handles::{Handle, HandleTable, READDIR_PAGE};
use crate::listing::{self, DirEntry};
use crate::protocol::{FileAttrs, MessageType, OpenFlags, Request, StatusCode, SFTP_VERSION, codec};
use crate::{paths, Error, Result};
use bytes::{Buf, BufMut, BytesMut};
use firmgate_core::UserContext;
use firmgate_store::{content_type_for, ObjectStore};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Largest packet a client may send: 256 KiB covers the 32 KiB write
/// chunks every mainstream client uses with generous headroom.
const MAX_PACKET_SIZE: usize = 256 * 1024;

/// SFTP session state for one authenticated user.
pub struct SftpSession {
    user: UserContext,
    store: Arc<dyn ObjectStore>,
    config: Arc<Config>,
    client_ip: Option<IpAddr>,
    handles: HandleTable,
    pending: BytesMut,
    initialized: bool,
}

impl SftpSession {
    pub fn new(
        user: UserContext,
        store: Arc<dyn ObjectStore>,
        config: Arc<Config>,
        client_ip: Option<IpAddr>,
    ) -> Self {
        let max_handles = config.max_handles;
        Self {
            user,
            store,
            config,
            client_ip,
            handles: HandleTable::new(max_handles),
            pending: BytesMut::new(),
            initialized: false,
        }
    }

    pub fn username(&self) -> &str {
        &self.user.username
    }

    /// Feed raw channel bytes in, get framed response bytes out.
    ///
    /// SSH delivers the SFTP byte stream in arbitrary chunks; packets are
    /// reassembled here before dispatch. Several complete packets in one
    /// chunk produce several concatenated responses.
    pub async fn handle_data(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        self.pending.extend_from_slice(data);

        let mut output = Vec::new();
        while let Some(packet) = self.next_packet()? {
            let response = self.handle_packet(&packet).await?;
            output.reserve(4 + response.len());
            output.extend_from_slice(&(response.len() as u32).to_be_bytes());
            output.extend_from_slice(&response);
        }

        Ok(output)
    }

    /// Extract the next complete packet body from the reassembly buffer.
    fn next_packet(&mut self) -> Result<Option<Vec<u8>>> {
        if self.pending.len() < 4 {
            return Ok(None);
        }

        let len = u32::from_be_bytes([
            self.pending[0],
            self.pending[1],
            self.pending[2],
            self.pending[3],
        ]) as usize;

        if len == 0 || len > MAX_PACKET_SIZE {
            return Err(Error::Protocol(format!("Bad packet length: {len}")));
        }

        if self.pending.len() < 4 + len {
            return Ok(None);
        }

        self.pending.advance(4);
        let packet = self.pending.split_to(len).to_vec();
        Ok(Some(packet))
    }

    /// Decode and dispatch one packet, producing one unframed response.
    async fn handle_packet(&mut self, packet: &[u8]) -> Result<Vec<u8>> {
        let request = Request::decode(packet)?;
        debug!(username = %self.user.username, request = ?request_name(&request), "SFTP request");

        if !self.initialized && !matches!(request, Request::Init { .. }) {
            return Err(Error::Protocol("Session not initialized".into()));
        }

        let request_id = request.id();
        let operation = request_name(&request);
        let target = self.request_target(&request);
        match self.dispatch(request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                self.audit_failure(operation, target, &e);
                match request_id {
                    // Anything that failed after decode answers as a
                    // status; the connection stays up.
                    Some(id) => Ok(status_error(id, &e)),
                    None => Err(e),
                }
            }
        }
    }

    /// Best-effort target of a request, for audit logging. Handle-based
    /// requests resolve through the table; an unknown handle has no
    /// target to name.
    fn request_target(&self, request: &Request) -> Option<String> {
        match request {
            Request::Open { path, .. }
            | Request::Opendir { path, .. }
            | Request::Remove { path, .. }
            | Request::Stat { path, .. }
            | Request::Realpath { path, .. } => Some(path.clone()),
            Request::Close { handle, .. }
            | Request::Read { handle, .. }
            | Request::Write { handle, .. }
            | Request::Readdir { handle, .. } => {
                self.handles.get(handle).map(|h| h.key().to_string())
            }
            Request::Init { .. } | Request::Unsupported { .. } => None,
        }
    }

    /// Every failed request is audit-logged with its operation, actor,
    /// target and cause.
    fn audit_failure(&self, operation: &'static str, target: Option<String>, error: &Error) {
        if error.is_security_event() {
            AuditLogger::log_security_event(
                self.client_ip,
                Some(self.user.username.clone()),
                "request_denied".to_string(),
                format!("{operation} {}: {error}", target.as_deref().unwrap_or("-")),
            );
            return;
        }

        let path = target.as_deref().unwrap_or("-");
        match operation {
            "opendir" | "readdir" => AuditLogger::log_directory_operation(
                self.client_ip,
                Some(self.user.username.clone()),
                operation,
                path,
                false,
                Some(error.to_string()),
            ),
            _ => AuditLogger::log_file_operation(
                self.client_ip,
                Some(self.user.username.clone()),
                operation,
                path,
                None,
                false,
                Some(error.to_string()),
            ),
        }
    }

    async fn dispatch(&mut self, request: Request) -> Result<Vec<u8>> {
        match request {
            Request::Init { version } => self.op_init(version),
            Request::Open {
                id, path, flags, ..
            } => self.op_open(id, &path, flags).await,
            Request::Close { id, handle } => self.op_close(id, &handle).await,
            Request::Read {
                id,
                handle,
                offset,
                length,
            } => self.op_read(id, &handle, offset, length),
            Request::Write {
                id,
                handle,
                offset,
                data,
            } => self.op_write(id, &handle, offset, &data),
            Request::Opendir { id, path } => self.op_opendir(id, &path).await,
            Request::Readdir { id, handle } => self.op_readdir(id, &handle),
            Request::Remove { id, path } => self.op_remove(id, &path).await,
            Request::Stat { id, path } => self.op_stat(id, &path).await,
            Request::Realpath { id, path } => self.op_realpath(id, &path),
            Request::Unsupported { msg_type, .. } => Err(Error::NotSupported(format!(
                "Message type {msg_type:?} is not supported"
            ))),
        }
    }

    fn op_init(&mut self, client_version: u32) -> Result<Vec<u8>> {
        info!(
            username = %self.user.username,
            client_version,
            "SFTP session initialized"
        );
        self.initialized = true;

        let mut response = BytesMut::new();
        response.put_u8(MessageType::Version as u8);
        response.put_u32(SFTP_VERSION);
        Ok(response.to_vec())
    }

    /// Open a file handle.
    ///
    /// A write-flagged open starts an upload: nothing is fetched and
    /// data accumulates until close. Otherwise the whole object is
    /// fetched up front and reads serve from the buffer.
    async fn op_open(&mut self, id: u32, path: &str, flags: OpenFlags) -> Result<Vec<u8>> {
        let key = paths::resolve(path)?;

        if key.ends_with('/') {
            return Err(Error::NotFound(format!("{key} is a directory")));
        }

        let writable = flags.has_write() || flags.has_append();
        let op = if writable {
            AccessOp::Write
        } else {
            AccessOp::Read
        };
        access::authorize(&self.user, op, &key)?;

        let data = if writable {
            Vec::new()
        } else {
            self.store.get(&key, self.config.max_file_size).await?
        };

        let size = data.len() as u64;
        let handle_id = self.handles.insert(Handle::File {
            key: key.clone(),
            data,
            pending: Vec::new(),
            writable,
        })?;

        AuditLogger::log_file_operation(
            self.client_ip,
            Some(self.user.username.clone()),
            if writable { "open_write" } else { "open_read" },
            &key,
            if writable { None } else { Some(size) },
            true,
            None,
        );

        Ok(send_handle(id, &handle_id))
    }

    /// Close a handle; a dirty write buffer commits to the backend here.
    async fn op_close(&mut self, id: u32, handle_id: &[u8]) -> Result<Vec<u8>> {
        let handle = self.handles.remove(handle_id)?;

        if let Handle::File {
            key,
            pending,
            writable: true,
            ..
        } = handle
        {
            if !pending.is_empty() {
                let bytes = pending.len() as u64;
                let content_type = content_type_for(&key);
                self.store.put(&key, pending, Some(content_type)).await?;

                AuditLogger::log_file_operation(
                    self.client_ip,
                    Some(self.user.username.clone()),
                    "write",
                    &key,
                    Some(bytes),
                    true,
                    None,
                );
            }
        }

        Ok(send_status(id, StatusCode::Ok, "Success"))
    }

    fn op_read(&mut self, id: u32, handle_id: &[u8], offset: u64, length: u32) -> Result<Vec<u8>> {
        let handle = self.handles.get_mut(handle_id)?;

        let Handle::File {
            data,
            pending,
            writable,
            ..
        } = handle
        else {
            return Err(Error::invalid_handle("Cannot read from directory handle"));
        };

        // A write handle reads back its own uncommitted buffer.
        let data = if *writable { pending } else { data };

        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        if offset >= data.len() {
            return Ok(send_status(id, StatusCode::Eof, "End of file"));
        }

        let end = offset.saturating_add(length as usize).min(data.len());
        Ok(send_data(id, &data[offset..end]))
    }

    /// Append a write chunk to the handle's buffer.
    ///
    /// Commit happens at close, so out-of-order offsets cannot be
    /// honored; a mismatched offset is logged and the chunk appended in
    /// arrival order, which is the order every mainstream client sends.
    fn op_write(&mut self, id: u32, handle_id: &[u8], offset: u64, data: &[u8]) -> Result<Vec<u8>> {
        let max_file_size = self.config.max_file_size;
        let handle = self.handles.get_mut(handle_id)?;

        let Handle::File {
            key,
            pending,
            writable,
            ..
        } = handle
        else {
            return Err(Error::invalid_handle("Cannot write to directory handle"));
        };

        if !*writable {
            return Err(Error::PermissionDenied(format!(
                "handle for {key} is read-only"
            )));
        }

        if offset != pending.len() as u64 {
            warn!(
                key = %key,
                expected = pending.len(),
                offset,
                "Non-sequential write offset; appending in arrival order"
            );
        }

        if pending.len().saturating_add(data.len()) > max_file_size {
            return Err(Error::resource_exhaustion(format!(
                "upload exceeds {max_file_size} byte limit"
            )));
        }

        pending.extend_from_slice(data);
        Ok(send_status(id, StatusCode::Ok, "Success"))
    }

    /// Open a directory handle; the listing is fetched and translated
    /// eagerly so readdir just pages through it.
    async fn op_opendir(&mut self, id: u32, path: &str) -> Result<Vec<u8>> {
        let key = paths::resolve(path)?;
        access::authorize(&self.user, AccessOp::Read, &key)?;

        let prefix = paths::as_prefix(&key);
        let is_root = paths::is_root(&prefix);

        let raw = self.store.list(&prefix).await?;
        AuditLogger::log_directory_operation(
            self.client_ip,
            Some(self.user.username.clone()),
            "opendir",
            &prefix,
            true,
            None,
        );

        let entries = listing::translate(&raw, &self.user, is_root);
        let handle_id = self.handles.insert(Handle::Dir {
            key: prefix,
            entries,
            cursor: 0,
        })?;

        Ok(send_handle(id, &handle_id))
    }

    fn op_readdir(&mut self, id: u32, handle_id: &[u8]) -> Result<Vec<u8>> {
        let handle = self.handles.get_mut(handle_id)?;

        let Handle::Dir {
            entries, cursor, ..
        } = handle
        else {
            return Err(Error::invalid_handle("Not a directory handle"));
        };

        if *cursor >= entries.len() {
            return Ok(send_status(id, StatusCode::Eof, "End of directory"));
        }

        let end = (*cursor + READDIR_PAGE).min(entries.len());
        let page = &entries[*cursor..end];
        let response = send_name(id, page);
        *cursor = end;

        Ok(response)
    }

    async fn op_remove(&mut self, id: u32, path: &str) -> Result<Vec<u8>> {
        let key = paths::resolve(path)?;
        access::authorize(&self.user, AccessOp::Delete, &key)?;

        if key.ends_with('/') {
            return Err(Error::NotFound(format!("{key} is a directory")));
        }

        // Backend deletes are idempotent; a missing key is not an error.
        self.store.delete(&key).await?;
        AuditLogger::log_file_operation(
            self.client_ip,
            Some(self.user.username.clone()),
            "delete",
            &key,
            None,
            true,
            None,
        );

        Ok(send_status(id, StatusCode::Ok, "Success"))
    }

    /// STAT/LSTAT: objects report their stored size and mtime. Anything
    /// else answers as a synthetic directory, because the backend has no
    /// directory objects and every non-object path is a possible prefix.
    async fn op_stat(&mut self, id: u32, path: &str) -> Result<Vec<u8>> {
        let key = paths::resolve(path)?;
        access::authorize(&self.user, AccessOp::Read, &key)?;

        if paths::is_root(&key) || key.ends_with('/') {
            return Ok(send_attrs(id, &FileAttrs::directory()));
        }

        if let Some(meta) = self.store.head(&key).await? {
            return Ok(send_attrs(id, &FileAttrs::regular(meta.size, meta.modified)));
        }

        Ok(send_attrs(id, &FileAttrs::directory()))
    }

    /// REALPATH: canonicalize onto the namespace; `"."` and `"/"` both
    /// land on `/firmwares` so clients start their session at the root.
    fn op_realpath(&mut self, id: u32, path: &str) -> Result<Vec<u8>> {
        let key = paths::resolve(path)?;
        let canonical = format!("/{}", key.trim_end_matches('/'));

        let entry = DirEntry {
            filename: canonical.clone(),
            longname: canonical,
            attrs: FileAttrs::directory(),
        };

        Ok(send_name(id, std::slice::from_ref(&entry)))
    }
}

impl Drop for SftpSession {
    fn drop(&mut self) {
        // Uncommitted write buffers are discarded with the handles; a
        // dropped connection never leaves a partial object behind.
        if !self.handles.is_empty() {
            info!(
                username = %self.user.username,
                open_handles = self.handles.len(),
                "Discarding open handles on session end"
            );
        }
    }
}

fn request_name(request: &Request) -> &'static str {
    match request {
        Request::Init { .. } => "init",
        Request::Open { .. } => "open",
        Request::Close { .. } => "close",
        Request::Read { .. } => "read",
        Request::Write { .. } => "write",
        Request::Opendir { .. } => "opendir",
        Request::Readdir { .. } => "readdir",
        Request::Remove { .. } => "remove",
        Request::Stat { .. } => "stat",
        Request::Realpath { .. } => "realpath",
        Request::Unsupported { .. } => "unsupported",
    }
}

/// Build a STATUS response with explicit code and message.
fn send_status(request_id: u32, code: StatusCode, msg: &str) -> Vec<u8> {
    let mut response = BytesMut::new();
    response.put_u8(MessageType::Status as u8);
    response.put_u32(request_id);
    response.put_u32(code.into());
    codec::put_string(&mut response, msg);
    codec::put_string(&mut response, "en"); // language tag
    response.to_vec()
}

/// Build a STATUS response from an error, with a sanitized message.
fn status_error(request_id: u32, error: &Error) -> Vec<u8> {
    let mut response = BytesMut::new();
    response.put_u8(MessageType::Status as u8);
    response.put_u32(request_id);
    response.put_u32(error.to_status_code());
    codec::put_string(&mut response, &error.sanitized_message());
    codec::put_string(&mut response, "en"); // language tag
    response.to_vec()
}

fn send_handle(request_id: u32, handle: &[u8]) -> Vec<u8> {
    let mut response = BytesMut::new();
    response.put_u8(MessageType::Handle as u8);
    response.put_u32(request_id);
    codec::put_bytes(&mut response, handle);
    response.to_vec()
}

fn send_data(request_id: u32, data: &[u8]) -> Vec<u8> {
    let mut response = BytesMut::new();
    response.put_u8(MessageType::Data as u8);
    response.put_u32(request_id);
    codec::put_bytes(&mut response, data);
    response.to_vec()
}

fn send_attrs(request_id: u32, attrs: &FileAttrs) -> Vec<u8> {
    let mut response = BytesMut::new();
    response.put_u8(MessageType::Attrs as u8);
    response.put_u32(request_id);
    response.put(attrs.encode());
    response.to_vec()
}

fn send_name(request_id: u32, entries: &[DirEntry]) -> Vec<u8> {
    let mut response = BytesMut::new();
    response.put_u8(MessageType::Name as u8);
    response.put_u32(request_id);
    response.put_u32(entries.len() as u32);
    for entry in entries {
        codec::put_string(&mut response, &entry.filename);
        codec::put_string(&mut response, &entry.longname);
        response.put(entry.attrs.encode());
    }
    response.to_vec()
}
