//! SFTP protocol types and wire codec.
//!
//! Implements the subset of SFTP version 3 (draft-ietf-secsh-filexfer-02)
//! the bridge serves. Incoming packets decode into a typed [`Request`] so
//! the session dispatches on an enum instead of registering per-verb
//! callbacks; message types outside the bridge's vocabulary still decode
//! (to [`Request::Unsupported`]) so they can be answered with a status
//! response rather than a dropped connection.

use bytes::{Buf, BufMut, BytesMut};
use chrono::{DateTime, Utc};

/// SFTP protocol version served.
pub const SFTP_VERSION: u32 = 3;

/// SFTP message types (as defined in the SFTP specification).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Init = 1,
    Version = 2,
    Open = 3,
    Close = 4,
    Read = 5,
    Write = 6,
    Lstat = 7,
    Fstat = 8,
    Setstat = 9,
    Fsetstat = 10,
    Opendir = 11,
    Readdir = 12,
    Remove = 13,
    Mkdir = 14,
    Rmdir = 15,
    Realpath = 16,
    Stat = 17,
    Rename = 18,
    Readlink = 19,
    Symlink = 20,
    Status = 101,
    Handle = 102,
    Data = 103,
    Name = 104,
    Attrs = 105,
    Extended = 200,
    ExtendedReply = 201,
}

impl TryFrom<u8> for MessageType {
    type Error = crate::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageType::Init),
            2 => Ok(MessageType::Version),
            3 => Ok(MessageType::Open),
            4 => Ok(MessageType::Close),
            5 => Ok(MessageType::Read),
            6 => Ok(MessageType::Write),
            7 => Ok(MessageType::Lstat),
            8 => Ok(MessageType::Fstat),
            9 => Ok(MessageType::Setstat),
            10 => Ok(MessageType::Fsetstat),
            11 => Ok(MessageType::Opendir),
            12 => Ok(MessageType::Readdir),
            13 => Ok(MessageType::Remove),
            14 => Ok(MessageType::Mkdir),
            15 => Ok(MessageType::Rmdir),
            16 => Ok(MessageType::Realpath),
            17 => Ok(MessageType::Stat),
            18 => Ok(MessageType::Rename),
            19 => Ok(MessageType::Readlink),
            20 => Ok(MessageType::Symlink),
            101 => Ok(MessageType::Status),
            102 => Ok(MessageType::Handle),
            103 => Ok(MessageType::Data),
            104 => Ok(MessageType::Name),
            105 => Ok(MessageType::Attrs),
            200 => Ok(MessageType::Extended),
            201 => Ok(MessageType::ExtendedReply),
            _ => Err(crate::Error::Protocol(format!(
                "Unknown message type: {value}"
            ))),
        }
    }
}

/// SFTP status codes (draft-ietf-secsh-filexfer-02).
///
/// The bridge only ever sends `Ok`, `Eof`, `NoSuchFile`,
/// `PermissionDenied` and `Failure`.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok = 0,
    Eof = 1,
    NoSuchFile = 2,
    PermissionDenied = 3,
    Failure = 4,
    BadMessage = 5,
    NoConnection = 6,
    ConnectionLost = 7,
    OpUnsupported = 8,
}

impl From<StatusCode> for u32 {
    fn from(code: StatusCode) -> u32 {
        code as u32
    }
}

/// File open flags (as defined in the SFTP spec).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags(pub u32);

impl OpenFlags {
    pub const READ: u32 = 0x0000_0001;
    pub const WRITE: u32 = 0x0000_0002;
    pub const APPEND: u32 = 0x0000_0004;
    pub const CREAT: u32 = 0x0000_0008;
    pub const TRUNC: u32 = 0x0000_0010;
    pub const EXCL: u32 = 0x0000_0020;

    pub fn has_read(&self) -> bool {
        self.0 & Self::READ != 0
    }

    pub fn has_write(&self) -> bool {
        self.0 & Self::WRITE != 0
    }

    pub fn has_append(&self) -> bool {
        self.0 & Self::APPEND != 0
    }
}

/// Unix timestamp as the u32 the v3 attrs block carries.
fn unix_secs(t: DateTime<Utc>) -> u32 {
    u32::try_from(t.timestamp()).unwrap_or(0)
}

/// File attributes (as defined in the SFTP spec).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileAttrs {
    pub size: Option<u64>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub permissions: Option<u32>,
    pub atime: Option<u32>,
    pub mtime: Option<u32>,
}

impl FileAttrs {
    const FLAG_SIZE: u32 = 0x0000_0001;
    const FLAG_UIDGID: u32 = 0x0000_0002;
    const FLAG_PERMISSIONS: u32 = 0x0000_0004;
    const FLAG_ACMODTIME: u32 = 0x0000_0008;

    /// Mode bits for synthetic directories.
    pub const DIR_MODE: u32 = 0o040_755;
    /// Mode bits for stored objects.
    pub const FILE_MODE: u32 = 0o100_644;

    /// Attributes for a synthetic directory. The backing store has no
    /// directory objects, so size is zero and mtime is "now".
    pub fn directory() -> Self {
        let now = unix_secs(Utc::now());
        Self {
            size: Some(0),
            uid: Some(1000),
            gid: Some(1000),
            permissions: Some(Self::DIR_MODE),
            atime: Some(now),
            mtime: Some(now),
        }
    }

    /// Attributes for a stored object.
    pub fn regular(size: u64, modified: Option<DateTime<Utc>>) -> Self {
        let now = unix_secs(Utc::now());
        Self {
            size: Some(size),
            uid: Some(1000),
            gid: Some(1000),
            permissions: Some(Self::FILE_MODE),
            atime: Some(now),
            mtime: Some(modified.map_or(now, unix_secs)),
        }
    }

    pub fn is_directory(&self) -> bool {
        self.permissions
            .is_some_and(|mode| mode & 0o170_000 == 0o040_000)
    }

    /// Encode file attributes to bytes.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        let mut flags = 0u32;

        if self.size.is_some() {
            flags |= Self::FLAG_SIZE;
        }
        if self.uid.is_some() && self.gid.is_some() {
            flags |= Self::FLAG_UIDGID;
        }
        if self.permissions.is_some() {
            flags |= Self::FLAG_PERMISSIONS;
        }
        if self.atime.is_some() && self.mtime.is_some() {
            flags |= Self::FLAG_ACMODTIME;
        }

        buf.put_u32(flags);

        if let Some(size) = self.size {
            buf.put_u64(size);
        }
        if let (Some(uid), Some(gid)) = (self.uid, self.gid) {
            buf.put_u32(uid);
            buf.put_u32(gid);
        }
        if let Some(permissions) = self.permissions {
            buf.put_u32(permissions);
        }
        if let (Some(atime), Some(mtime)) = (self.atime, self.mtime) {
            buf.put_u32(atime);
            buf.put_u32(mtime);
        }

        buf
    }

    /// Decode file attributes from bytes.
    pub fn decode(buf: &mut &[u8]) -> crate::Result<Self> {
        if buf.remaining() < 4 {
            return Err(crate::Error::Protocol("Insufficient data for flags".into()));
        }

        let flags = buf.get_u32();
        let mut attrs = FileAttrs::default();

        if flags & Self::FLAG_SIZE != 0 {
            if buf.remaining() < 8 {
                return Err(crate::Error::Protocol("Insufficient data for size".into()));
            }
            attrs.size = Some(buf.get_u64());
        }

        if flags & Self::FLAG_UIDGID != 0 {
            if buf.remaining() < 8 {
                return Err(crate::Error::Protocol("Insufficient data for uid/gid".into()));
            }
            attrs.uid = Some(buf.get_u32());
            attrs.gid = Some(buf.get_u32());
        }

        if flags & Self::FLAG_PERMISSIONS != 0 {
            if buf.remaining() < 4 {
                return Err(crate::Error::Protocol(
                    "Insufficient data for permissions".into(),
                ));
            }
            attrs.permissions = Some(buf.get_u32());
        }

        if flags & Self::FLAG_ACMODTIME != 0 {
            if buf.remaining() < 8 {
                return Err(crate::Error::Protocol(
                    "Insufficient data for atime/mtime".into(),
                ));
            }
            attrs.atime = Some(buf.get_u32());
            attrs.mtime = Some(buf.get_u32());
        }

        Ok(attrs)
    }
}

/// One decoded client request.
///
/// Every variant except `Init` carries the client's request id, echoed
/// back in the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Init {
        version: u32,
    },
    Open {
        id: u32,
        path: String,
        flags: OpenFlags,
        attrs: FileAttrs,
    },
    Close {
        id: u32,
        handle: Vec<u8>,
    },
    Read {
        id: u32,
        handle: Vec<u8>,
        offset: u64,
        length: u32,
    },
    Write {
        id: u32,
        handle: Vec<u8>,
        offset: u64,
        data: Vec<u8>,
    },
    Opendir {
        id: u32,
        path: String,
    },
    Readdir {
        id: u32,
        handle: Vec<u8>,
    },
    Remove {
        id: u32,
        path: String,
    },
    /// STAT and LSTAT; identical over a virtual filesystem with no links.
    Stat {
        id: u32,
        path: String,
    },
    Realpath {
        id: u32,
        path: String,
    },
    /// Any message type the bridge does not implement.
    Unsupported {
        id: u32,
        msg_type: MessageType,
    },
}

impl Request {
    /// Decode one complete SFTP packet body (type byte onward, without
    /// the outer length prefix).
    pub fn decode(packet: &[u8]) -> crate::Result<Self> {
        if packet.is_empty() {
            return Err(crate::Error::Protocol("Empty packet".into()));
        }

        let msg_type = MessageType::try_from(packet[0])?;
        let mut buf = &packet[1..];

        match msg_type {
            MessageType::Init => Ok(Request::Init {
                version: codec::get_u32(&mut buf)?,
            }),
            MessageType::Open => {
                let id = codec::get_u32(&mut buf)?;
                let path = codec::get_string(&mut buf)?;
                let flags = OpenFlags(codec::get_u32(&mut buf)?);
                let attrs = FileAttrs::decode(&mut buf)?;
                Ok(Request::Open {
                    id,
                    path,
                    flags,
                    attrs,
                })
            }
            MessageType::Close => {
                let id = codec::get_u32(&mut buf)?;
                let handle = codec::get_bytes(&mut buf)?;
                Ok(Request::Close { id, handle })
            }
            MessageType::Read => {
                let id = codec::get_u32(&mut buf)?;
                let handle = codec::get_bytes(&mut buf)?;
                let offset = codec::get_u64(&mut buf)?;
                let length = codec::get_u32(&mut buf)?;
                Ok(Request::Read {
                    id,
                    handle,
                    offset,
                    length,
                })
            }
            MessageType::Write => {
                let id = codec::get_u32(&mut buf)?;
                let handle = codec::get_bytes(&mut buf)?;
                let offset = codec::get_u64(&mut buf)?;
                let data = codec::get_bytes(&mut buf)?;
                Ok(Request::Write {
                    id,
                    handle,
                    offset,
                    data,
                })
            }
            MessageType::Opendir => {
                let id = codec::get_u32(&mut buf)?;
                let path = codec::get_string(&mut buf)?;
                Ok(Request::Opendir { id, path })
            }
            MessageType::Readdir => {
                let id = codec::get_u32(&mut buf)?;
                let handle = codec::get_bytes(&mut buf)?;
                Ok(Request::Readdir { id, handle })
            }
            MessageType::Remove => {
                let id = codec::get_u32(&mut buf)?;
                let path = codec::get_string(&mut buf)?;
                Ok(Request::Remove { id, path })
            }
            MessageType::Stat | MessageType::Lstat => {
                let id = codec::get_u32(&mut buf)?;
                let path = codec::get_string(&mut buf)?;
                Ok(Request::Stat { id, path })
            }
            MessageType::Realpath => {
                let id = codec::get_u32(&mut buf)?;
                let path = codec::get_string(&mut buf)?;
                Ok(Request::Realpath { id, path })
            }
            other => {
                // Still need the request id to answer with a status.
                let id = codec::get_u32(&mut buf)?;
                Ok(Request::Unsupported {
                    id,
                    msg_type: other,
                })
            }
        }
    }

    /// Request id echoed in the response, if the variant carries one.
    pub fn id(&self) -> Option<u32> {
        match self {
            Request::Init { .. } => None,
            Request::Open { id, .. }
            | Request::Close { id, .. }
            | Request::Read { id, .. }
            | Request::Write { id, .. }
            | Request::Opendir { id, .. }
            | Request::Readdir { id, .. }
            | Request::Remove { id, .. }
            | Request::Stat { id, .. }
            | Request::Realpath { id, .. }
            | Request::Unsupported { id, .. } => Some(*id),
        }
    }
}

/// Helper functions for encoding/decoding SFTP wire primitives.
pub mod codec {
    use bytes::{Buf, BufMut, BytesMut};

    pub fn get_u32(buf: &mut &[u8]) -> crate::Result<u32> {
        if buf.remaining() < 4 {
            return Err(crate::Error::Protocol("Insufficient data for u32".into()));
        }
        Ok(buf.get_u32())
    }

    pub fn get_u64(buf: &mut &[u8]) -> crate::Result<u64> {
        if buf.remaining() < 8 {
            return Err(crate::Error::Protocol("Insufficient data for u64".into()));
        }
        Ok(buf.get_u64())
    }

    /// Encode a string as SFTP string (length + data).
    pub fn put_string(buf: &mut BytesMut, s: &str) {
        buf.put_u32(s.len() as u32);
        buf.put_slice(s.as_bytes());
    }

    /// Decode an SFTP string.
    pub fn get_string(buf: &mut &[u8]) -> crate::Result<String> {
        let bytes = get_bytes(buf)?;
        String::from_utf8(bytes)
            .map_err(|e| crate::Error::Protocol(format!("Invalid UTF-8 string: {e}")))
    }

    /// Encode bytes as SFTP string (length + data).
    pub fn put_bytes(buf: &mut BytesMut, data: &[u8]) {
        buf.put_u32(data.len() as u32);
        buf.put_slice(data);
    }

    /// Decode SFTP bytes.
    pub fn get_bytes(buf: &mut &[u8]) -> crate::Result<Vec<u8>> {
        if buf.remaining() < 4 {
            return Err(crate::Error::Protocol(
                "Insufficient data for string length".into(),
            ));
        }

        let len = buf.get_u32() as usize;
        if buf.remaining() < len {
            return Err(crate::Error::Protocol("Insufficient data for string".into()));
        }

        let bytes = &buf[..len];
        buf.advance(len);

        Ok(bytes.to_vec())
    }
}
