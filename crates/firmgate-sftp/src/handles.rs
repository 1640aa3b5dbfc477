//! Per-session handle table.
//!
//! Handles are opaque random tokens scoped to one session; nothing about
//! them survives the connection, and a handle from one session means
//! nothing to another. The table is capped so a client cannot grow
//! server memory without bound by opening and abandoning handles.

use crate::listing::DirEntry;
use crate::{Error, Result};
use rand::RngCore;
use std::collections::HashMap;

/// Directory reads page this many entries per SSH_FXP_READDIR.
pub const READDIR_PAGE: usize = 10;

/// State behind one open handle.
#[derive(Debug)]
pub enum Handle {
    /// Open file. Reads serve from `data`; writes append to `pending`
    /// and commit on close.
    File {
        key: String,
        data: Vec<u8>,
        pending: Vec<u8>,
        writable: bool,
    },
    /// Open directory with its remaining unpaged entries.
    Dir {
        key: String,
        entries: Vec<DirEntry>,
        cursor: usize,
    },
}

impl Handle {
    pub fn key(&self) -> &str {
        match self {
            Handle::File { key, .. } | Handle::Dir { key, .. } => key,
        }
    }
}

/// Table of open handles for one session.
pub struct HandleTable {
    handles: HashMap<Vec<u8>, Handle>,
    max_handles: usize,
}

impl HandleTable {
    pub fn new(max_handles: usize) -> Self {
        Self {
            handles: HashMap::new(),
            max_handles,
        }
    }

    /// Insert a handle, returning its freshly generated id.
    pub fn insert(&mut self, handle: Handle) -> Result<Vec<u8>> {
        if self.handles.len() >= self.max_handles {
            return Err(Error::resource_exhaustion(format!(
                "handle limit {} reached",
                self.max_handles
            )));
        }

        let mut id = vec![0u8; 16];
        rand::thread_rng().fill_bytes(&mut id);
        // 128 random bits; a collision within one session's table is not
        // a realistic event, but regenerate rather than clobber.
        while self.handles.contains_key(&id) {
            rand::thread_rng().fill_bytes(&mut id);
        }

        self.handles.insert(id.clone(), handle);
        Ok(id)
    }

    pub fn get(&self, id: &[u8]) -> Option<&Handle> {
        self.handles.get(id)
    }

    pub fn get_mut(&mut self, id: &[u8]) -> Result<&mut Handle> {
        self.handles
            .get_mut(id)
            .ok_or_else(|| Error::invalid_handle("unknown handle"))
    }

    /// Remove a handle, yielding its state for close-time commit.
    pub fn remove(&mut self, id: &[u8]) -> Result<Handle> {
        self.handles
            .remove(id)
            .ok_or_else(|| Error::invalid_handle("unknown handle"))
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
