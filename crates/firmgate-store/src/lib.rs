//! Object storage adapter for the SFTP bridge.
//!
//! The backing store is flat key/value object storage with no native
//! directories; everything hierarchical about the bridge is synthesized
//! above this crate. The [`ObjectStore`] trait keeps the protocol layer
//! testable against the in-memory implementation.

pub mod memory;
pub mod s3;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use memory::MemoryObjectStore;
pub use s3::{S3Config, S3ObjectStore};

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage backend error taxonomy.
///
/// Only `NotFound` is distinguished to protocol callers; everything else
/// collapses to a generic failure status at the session boundary.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The requested key does not exist.
    #[error("Object not found: {key}")]
    NotFound { key: String },

    /// The object exceeds the configured in-memory buffering cap.
    #[error("Object too large: {key} ({actual} bytes, limit {limit})")]
    TooLarge {
        key: String,
        limit: usize,
        actual: usize,
    },

    /// A backend call did not complete within the operation timeout.
    #[error("Storage operation timed out: {operation}")]
    Timeout { operation: &'static str },

    /// Any other backend failure (network, service error).
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Metadata for a single stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// One object in a listing result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Full storage key.
    pub key: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// One-level listing under a prefix: common prefixes ("subdirectories")
/// and the objects directly below the prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectListing {
    /// Common prefixes, each ending in the delimiter.
    pub prefixes: Vec<String>,
    pub objects: Vec<ObjectInfo>,
}

/// Minimal object-store surface the bridge needs.
///
/// The underlying client is stateless and may be shared across sessions.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the full content of an object, rejecting anything larger
    /// than `max_bytes` before it is buffered.
    async fn get(&self, key: &str, max_bytes: usize) -> Result<Vec<u8>>;

    /// Store an object in a single call.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: Option<&str>) -> Result<()>;

    /// Delete an object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Fetch object metadata; `Ok(None)` when the key does not exist.
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>>;

    /// One-level listing under `prefix` using `/` as the delimiter.
    async fn list(&self, prefix: &str) -> Result<ObjectListing>;
}

/// Content type for a storage key, from its file extension.
pub fn content_type_for(key: &str) -> &'static str {
    let ext = key.rsplit('.').next().unwrap_or_default();
    match ext.to_ascii_lowercase().as_str() {
        "bin" => "application/octet-stream",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}
