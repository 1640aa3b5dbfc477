//! Error types for the SFTP bridge.
//!
//! Everything that can fail inside a request is converted to an SFTP
//! status response at the session boundary; only the status codes named
//! in the per-operation contracts ever reach a client, and messages are
//! sanitized so neither account existence nor storage layout leaks.

use thiserror::Error;

/// Result type alias for SFTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SFTP bridge error types.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SSH transport error
    #[error("SSH error: {0}")]
    Ssh(String),

    /// SFTP protocol violation or malformed packet
    #[error("SFTP protocol error: {0}")]
    Protocol(String),

    /// Authentication failed; the client never learns which way
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Resolved key does not exist in the backend
    #[error("No such file: {0}")]
    NotFound(String),

    /// Role or model-scope check failed
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Path validation failure (NUL bytes, traversal segments)
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network connection failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Backend call exceeded its time budget
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Handle is unknown to this session
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Handle or buffer limits exceeded
    #[error("Resource exhaustion: {0}")]
    ResourceExhaustion(String),

    /// SFTP message type the bridge does not implement
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// SSH channel unexpectedly closed
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Object store backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Credential store failure
    #[error("Database error: {0}")]
    Database(String),
}

impl Error {
    /// Check if error is security-related and should be audited.
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            Error::Authentication(_) | Error::PermissionDenied(_) | Error::InvalidPath(_)
        )
    }

    /// Map to an SFTP STATUS code.
    ///
    /// Only `Ok`, `Eof`, `NoSuchFile`, `PermissionDenied` and `Failure`
    /// are ever emitted; every other failure collapses to `Failure` so a
    /// client cannot distinguish backend trouble from protocol trouble.
    pub fn to_status_code(&self) -> u32 {
        use crate::protocol::StatusCode;

        match self {
            Error::NotFound(_) => StatusCode::NoSuchFile as u32,
            Error::PermissionDenied(_) => StatusCode::PermissionDenied as u32,
            _ => StatusCode::Failure as u32,
        }
    }

    /// Error message safe to send to a client.
    pub fn sanitized_message(&self) -> String {
        match self {
            // Never reveal why authentication failed
            Error::Authentication(_) => "Authentication failed".to_string(),
            // Never reveal the resolved key or the rejecting check
            Error::PermissionDenied(_) => "Permission denied".to_string(),
            Error::InvalidPath(_) => "Invalid path".to_string(),
            Error::NotFound(_) => "No such file".to_string(),
            Error::Config(_) => "Server configuration error".to_string(),
            // Backend details stay server-side
            Error::Storage(_) | Error::Database(_) | Error::Timeout(_) => "Failure".to_string(),
            _ => self.to_string(),
        }
    }

    /// Create invalid handle error.
    pub fn invalid_handle(context: impl Into<String>) -> Self {
        Error::InvalidHandle(context.into())
    }

    /// Create resource exhaustion error.
    pub fn resource_exhaustion(context: impl Into<String>) -> Self {
        Error::ResourceExhaustion(context.into())
    }

    /// Create channel closed error.
    pub fn channel_closed(context: impl Into<String>) -> Self {
        Error::ChannelClosed(context.into())
    }
}

impl From<russh::Error> for Error {
    fn from(err: russh::Error) -> Self {
        Error::Ssh(err.to_string())
    }
}

impl From<russh_keys::Error> for Error {
    fn from(err: russh_keys::Error) -> Self {
        Error::Ssh(err.to_string())
    }
}

impl From<firmgate_store::StoreError> for Error {
    fn from(err: firmgate_store::StoreError) -> Self {
        use firmgate_store::StoreError;
        match err {
            StoreError::NotFound { key } => Error::NotFound(key),
            StoreError::TooLarge { key, limit, .. } => {
                Error::ResourceExhaustion(format!("{key} exceeds {limit} byte limit"))
            }
            StoreError::Timeout { operation } => Error::Timeout(operation.to_string()),
            StoreError::Backend(msg) => Error::Storage(msg),
        }
    }
}

impl From<firmgate_core::FirmgateError> for Error {
    fn from(err: firmgate_core::FirmgateError) -> Self {
        use firmgate_core::FirmgateError;
        match err {
            FirmgateError::Database(e) => Error::Database(e.to_string()),
            FirmgateError::Io(e) => Error::Io(e),
            FirmgateError::Storage(msg) => Error::Storage(msg),
            FirmgateError::Auth(msg) | FirmgateError::UnknownRole(msg) => {
                Error::Authentication(msg)
            }
            FirmgateError::InvalidConfig(msg) => Error::Config(msg),
            FirmgateError::Other(e) => Error::Ssh(e.to_string()),
        }
    }
}
