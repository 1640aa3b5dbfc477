//! Audit trail and session tracking
//!
//! NIST 800-53: AU-2 (Audit Events), AU-3 (Content of Audit Records), AU-12 (Audit Generation)
//! Implementation: Structured audit logging for authentication and storage operations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tracing::{info, warn};

/// Audit event types
///
/// NIST 800-53: AU-2 (Audit Events)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum AuditEvent {
    /// Connection established
    ConnectionEstablished {
        /// Client IP address
        client_ip: Option<IpAddr>,
        /// Event timestamp
        timestamp: DateTime<Utc>,
    },
    /// Connection closed
    ConnectionClosed {
        /// Client IP address
        client_ip: Option<IpAddr>,
        /// Authenticated username
        username: Option<String>,
        /// Event timestamp
        timestamp: DateTime<Utc>,
        /// Session duration in seconds
        duration_secs: i64,
    },
    /// Authentication attempt
    AuthAttempt {
        /// Client IP address
        client_ip: Option<IpAddr>,
        /// Username attempted
        username: String,
        /// Event timestamp
        timestamp: DateTime<Utc>,
        /// Whether authentication succeeded
        success: bool,
        /// Failure reason if applicable
        reason: Option<String>,
    },
    /// Object operation (open, read, write, delete)
    FileOperation {
        /// Client IP address
        client_ip: Option<IpAddr>,
        /// Authenticated username
        username: Option<String>,
        /// Operation type (read, write, delete)
        operation: String,
        /// Resolved object key
        key: String,
        /// Event timestamp
        timestamp: DateTime<Utc>,
        /// Whether operation succeeded
        success: bool,
        /// Bytes transferred if applicable
        bytes_transferred: Option<u64>,
        /// Error message if failed
        error: Option<String>,
    },
    /// Directory listing
    DirectoryOperation {
        /// Client IP address
        client_ip: Option<IpAddr>,
        /// Authenticated username
        username: Option<String>,
        /// Operation type (opendir, readdir)
        operation: String,
        /// Resolved listing prefix
        key: String,
        /// Event timestamp
        timestamp: DateTime<Utc>,
        /// Whether operation succeeded
        success: bool,
        /// Error message if failed
        error: Option<String>,
    },
    /// Security event (denied access, rejected path, bad handle)
    SecurityEvent {
        /// Client IP address
        client_ip: Option<IpAddr>,
        /// Authenticated username
        username: Option<String>,
        /// Security event type
        event: String,
        /// Event details
        details: String,
        /// Event timestamp
        timestamp: DateTime<Utc>,
    },
}

impl AuditEvent {
    /// Log the audit event
    ///
    /// NIST 800-53: AU-12 (Audit Generation)
    pub fn log(&self) {
        match self {
            AuditEvent::ConnectionEstablished { client_ip, .. } => {
                info!(
                    event = "connection_established",
                    client_ip = ?client_ip,
                    audit = ?self,
                    "New connection established"
                );
            }
            AuditEvent::ConnectionClosed {
                username,
                duration_secs,
                ..
            } => {
                info!(
                    event = "connection_closed",
                    username = ?username,
                    duration_secs,
                    audit = ?self,
                    "Connection closed"
                );
            }
            AuditEvent::AuthAttempt {
                username,
                success,
                reason,
                ..
            } => {
                if *success {
                    info!(
                        event = "auth_success",
                        username,
                        audit = ?self,
                        "Authentication successful"
                    );
                } else {
                    warn!(
                        event = "auth_failure",
                        username,
                        reason = ?reason,
                        audit = ?self,
                        "Authentication failed"
                    );
                }
            }
            AuditEvent::FileOperation {
                username,
                operation,
                key,
                success,
                bytes_transferred,
                error,
                ..
            } => {
                if *success {
                    info!(
                        event = "file_operation",
                        username = ?username,
                        operation,
                        key,
                        bytes = ?bytes_transferred,
                        audit = ?self,
                        "File operation completed"
                    );
                } else {
                    warn!(
                        event = "file_operation_failed",
                        username = ?username,
                        operation,
                        key,
                        error = ?error,
                        audit = ?self,
                        "File operation failed"
                    );
                }
            }
            AuditEvent::DirectoryOperation {
                username,
                operation,
                key,
                success,
                error,
                ..
            } => {
                if *success {
                    info!(
                        event = "directory_operation",
                        username = ?username,
                        operation,
                        key,
                        audit = ?self,
                        "Directory operation completed"
                    );
                } else {
                    warn!(
                        event = "directory_operation_failed",
                        username = ?username,
                        operation,
                        key,
                        error = ?error,
                        audit = ?self,
                        "Directory operation failed"
                    );
                }
            }
            AuditEvent::SecurityEvent {
                username,
                event,
                details,
                ..
            } => {
                warn!(
                    event = "security_event",
                    username = ?username,
                    security_event = event,
                    details,
                    audit = ?self,
                    "Security event detected"
                );
            }
        }
    }

    /// Export as JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Session information tracker
///
/// NIST 800-53: AU-3 (Content of Audit Records)
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Unique session identifier
    pub session_id: String,
    /// Client IP address
    pub client_ip: Option<IpAddr>,
    /// Authenticated username
    pub username: Option<String>,
    /// Session start time
    pub start_time: DateTime<Utc>,
}

impl SessionInfo {
    pub fn new(session_id: String, client_ip: Option<IpAddr>) -> Self {
        Self {
            session_id,
            client_ip,
            username: None,
            start_time: Utc::now(),
        }
    }

    /// Set username after authentication
    pub fn set_username(&mut self, username: String) {
        self.username = Some(username);
    }

    /// Get session duration in seconds
    pub fn duration_secs(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.start_time)
            .num_seconds()
    }
}

/// Helper functions for common audit events
pub struct AuditLogger;

impl AuditLogger {
    /// Log an object operation against the backend
    pub fn log_file_operation(
        client_ip: Option<IpAddr>,
        username: Option<String>,
        operation: &str,
        key: &str,
        bytes: Option<u64>,
        success: bool,
        error: Option<String>,
    ) {
        AuditEvent::FileOperation {
            client_ip,
            username,
            operation: operation.to_string(),
            key: key.to_string(),
            timestamp: Utc::now(),
            success,
            bytes_transferred: bytes,
            error,
        }
        .log();
    }

    /// Log a directory listing
    pub fn log_directory_operation(
        client_ip: Option<IpAddr>,
        username: Option<String>,
        operation: &str,
        key: &str,
        success: bool,
        error: Option<String>,
    ) {
        AuditEvent::DirectoryOperation {
            client_ip,
            username,
            operation: operation.to_string(),
            key: key.to_string(),
            timestamp: Utc::now(),
            success,
            error,
        }
        .log();
    }

    /// Log a security event
    pub fn log_security_event(
        client_ip: Option<IpAddr>,
        username: Option<String>,
        event: String,
        details: String,
    ) {
        AuditEvent::SecurityEvent {
            client_ip,
            username,
            event,
            details,
            timestamp: Utc::now(),
        }
        .log();
    }
}
