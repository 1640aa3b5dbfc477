//! Configuration for the SFTP bridge

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// SFTP bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Server port (default: 2222 for non-privileged, 22 for SSH standard)
    #[serde(default = "default_port")]
    pub port: u16,

    /// SSH host key path (Ed25519, PEM). Generated and persisted on
    /// first start if missing.
    #[serde(default = "default_host_key_path")]
    pub host_key_path: PathBuf,

    /// Connection inactivity timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Per-backend-call time budget in seconds
    #[serde(default = "default_op_timeout")]
    pub op_timeout_secs: u64,

    /// Largest object the bridge will buffer for a read or write, in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,

    /// Maximum open handles per session
    #[serde(default = "default_max_handles")]
    pub max_handles: usize,

    /// PostgreSQL connection URL for the credential store.
    /// Overridden by the DATABASE_URL environment variable when set.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Object store backend
    #[serde(default)]
    pub s3: S3Section,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Object store backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Section {
    /// Region name
    pub region: String,
    /// Bucket holding the firmware namespace
    pub bucket: String,
    /// Custom endpoint URL (MinIO, localstack); AWS default when unset
    pub endpoint: Option<String>,
    /// Path-style addressing, required by most custom endpoints
    pub force_path_style: bool,
}

impl Default for S3Section {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            bucket: "firmware-distribution".to_string(),
            endpoint: None,
            force_path_style: false,
        }
    }
}

/// Logging configuration
///
/// NIST 800-53: AU-2 (Audit Events), AU-12 (Audit Generation)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (text or json)
    pub format: LogFormat,
    /// Optional log file path (logs to stderr if not specified)
    pub file: Option<PathBuf>,
    /// Enable structured audit logging for SIEM integration
    pub audit_enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            file: None,
            audit_enabled: true,
        }
    }
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Plain text logging for human readability
    Text,
    /// JSON structured logging for SIEM integration
    Json,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            host_key_path: default_host_key_path(),
            timeout: default_timeout(),
            op_timeout_secs: default_op_timeout(),
            max_file_size: default_max_file_size(),
            max_handles: default_max_handles(),
            database_url: None,
            s3: S3Section::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {e}")))
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.s3.bucket.is_empty() {
            return Err(crate::Error::Config("s3.bucket must not be empty".into()));
        }

        if self.max_file_size == 0 {
            return Err(crate::Error::Config(
                "max_file_size must be positive".into(),
            ));
        }

        if self.max_handles == 0 {
            return Err(crate::Error::Config("max_handles must be positive".into()));
        }

        if self.database_url().is_none() {
            return Err(crate::Error::Config(
                "database_url missing (set it in the config file or DATABASE_URL)".into(),
            ));
        }

        Ok(())
    }

    /// Credential store URL, environment taking precedence over the file.
    pub fn database_url(&self) -> Option<String> {
        std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.is_empty())
            .or_else(|| self.database_url.clone())
    }

    /// Backend call budget as a [`Duration`].
    pub fn op_timeout(&self) -> Duration {
        Duration::from_secs(self.op_timeout_secs)
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    2222 // Non-privileged port
}

fn default_host_key_path() -> PathBuf {
    PathBuf::from("/var/lib/firmgate/host_ed25519.pem")
}

fn default_timeout() -> u64 {
    300 // 5 minutes
}

fn default_op_timeout() -> u64 {
    30
}

fn default_max_file_size() -> usize {
    512 * 1024 * 1024 // 512 MiB; firmware images are buffered whole
}

fn default_max_handles() -> usize {
    1024
}
