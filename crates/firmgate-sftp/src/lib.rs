//! # Firmgate SFTP
//!
//! SFTP-to-object-storage bridge for firmware distribution.
//!
//! Speaks SFTP version 3 (draft-ietf-secsh-filexfer-02) over SSH to
//! ordinary clients and translates every filesystem request into calls
//! against a flat object store. Directories are synthesized from common
//! key prefixes; accounts come from the dashboard's credential store and
//! carry a role (`admin` or `downloader`) plus a per-model allow-list
//! that scopes what each account can see and touch.

pub mod access;
pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod handles;
pub mod listing;
pub mod paths;
pub mod protocol;
pub mod server;
pub mod session;

pub use auth::Authenticator;
pub use config::{Config, LogFormat};
pub use error::{Error, Result};
pub use server::Server;
pub use session::SftpSession;
