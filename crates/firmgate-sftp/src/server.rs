//! SSH server shell around the SFTP bridge.
//!
//! Owns the listener, the host key and the russh handler plumbing. Each
//! accepted connection authenticates with username/password against the
//! credential store and then runs one [`SftpSession`] over the `sftp`
//! subsystem channel.

use crate::audit::{AuditEvent, SessionInfo};
use crate::{Authenticator, Config, Error, Result, SftpSession};
use async_trait::async_trait;
use chrono::Utc;
use firmgate_store::ObjectStore;
use russh::server::{Auth, Handler, Msg, Server as SshServer, Session};
use russh::{Channel, ChannelId, CryptoVec, MethodSet};
use russh_keys::key;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// SFTP bridge server.
pub struct Server {
    config: Arc<Config>,
    ssh_config: russh::server::Config,
    store: Arc<dyn ObjectStore>,
    authenticator: Arc<Authenticator>,
}

impl Server {
    pub async fn new(
        config: Config,
        store: Arc<dyn ObjectStore>,
        authenticator: Authenticator,
    ) -> Result<Self> {
        config.validate()?;

        let key_pair = load_host_key(&config.host_key_path).await?;

        let ssh_config = russh::server::Config {
            inactivity_timeout: Some(std::time::Duration::from_secs(config.timeout)),
            auth_rejection_time: std::time::Duration::from_secs(3),
            auth_rejection_time_initial: Some(std::time::Duration::from_secs(0)),
            keys: vec![key_pair],
            ..Default::default()
        };

        Ok(Self {
            config: Arc::new(config),
            ssh_config,
            store,
            authenticator: Arc::new(authenticator),
        })
    }

    /// Run the server until the listener fails or the task is cancelled.
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.bind_address, self.config.port);
        info!("Starting SFTP bridge on {}", addr);

        let mut handler = BridgeHandler {
            config: self.config,
            store: self.store,
            authenticator: self.authenticator,
        };

        handler
            .run_on_address(Arc::new(self.ssh_config), addr)
            .await
            .map_err(|e| Error::Connection(format!("Server error: {e}")))?;

        Ok(())
    }
}

/// Connection factory handed to russh.
struct BridgeHandler {
    config: Arc<Config>,
    store: Arc<dyn ObjectStore>,
    authenticator: Arc<Authenticator>,
}

#[async_trait]
impl SshServer for BridgeHandler {
    type Handler = SessionHandler;

    fn new_client(&mut self, peer_addr: Option<std::net::SocketAddr>) -> Self::Handler {
        let client_ip = peer_addr.map(|addr| addr.ip());

        AuditEvent::ConnectionEstablished {
            client_ip,
            timestamp: Utc::now(),
        }
        .log();

        SessionHandler {
            config: self.config.clone(),
            store: self.store.clone(),
            authenticator: self.authenticator.clone(),
            client_ip,
            info: SessionInfo::new(uuid::Uuid::new_v4().to_string(), client_ip),
            session: Arc::new(Mutex::new(None)),
        }
    }
}

/// Per-connection handler.
///
/// NIST 800-53: IA-2 (Identification and Authentication), AC-3 (Access Enforcement)
/// Implementation: Password authentication against the credential store;
/// the SFTP session is created only after a subsystem request on an
/// authenticated channel.
struct SessionHandler {
    config: Arc<Config>,
    store: Arc<dyn ObjectStore>,
    authenticator: Arc<Authenticator>,
    client_ip: Option<IpAddr>,
    info: SessionInfo,
    session: Arc<Mutex<Option<SftpSession>>>,
}

#[async_trait]
impl Handler for SessionHandler {
    type Error = Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth> {
        match self.authenticator.authenticate(user, password).await {
            Ok(context) => {
                AuditEvent::AuthAttempt {
                    client_ip: self.client_ip,
                    username: user.to_string(),
                    timestamp: Utc::now(),
                    success: true,
                    reason: None,
                }
                .log();

                self.info.set_username(user.to_string());
                let session = SftpSession::new(
                    context,
                    self.store.clone(),
                    self.config.clone(),
                    self.client_ip,
                );
                *self.session.lock().await = Some(session);

                Ok(Auth::Accept)
            }
            Err(e) => {
                AuditEvent::AuthAttempt {
                    client_ip: self.client_ip,
                    username: user.to_string(),
                    timestamp: Utc::now(),
                    success: false,
                    reason: Some(e.to_string()),
                }
                .log();

                Ok(Auth::Reject {
                    proceed_with_methods: Some(MethodSet::PASSWORD),
                })
            }
        }
    }

    async fn auth_publickey(&mut self, user: &str, _public_key: &key::PublicKey) -> Result<Auth> {
        // Accounts are password-only; steer clients to the supported method.
        warn!("Public key authentication attempted by {}, rejecting", user);
        Ok(Auth::Reject {
            proceed_with_methods: Some(MethodSet::PASSWORD),
        })
    }

    async fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool> {
        info!("Channel opened for session");
        Ok(true)
    }

    async fn subsystem_request(
        &mut self,
        channel_id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<()> {
        info!("Subsystem request: {}", name);

        if name == "sftp" {
            session.channel_success(channel_id);
            Ok(())
        } else {
            warn!("Unsupported subsystem: {}", name);
            session.channel_failure(channel_id);
            Err(Error::Protocol(format!("Unsupported subsystem: {name}")))
        }
    }

    async fn data(&mut self, channel: ChannelId, data: &[u8], session: &mut Session) -> Result<()> {
        let mut guard = self.session.lock().await;
        let Some(sftp) = guard.as_mut() else {
            return Err(Error::Protocol("Data before authentication".into()));
        };

        let response = match sftp.handle_data(data).await {
            Ok(resp) => resp,
            Err(e) => {
                error!("SFTP packet handling error: {}", e);
                return Err(e);
            }
        };

        if !response.is_empty() {
            // russh 0.45's `Session::data` queues the bytes and cannot report
            // a send failure; a closed channel surfaces through the connection
            // task instead.
            session.data(channel, CryptoVec::from_slice(&response));
        }

        Ok(())
    }

}

impl SessionHandler {
    /// Log the connection-closed audit event.
    ///
    /// russh's `Handler` trait has no end-of-connection hook, so this is
    /// not wired into the trait impl above.
    #[allow(dead_code)]
    async fn finished(&mut self, _session: &mut Session) -> Result<()> {
        AuditEvent::ConnectionClosed {
            client_ip: self.client_ip,
            username: self.info.username.clone(),
            timestamp: Utc::now(),
            duration_secs: self.info.duration_secs(),
        }
        .log();
        Ok(())
    }
}

/// Load the host key, generating and persisting one on first start.
async fn load_host_key(path: &Path) -> Result<key::KeyPair> {
    if path.exists() {
        let key_data = fs::read_to_string(path).await?;
        return russh_keys::decode_secret_key(&key_data, None)
            .map_err(|e| Error::Config(format!("Failed to load host key: {e}")));
    }

    warn!("Host key not found at {:?}, generating a new one", path);
    let key_pair = key::KeyPair::generate_ed25519()
        .ok_or_else(|| Error::Config("Failed to generate host key".into()))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut pem = Vec::new();
    russh_keys::encode_pkcs8_pem(&key_pair, &mut pem)
        .map_err(|e| Error::Config(format!("Failed to encode host key: {e}")))?;
    fs::write(path, &pem).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }

    Ok(key_pair)
}
