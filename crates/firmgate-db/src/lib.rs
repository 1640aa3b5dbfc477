//! Credential store access for the SFTP bridge.
//!
//! This crate is a read-only consumer of the `sftp_users` table maintained
//! by the admin dashboard. Schema management lives with the dashboard; the
//! bridge only ever selects rows.

use firmgate_core::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::debug;

/// One row of the `sftp_users` table, as stored.
///
/// `role` is kept as the raw string here; parsing it into a typed
/// [`firmgate_core::Role`] happens at authentication time so an unknown
/// role is rejected rather than silently mapped.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SftpUserRecord {
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub enabled: bool,
    pub allowed_models: Option<Vec<String>>,
}

impl SftpUserRecord {
    /// Allow-list with the NULL-column case collapsed to "all models".
    pub fn allowed_models(&self) -> Vec<String> {
        self.allowed_models.clone().unwrap_or_default()
    }
}

pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool, e.g. one shared with other services.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Look up one SFTP account by username.
    ///
    /// Returns `Ok(None)` when the account does not exist; the caller is
    /// responsible for keeping that outcome indistinguishable from a bad
    /// password at the client boundary.
    pub async fn get_sftp_user(&self, username: &str) -> Result<Option<SftpUserRecord>> {
        debug!(username, "Looking up SFTP account");

        let row = sqlx::query_as::<_, SftpUserRecord>(
            r#"
            SELECT username, password AS password_hash, role, enabled, allowed_models
            FROM sftp_users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}
