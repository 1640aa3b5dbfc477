//! Password authentication against the dashboard credential store.
//!
//! NIST 800-53: IA-2 (Identification and Authentication), IA-5 (Authenticator Management)
//! Implementation: Argon2 PHC verification with a dummy hash for unknown
//! accounts so lookup misses and password mismatches take the same time.

use crate::{Error, Result};
use argon2::password_hash::{PasswordHash, PasswordHashString, PasswordVerifier, SaltString};
use argon2::{Argon2, PasswordHasher};
use firmgate_core::{Role, UserContext};
use firmgate_db::{Database, SftpUserRecord};
use password_hash::rand_core::OsRng;
use std::str::FromStr;

/// Verifies passwords and builds the per-session user context.
pub struct Authenticator {
    db: Database,
    dummy_hash: PasswordHashString,
}

impl Authenticator {
    /// Build an authenticator over the credential store.
    ///
    /// Hashes a throwaway password up front so failed lookups can burn
    /// the same verification cost as real accounts.
    pub fn new(db: Database) -> Result<Self> {
        let salt = SaltString::generate(&mut OsRng);
        let dummy_hash = Argon2::default()
            .hash_password(b"firmgate-equalizer", &salt)
            .map_err(|e| Error::Config(format!("dummy hash generation failed: {e}")))?
            .serialize();

        Ok(Self { db, dummy_hash })
    }

    /// Authenticate a username/password pair.
    ///
    /// Fail-closed: disabled accounts, unknown roles and malformed
    /// stored hashes all reject, and every rejection is reported to the
    /// client identically.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<UserContext> {
        let record = self
            .db
            .get_sftp_user(username)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        evaluate_credentials(username, password, record, self.dummy_hash.as_str())
    }
}

/// Decide a login from the looked-up record.
///
/// A missing record still verifies against the dummy hash so the
/// rejection takes as long as a real mismatch. The password check runs
/// before the enabled check so disabled accounts cost the same too.
pub(crate) fn evaluate_credentials(
    username: &str,
    password: &str,
    record: Option<SftpUserRecord>,
    dummy_hash: &str,
) -> Result<UserContext> {
    let Some(record) = record else {
        let _ = verify_hash(password, dummy_hash);
        return Err(Error::Authentication(format!("unknown user: {username}")));
    };

    if !verify_hash(password, &record.password_hash) {
        return Err(Error::Authentication(format!(
            "password mismatch for {username}"
        )));
    }

    if !record.enabled {
        return Err(Error::Authentication(format!("account disabled: {username}")));
    }

    build_context(&record)
}

/// Verify a password against a stored PHC string.
///
/// A hash that fails to parse counts as a mismatch.
pub(crate) fn verify_hash(password: &str, phc: &str) -> bool {
    PasswordHash::new(phc)
        .and_then(|hash| Argon2::default().verify_password(password.as_bytes(), &hash))
        .is_ok()
}

/// Map a credential record to the session's user context.
pub(crate) fn build_context(record: &SftpUserRecord) -> Result<UserContext> {
    let role = Role::from_str(&record.role).map_err(|e| {
        // Unknown role strings deny the login rather than defaulting.
        Error::Authentication(format!("{}: {e}", record.username))
    })?;

    Ok(UserContext {
        username: record.username.clone(),
        role,
        allowed_models: record.allowed_models(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(password: &str) -> String {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .unwrap()
            .to_string()
    }

    fn record(role: &str, enabled: bool, models: Option<Vec<&str>>) -> SftpUserRecord {
        SftpUserRecord {
            username: "dl1".into(),
            password_hash: hash("hunter2"),
            role: role.into(),
            enabled,
            allowed_models: models
                .map(|m| m.into_iter().map(str::to_string).collect()),
        }
    }

    #[test]
    fn verify_hash_accepts_matching_password() {
        let phc = hash("correct horse");
        assert!(verify_hash("correct horse", &phc));
        assert!(!verify_hash("wrong", &phc));
    }

    #[test]
    fn malformed_stored_hash_is_a_mismatch() {
        assert!(!verify_hash("anything", "not-a-phc-string"));
        assert!(!verify_hash("anything", ""));
    }

    #[test]
    fn context_carries_role_and_models() {
        let ctx = build_context(&record("downloader", true, Some(vec!["SS1406", "SS1416"])))
            .unwrap();
        assert_eq!(ctx.username, "dl1");
        assert_eq!(ctx.role, Role::Downloader);
        assert_eq!(ctx.allowed_models, vec!["SS1406", "SS1416"]);
        assert!(!ctx.permits_all_models());
    }

    #[test]
    fn null_allow_list_means_unrestricted() {
        let ctx = build_context(&record("admin", true, None)).unwrap();
        assert_eq!(ctx.role, Role::Admin);
        assert!(ctx.permits_all_models());
    }

    #[test]
    fn unknown_role_denies_login() {
        let err = build_context(&record("superuser", true, None)).unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[test]
    fn unknown_account_is_rejected() {
        let dummy = hash("firmgate-equalizer");
        let err = evaluate_credentials("ghost", "hunter2", None, &dummy).unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[test]
    fn disabled_account_rejects_even_with_correct_password() {
        let dummy = hash("firmgate-equalizer");
        let err = evaluate_credentials(
            "dl1",
            "hunter2",
            Some(record("downloader", false, None)),
            &dummy,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[test]
    fn enabled_account_with_correct_password_logs_in() {
        let dummy = hash("firmgate-equalizer");
        let ctx = evaluate_credentials(
            "dl1",
            "hunter2",
            Some(record("downloader", true, Some(vec!["SS1406"]))),
            &dummy,
        )
        .unwrap();
        assert_eq!(ctx.role, Role::Downloader);

        let err = evaluate_credentials(
            "dl1",
            "wrong",
            Some(record("downloader", true, None)),
            &dummy,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }
}
