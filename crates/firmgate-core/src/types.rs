use serde::{Deserialize, Serialize};

/// Access role of an SFTP account.
///
/// Role strings come from the credential store; anything outside the two
/// known values fails to parse, so an account with a mangled role can never
/// be admitted with partial permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full access: read, write and delete.
    Admin,
    /// Read-only access.
    Downloader,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Downloader => "downloader",
        }
    }

    pub fn can_read(&self) -> bool {
        matches!(self, Role::Admin | Role::Downloader)
    }

    pub fn can_write(&self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn can_delete(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = crate::FirmgateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "downloader" => Ok(Role::Downloader),
            other => Err(crate::FirmgateError::UnknownRole(other.to_string())),
        }
    }
}

/// Authenticated identity bound to one SFTP connection.
///
/// Created once after a successful password exchange and immutable for the
/// life of the session. An empty `allowed_models` list is the deliberate
/// sentinel for "every model is permitted".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub username: String,
    pub role: Role,
    pub allowed_models: Vec<String>,
}

impl UserContext {
    pub fn new(username: impl Into<String>, role: Role, allowed_models: Vec<String>) -> Self {
        Self {
            username: username.into(),
            role,
            allowed_models,
        }
    }

    /// True when the account is not restricted to specific models.
    pub fn permits_all_models(&self) -> bool {
        self.allowed_models.is_empty()
    }

    /// True when the account may touch the given model directory.
    pub fn allows_model(&self, model: &str) -> bool {
        self.permits_all_models() || self.allowed_models.iter().any(|m| m == model)
    }
}
