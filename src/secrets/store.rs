//! Secret store abstraction.
//!
//! The resolver only needs two capabilities from a store: turning a credential
//! into a session, and reading one key of one secret with that session.

use async_trait::async_trait;
use thiserror::Error;

/// Credential presented to the store.
#[derive(Clone, PartialEq, Eq)]
pub enum StoreCredential {
    /// Pre-issued access token. Used as the session directly.
    StaticToken(String),
    /// Workload identity JWT exchanged for a session under `role`.
    WorkloadIdentity { role: String, jwt: String },
}

impl std::fmt::Debug for StoreCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreCredential::StaticToken(_) => f.write_str("StaticToken([REDACTED])"),
            StoreCredential::WorkloadIdentity { role, .. } => f
                .debug_struct("WorkloadIdentity")
                .field("role", role)
                .field("jwt", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Authenticated store session token.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreSession(String);

impl StoreSession {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for StoreSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StoreSession([REDACTED])")
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("secret store API error ({status}): {}", .errors.join(", "))]
    Api { status: u16, errors: Vec<String> },

    #[error("secret store auth error: {0}")]
    Auth(String),

    #[error("key {key} not present at {path}")]
    MissingKey { path: String, key: String },

    #[error("unexpected secret store response: {0}")]
    Deserialize(String),
}

impl StoreError {
    /// The session was rejected and a fresh login may succeed.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, StoreError::Api { status: 403, .. })
    }
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Exchange a credential for a session.
    async fn authenticate(&self, credential: &StoreCredential) -> Result<StoreSession, StoreError>;

    /// Read `key` from the secret stored at `path`.
    async fn read(&self, session: &StoreSession, path: &str, key: &str)
        -> Result<String, StoreError>;
}
