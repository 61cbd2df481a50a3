//! Secret descriptors, resolved values and errors.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Describes where a logical secret lives and how it may be substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretSpec {
    /// Logical name, also the cache key
    pub name: &'static str,
    /// Path within the KV mount
    pub path: &'static str,
    /// Key within the secret at `path`
    pub key: &'static str,
    /// Environment variable that short-circuits resolution entirely
    pub override_env: Option<&'static str>,
    /// Environment variable consulted after the store, outside production only
    pub fallback_env: Option<&'static str>,
    /// Value returned outside production when the store could not be authenticated
    pub placeholder: &'static str,
}

/// Process-wide signing key for sessions.
pub const SIGNING_KEY: SecretSpec = SecretSpec {
    name: "signing_key",
    path: "DJANGO_SECRET_KEY",
    key: "DJANGO_SECRET_KEY",
    override_env: Some("SIGNING_KEY_OVERRIDE"),
    fallback_env: None,
    placeholder: "django-insecure-dev-fallback",
};

/// Key for the upstream news API.
pub const NEWS_API_KEY: SecretSpec = SecretSpec {
    name: "news_api_key",
    path: "newsapi",
    key: "API_KEY",
    override_env: Some("NEWS_API_KEY_OVERRIDE"),
    fallback_env: Some("NEWS_API_KEY"),
    placeholder: "dev-fallback-key",
};

/// Where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SecretSource {
    Override,
    Store,
    Fallback,
    Placeholder { reason: String },
}

impl SecretSource {
    /// Whether the value may be reused until explicitly invalidated.
    pub fn is_cacheable(&self) -> bool {
        matches!(self, SecretSource::Override | SecretSource::Store)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SecretSource::Override => "override",
            SecretSource::Store => "store",
            SecretSource::Fallback => "fallback",
            SecretSource::Placeholder { .. } => "placeholder",
        }
    }
}

/// A secret value with its provenance.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    pub name: &'static str,
    pub value: String,
    pub source: SecretSource,
    pub resolved_at: DateTime<Utc>,
}

impl ResolvedSecret {
    pub fn new(spec: &SecretSpec, value: String, source: SecretSource) -> Self {
        Self {
            name: spec.name,
            value,
            source,
            resolved_at: Utc::now(),
        }
    }

    pub fn expose(&self) -> &str {
        &self.value
    }
}

// Never print the value.
impl std::fmt::Debug for ResolvedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecret")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("resolved_at", &self.resolved_at)
            .finish()
    }
}

/// Why a single strategy could not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyFailure {
    /// Neither a static token nor a workload identity token was available.
    #[error("secret store authentication unavailable: {0}")]
    AuthUnavailable(String),

    /// The identity exchange with the store was refused or errored.
    #[error("secret store authentication failed: {0}")]
    AuthFailed(String),

    /// Authenticated, but reading the secret failed.
    #[error("could not fetch {key} from path {path}: {cause}")]
    FetchFailed {
        path: String,
        key: String,
        cause: String,
    },
}

impl StrategyFailure {
    pub fn is_fetch(&self) -> bool {
        matches!(self, StrategyFailure::FetchFailed { .. })
    }
}

#[derive(Debug, Error)]
pub enum SecretError {
    /// No value could be produced and the process runs in production mode.
    #[error("secret {name} could not be resolved: {}", format_causes(.causes))]
    Configuration {
        name: &'static str,
        causes: Vec<StrategyFailure>,
    },
}

fn format_causes(causes: &[StrategyFailure]) -> String {
    if causes.is_empty() {
        return "no strategy produced a value".to_string();
    }
    causes
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
