//! Ordered fallback chain for secret resolution.
//!
//! ```text
//! EnvOverride ─▶ StoreLookup ─▶ EnvFallback* ─▶ Placeholder* ─▶ ConfigurationError
//!                                   (* non-production only)
//! ```
//!
//! The first strategy that produces a value wins. Failures are collected and
//! handed to later strategies so a placeholder can say why it was used.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use super::store::{SecretStore, StoreCredential, StoreSession};
use super::types::{ResolvedSecret, SecretError, SecretSource, SecretSpec, StrategyFailure};
use crate::config::Config;
use crate::env::ReadEnv;

/// Outcome of a single strategy.
#[derive(Debug)]
pub enum Attempt {
    Resolved(ResolvedSecret),
    /// Not applicable to this secret; try the next strategy.
    Skipped,
    Failed(StrategyFailure),
}

#[async_trait]
pub trait SecretStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn attempt(&self, spec: &SecretSpec, failures: &[StrategyFailure]) -> Attempt;
}

/// Explicit per-secret environment override.
pub struct EnvOverride {
    env: Arc<dyn ReadEnv>,
}

impl EnvOverride {
    pub fn new(env: Arc<dyn ReadEnv>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl SecretStrategy for EnvOverride {
    fn name(&self) -> &'static str {
        "env_override"
    }

    async fn attempt(&self, spec: &SecretSpec, _failures: &[StrategyFailure]) -> Attempt {
        match spec.override_env.and_then(|var| self.env.non_empty(var)) {
            Some(value) => Attempt::Resolved(ResolvedSecret::new(spec, value, SecretSource::Override)),
            None => Attempt::Skipped,
        }
    }
}

/// Authenticated lookup in the secret store.
///
/// The session is established lazily on first use and reused until the store
/// rejects it.
pub struct StoreLookup {
    store: Arc<dyn SecretStore>,
    static_token: Option<String>,
    role: String,
    identity_token_path: PathBuf,
    session: Mutex<Option<StoreSession>>,
}

impl StoreLookup {
    pub fn new(
        store: Arc<dyn SecretStore>,
        static_token: Option<String>,
        role: impl Into<String>,
        identity_token_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            static_token,
            role: role.into(),
            identity_token_path: identity_token_path.into(),
            session: Mutex::new(None),
        }
    }

    async fn credential(&self) -> Result<StoreCredential, StrategyFailure> {
        if let Some(token) = &self.static_token {
            return Ok(StoreCredential::StaticToken(token.clone()));
        }

        let jwt = tokio::fs::read_to_string(&self.identity_token_path)
            .await
            .map_err(|e| {
                StrategyFailure::AuthUnavailable(format!(
                    "no static token and identity token {} unreadable: {}",
                    self.identity_token_path.display(),
                    e
                ))
            })?;
        if jwt.trim().is_empty() {
            return Err(StrategyFailure::AuthUnavailable(format!(
                "identity token {} is empty",
                self.identity_token_path.display()
            )));
        }

        Ok(StoreCredential::WorkloadIdentity {
            role: self.role.clone(),
            jwt,
        })
    }

    async fn session(&self) -> Result<StoreSession, StrategyFailure> {
        let mut cached = self.session.lock().await;
        if let Some(session) = cached.as_ref() {
            return Ok(session.clone());
        }

        let credential = self.credential().await?;
        let session = self
            .store
            .authenticate(&credential)
            .await
            .map_err(|e| StrategyFailure::AuthFailed(e.to_string()))?;
        tracing::debug!("Authenticated to secret store with {:?}", credential);
        *cached = Some(session.clone());
        Ok(session)
    }
}

#[async_trait]
impl SecretStrategy for StoreLookup {
    fn name(&self) -> &'static str {
        "store"
    }

    async fn attempt(&self, spec: &SecretSpec, _failures: &[StrategyFailure]) -> Attempt {
        let session = match self.session().await {
            Ok(session) => session,
            Err(failure) => return Attempt::Failed(failure),
        };

        match self.store.read(&session, spec.path, spec.key).await {
            Ok(value) => Attempt::Resolved(ResolvedSecret::new(spec, value, SecretSource::Store)),
            Err(e) => {
                if e.is_permission_denied() {
                    // Force a fresh login next time.
                    *self.session.lock().await = None;
                }
                Attempt::Failed(StrategyFailure::FetchFailed {
                    path: spec.path.to_string(),
                    key: spec.key.to_string(),
                    cause: e.to_string(),
                })
            }
        }
    }
}

/// Plain environment variable, consulted when the store could not be reached
/// or authenticated.
pub struct EnvFallback {
    env: Arc<dyn ReadEnv>,
}

impl EnvFallback {
    pub fn new(env: Arc<dyn ReadEnv>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl SecretStrategy for EnvFallback {
    fn name(&self) -> &'static str {
        "env_fallback"
    }

    async fn attempt(&self, spec: &SecretSpec, failures: &[StrategyFailure]) -> Attempt {
        // A store that authenticated but could not serve the key is reported
        // through the placeholder rather than masked by the plain variable.
        if failures.iter().any(StrategyFailure::is_fetch) {
            return Attempt::Skipped;
        }
        match spec.fallback_env.and_then(|var| self.env.non_empty(var)) {
            Some(value) => Attempt::Resolved(ResolvedSecret::new(spec, value, SecretSource::Fallback)),
            None => Attempt::Skipped,
        }
    }
}

/// Fixed development value. Always resolves.
pub struct Placeholder;

#[async_trait]
impl SecretStrategy for Placeholder {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    async fn attempt(&self, spec: &SecretSpec, failures: &[StrategyFailure]) -> Attempt {
        let (value, reason) = match failures.iter().find(|f| f.is_fetch()) {
            Some(fetch) => (format!("fallback-{}", spec.key), fetch.to_string()),
            None => (
                spec.placeholder.to_string(),
                failures
                    .last()
                    .map(|f| f.to_string())
                    .unwrap_or_else(|| "no strategy produced a value".to_string()),
            ),
        };
        Attempt::Resolved(ResolvedSecret::new(
            spec,
            value,
            SecretSource::Placeholder { reason },
        ))
    }
}

/// Resolves logical secrets through a strategy chain, caching durable results.
pub struct SecretResolver {
    chain: Vec<Box<dyn SecretStrategy>>,
    production: bool,
    cache: RwLock<HashMap<&'static str, ResolvedSecret>>,
}

impl SecretResolver {
    pub fn new(chain: Vec<Box<dyn SecretStrategy>>, production: bool) -> Self {
        Self {
            chain,
            production,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Build the standard chain for the configured mode.
    pub fn from_config(config: &Config, store: Arc<dyn SecretStore>, env: Arc<dyn ReadEnv>) -> Self {
        let mut chain: Vec<Box<dyn SecretStrategy>> = vec![
            Box::new(EnvOverride::new(Arc::clone(&env))),
            Box::new(StoreLookup::new(
                store,
                config.vault.token.clone(),
                config.vault.role.clone(),
                config.vault.identity_token_path.clone(),
            )),
        ];
        if !config.is_production() {
            chain.push(Box::new(EnvFallback::new(env)));
            chain.push(Box::new(Placeholder));
        }
        Self::new(chain, config.is_production())
    }

    /// Resolve `spec`, returning a cached value when one exists.
    ///
    /// # Errors
    ///
    /// Returns `SecretError::Configuration` when every strategy failed or was
    /// skipped. Outside production the chain ends in [`Placeholder`], so this
    /// only happens in production, where fallback and placeholder values are
    /// never accepted whatever the chain contains.
    pub async fn resolve(&self, spec: &SecretSpec) -> Result<ResolvedSecret, SecretError> {
        if let Some(hit) = self.cache.read().await.get(spec.name) {
            return Ok(hit.clone());
        }

        let mut failures: Vec<StrategyFailure> = Vec::new();
        for strategy in &self.chain {
            match strategy.attempt(spec, &failures).await {
                Attempt::Resolved(secret) if self.production && !secret.source.is_cacheable() => {
                    tracing::warn!(
                        "Ignoring {} value for {} in production",
                        secret.source.label(),
                        spec.name
                    );
                    continue;
                }
                Attempt::Resolved(secret) => {
                    match &secret.source {
                        SecretSource::Placeholder { reason } => tracing::warn!(
                            "Secret {} using development placeholder ({})",
                            spec.name,
                            reason
                        ),
                        source => tracing::info!(
                            "Secret {} resolved via {}",
                            spec.name,
                            source.label()
                        ),
                    }
                    if secret.source.is_cacheable() {
                        self.cache.write().await.insert(spec.name, secret.clone());
                    }
                    return Ok(secret);
                }
                Attempt::Skipped => continue,
                Attempt::Failed(failure) => {
                    tracing::debug!(
                        "Strategy {} failed for {}: {}",
                        strategy.name(),
                        spec.name,
                        failure
                    );
                    failures.push(failure);
                }
            }
        }

        let err = SecretError::Configuration {
            name: spec.name,
            causes: failures,
        };
        tracing::error!("{}", err);
        Err(err)
    }

    /// Drop the cached value for `name`. Returns whether one was cached.
    pub async fn invalidate(&self, name: &str) -> bool {
        self.cache.write().await.remove(name).is_some()
    }
}
