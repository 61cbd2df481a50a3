//! Secret resolution.
//!
//! Logical secrets (the session signing key, the news API key) are resolved
//! through an ordered chain of strategies backed by a Vault KV v2 store.
//!
//! ## Resolution order
//!
//! 1. Explicit environment override (`SIGNING_KEY_OVERRIDE`, `NEWS_API_KEY_OVERRIDE`)
//! 2. Secret store, authenticated with `VAULT_TOKEN` or the mounted workload identity token
//! 3. Plain environment fallback (`NEWS_API_KEY`), development only
//! 4. Placeholder value, development only
//!
//! In production an exhausted chain is a [`SecretError::Configuration`].
//!
//! ## Usage
//!
//! ```ignore
//! let store = Arc::new(VaultClient::new(&config.vault)?);
//! let resolver = SecretResolver::from_config(&config, store, Arc::new(SystemEnv));
//! let key = resolver.resolve(&NEWS_API_KEY).await?;
//! ```

mod chain;
mod store;
mod types;
mod vault;

pub use chain::{
    Attempt, EnvFallback, EnvOverride, Placeholder, SecretResolver, SecretStrategy, StoreLookup,
};
pub use store::{SecretStore, StoreCredential, StoreError, StoreSession};
pub use types::*;
pub use vault::VaultClient;
