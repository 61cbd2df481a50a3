//! Configuration management for newstrends.
//!
//! Configuration is read from environment variables:
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `8000`.
//! - `DEBUG` - Optional. Development mode; secrets fail open with placeholders. Defaults to `false`.
//! - `DATABASE_PATH` - Optional. SQLite database file. Defaults to `db.sqlite3`.
//! - `VAULT_ADDR` - Optional. Secret store address. Defaults to `https://vault.demo.internal:8200`.
//! - `VAULT_TOKEN` - Optional. Static secret store token; skips workload identity login.
//! - `VAULT_ROLE` - Optional. Role for workload identity login. Defaults to `newstrends-role`.
//! - `VAULT_MOUNT` - Optional. KV v2 mount point. Defaults to `kv`.
//! - `VAULT_IDENTITY_TOKEN_PATH` - Optional. Workload identity token file.
//! - `VAULT_SKIP_VERIFY` - Optional. Accept self-signed store certificates. Defaults to `false`.
//! - `NEWS_API_BASE_URL` - Optional. Defaults to `https://newsapi.org/v2`.
//! - `NEWS_API_COUNTRY` - Optional. Defaults to `us`.
//! - `SESSION_TTL_HOURS` - Optional. Session cookie lifetime. Defaults to `24`.
//! - `CORS_ALLOWED_ORIGINS` - Optional. Comma separated. Defaults to `http://localhost:8000`.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::env::{ReadEnv, SystemEnv};

/// Default workload identity token mounted into Kubernetes pods.
pub const DEFAULT_IDENTITY_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Secret store connection settings.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Base address, without a trailing slash
    pub addr: String,

    /// Static access token, used instead of workload identity when present
    pub token: Option<String>,

    /// Role presented during workload identity login
    pub role: String,

    /// KV v2 mount point
    pub mount: String,

    /// Locally mounted workload identity token
    pub identity_token_path: PathBuf,

    /// Accept invalid TLS certificates. Only for self-signed development stores.
    pub skip_tls_verify: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            addr: "https://vault.demo.internal:8200".to_string(),
            token: None,
            role: "newstrends-role".to_string(),
            mount: "kv".to_string(),
            identity_token_path: PathBuf::from(DEFAULT_IDENTITY_TOKEN_PATH),
            skip_tls_verify: false,
        }
    }
}

/// Upstream news API settings.
#[derive(Debug, Clone)]
pub struct NewsConfig {
    pub base_url: String,
    pub country: String,
    pub timeout: Duration,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://newsapi.org/v2".to_string(),
            country: "us".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Development mode. Production (false) fails closed on missing secrets.
    pub debug: bool,

    /// SQLite database file
    pub database_path: PathBuf,

    pub vault: VaultConfig,

    pub news: NewsConfig,

    /// Session cookie lifetime in hours
    pub session_ttl_hours: i64,

    /// Origins allowed by the CORS layer
    pub cors_allowed_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            debug: false,
            database_path: PathBuf::from("db.sqlite3"),
            vault: VaultConfig::default(),
            news: NewsConfig::default(),
            session_ttl_hours: 24,
            cors_allowed_origins: vec!["http://localhost:8000".to_string()],
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_read_env(&SystemEnv)
    }

    /// Load configuration from an arbitrary environment source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if `PORT` or `SESSION_TTL_HOURS` do not parse,
    /// or if `CORS_ALLOWED_ORIGINS` contains `*`.
    pub fn from_read_env(env: &dyn ReadEnv) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let host = env.non_empty("HOST").unwrap_or(defaults.host);

        let port = match env.non_empty("PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| ConfigError::InvalidValue("PORT".to_string(), format!("{}", e)))?,
            None => defaults.port,
        };

        let session_ttl_hours = match env.non_empty("SESSION_TTL_HOURS") {
            Some(raw) => {
                let hours: i64 = raw.trim().parse().map_err(|e| {
                    ConfigError::InvalidValue("SESSION_TTL_HOURS".to_string(), format!("{}", e))
                })?;
                if hours <= 0 {
                    return Err(ConfigError::InvalidValue(
                        "SESSION_TTL_HOURS".to_string(),
                        "must be positive".to_string(),
                    ));
                }
                hours
            }
            None => defaults.session_ttl_hours,
        };

        let vault_defaults = VaultConfig::default();
        let vault = VaultConfig {
            addr: env
                .non_empty("VAULT_ADDR")
                .map(|addr| addr.trim_end_matches('/').to_string())
                .unwrap_or(vault_defaults.addr),
            token: env.non_empty("VAULT_TOKEN"),
            role: env.non_empty("VAULT_ROLE").unwrap_or(vault_defaults.role),
            mount: env.non_empty("VAULT_MOUNT").unwrap_or(vault_defaults.mount),
            identity_token_path: env
                .non_empty("VAULT_IDENTITY_TOKEN_PATH")
                .map(PathBuf::from)
                .unwrap_or(vault_defaults.identity_token_path),
            skip_tls_verify: env.flag("VAULT_SKIP_VERIFY", false),
        };

        let news_defaults = NewsConfig::default();
        let news = NewsConfig {
            base_url: env
                .non_empty("NEWS_API_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(news_defaults.base_url),
            country: env.non_empty("NEWS_API_COUNTRY").unwrap_or(news_defaults.country),
            timeout: news_defaults.timeout,
        };

        let cors_allowed_origins = match env.non_empty("CORS_ALLOWED_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            None => defaults.cors_allowed_origins,
        };
        // The CORS layer sends credentials, which rules out a wildcard origin.
        if cors_allowed_origins.iter().any(|o| o == "*") {
            return Err(ConfigError::InvalidValue(
                "CORS_ALLOWED_ORIGINS".to_string(),
                "wildcard not allowed with credentials".to_string(),
            ));
        }

        Ok(Self {
            host,
            port,
            debug: env.flag("DEBUG", false),
            database_path: env
                .non_empty("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            vault,
            news,
            session_ttl_hours,
            cors_allowed_origins,
        })
    }

    /// Production-like mode: secrets fail closed.
    pub fn is_production(&self) -> bool {
        !self.debug
    }
}
