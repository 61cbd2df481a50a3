//! # NewsTrends
//!
//! News aggregator web service: top headlines from newsapi.org, account
//! registration, a subscription toggle, and advertisements.
//!
//! ## Secrets
//!
//! The session signing key and the news API key come from a Vault KV v2
//! store, with environment overrides and development fallbacks:
//!
//! ```text
//!   override env ──▶ Vault (token or workload identity) ──▶ fallback env ──▶ placeholder
//!                                                          └──── development only ────┘
//! ```
//!
//! ## Modules
//! - `api`: axum router, request gate, page and JSON handlers
//! - `secrets`: secret resolver chain and the Vault client
//! - `accounts`: registration, password hashing and validation
//! - `db`: SQLite storage for users, tokens, subscriptions and ads
//! - `news`: newsapi.org client
//! - `config`, `env`: environment-driven configuration

pub mod accounts;
pub mod api;
pub mod config;
pub mod db;
pub mod env;
pub mod news;
pub mod secrets;
pub mod util;

pub use config::Config;
