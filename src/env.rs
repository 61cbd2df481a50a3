//! Environment access behind a trait so configuration and secret resolution
//! can be exercised without touching the process environment.

use std::collections::HashMap;
use std::env::VarError;

/// Read-only view of environment variables.
pub trait ReadEnv: Send + Sync {
    fn var(&self, key: &str) -> Result<String, VarError>;

    /// Value of `key` if set and non-blank.
    fn non_empty(&self, key: &str) -> Option<String> {
        self.var(key).ok().filter(|v| !v.trim().is_empty())
    }

    /// Parse `key` as a boolean, returning `default` if unset.
    ///
    /// Recognises `1`, `true`, `yes`, `y`, `on` (case-insensitive) as `true`;
    /// any other set value is `false`.
    fn flag(&self, key: &str, default: bool) -> bool {
        match self.var(key) {
            Ok(value) => matches!(
                value.trim().to_lowercase().as_str(),
                "1" | "true" | "yes" | "y" | "on"
            ),
            Err(_) => default,
        }
    }
}

/// Zero-sized type, delegates to `std::env`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl ReadEnv for SystemEnv {
    #[inline]
    fn var(&self, key: &str) -> Result<String, VarError> {
        std::env::var(key)
    }
}

/// Fixed set of variables, used by tests and embedders.
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }
}

impl ReadEnv for MapEnv {
    fn var(&self, key: &str) -> Result<String, VarError> {
        self.vars.get(key).cloned().ok_or(VarError::NotPresent)
    }
}
