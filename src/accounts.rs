//! Account registration and credential checks.
//!
//! Passwords are stored as `pbkdf2:iterations:hex_salt:hex_hash` using
//! PBKDF2-HMAC-SHA256.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use hmac::Hmac;
use rand::RngCore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::db::{Database, DbError, User};
use crate::util::constant_time_eq;

const PBKDF2_ITERATIONS: u32 = 260_000;
const SALT_LENGTH: usize = 16;
const HASH_LENGTH: usize = 32;
const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_USERNAME_LENGTH: usize = 150;

/// Checked when the username is unknown so both paths pay for one full derivation.
const DUMMY_HASH: &str = "pbkdf2:260000:00000000000000000000000000000000:\
0000000000000000000000000000000000000000000000000000000000000000";

const COMMON_PASSWORDS: &[&str] = &[
    "password", "password1", "password123", "12345678", "123456789", "1234567890", "qwerty123",
    "qwertyuiop", "iloveyou", "letmein1", "sunshine", "princess", "football", "baseball",
    "welcome1", "admin123", "trustno1", "passw0rd", "abc12345", "11111111",
];

/// Validation messages keyed by field name.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Error creating account.")]
    DuplicateAccount,

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Invalid registration data")]
    Invalid(FieldErrors),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

/// Registration input shared by the HTML form and the JSON API.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Registration {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

fn username_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[\w.@+-]+$").expect("static regex"))
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static regex")
    })
}

fn push(errors: &mut FieldErrors, field: &str, message: &str) {
    errors
        .entry(field.to_string())
        .or_default()
        .push(message.to_string());
}

/// Password strength rules. Returns every violated rule.
pub fn password_problems(password: &str, username: &str) -> Vec<String> {
    let mut problems = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        problems.push(format!(
            "This password is too short. It must contain at least {} characters.",
            MIN_PASSWORD_LENGTH
        ));
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        problems.push("This password is entirely numeric.".to_string());
    }
    if COMMON_PASSWORDS.contains(&password.to_lowercase().as_str()) {
        problems.push("This password is too common.".to_string());
    }
    let lowered = password.to_lowercase();
    let user = username.trim().to_lowercase();
    if user.len() >= 3 && (lowered.contains(&user) || user.contains(&lowered)) {
        problems.push("The password is too similar to the username.".to_string());
    }
    problems
}

/// Validate registration input.
pub fn validate(registration: &Registration) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    let username = registration.username.trim();

    if username.is_empty() {
        push(&mut errors, "username", "This field is required.");
    } else if username.chars().count() > MAX_USERNAME_LENGTH {
        push(
            &mut errors,
            "username",
            "Ensure this field has no more than 150 characters.",
        );
    } else if !username_pattern().is_match(username) {
        push(
            &mut errors,
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        );
    }

    let email = registration.email.trim();
    if !email.is_empty() && !email_pattern().is_match(email) {
        push(&mut errors, "email", "Enter a valid email address.");
    }

    if registration.password.is_empty() {
        push(&mut errors, "password", "This field is required.");
    } else {
        for problem in password_problems(&registration.password, username) {
            push(&mut errors, "password", &problem);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> Result<[u8; HASH_LENGTH], AccountError> {
    let mut out = [0u8; HASH_LENGTH];
    pbkdf2::pbkdf2::<Hmac<Sha256>>(password.as_bytes(), salt, iterations, &mut out)
        .map_err(|e| AccountError::Hashing(e.to_string()))?;
    Ok(out)
}

/// Hash a password into the stored `pbkdf2:` format.
pub fn hash_password(password: &str) -> Result<String, AccountError> {
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    let hash = derive(password, &salt, PBKDF2_ITERATIONS)?;
    Ok(format!(
        "pbkdf2:{}:{}:{}",
        PBKDF2_ITERATIONS,
        hex::encode(salt),
        hex::encode(hash)
    ))
}

/// Check a password against a stored hash. Malformed hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let parts: Vec<&str> = stored.split(':').collect();
    let [scheme, iterations, salt, expected] = parts.as_slice() else {
        return false;
    };
    if *scheme != "pbkdf2" {
        return false;
    }
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    let Ok(salt) = hex::decode(salt) else {
        return false;
    };
    match derive(password, &salt, iterations) {
        Ok(actual) => constant_time_eq(&hex::encode(actual), expected),
        Err(_) => false,
    }
}

/// Create an account after validation.
pub async fn register(db: &Database, registration: &Registration) -> Result<User, AccountError> {
    validate(registration).map_err(AccountError::Invalid)?;

    let password = registration.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AccountError::Hashing(e.to_string()))??;

    match db
        .create_user(
            registration.username.trim(),
            registration.email.trim(),
            &password_hash,
        )
        .await
    {
        Ok(user) => {
            tracing::info!("Registered user {} (id {})", user.username, user.id);
            Ok(user)
        }
        Err(DbError::Conflict(_)) => Err(AccountError::DuplicateAccount),
        Err(e) => Err(e.into()),
    }
}

/// Verify a username/password pair.
pub async fn authenticate(
    db: &Database,
    username: &str,
    password: &str,
) -> Result<User, AccountError> {
    let user = db.find_user_by_username(username.trim()).await?;

    let password = password.to_string();
    let stored = user
        .as_ref()
        .map(|u| u.password_hash.clone())
        .unwrap_or_else(|| DUMMY_HASH.to_string());
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| AccountError::Hashing(e.to_string()))?;

    match user {
        Some(user) if valid => Ok(user),
        _ => Err(AccountError::InvalidCredentials),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(username: &str, password: &str) -> Registration {
        Registration {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password: password.to_string(),
        }
    }

    #[test]
    fn hash_roundtrip_and_format() {
        let stored = hash_password("correct horse battery").unwrap();
        assert!(stored.starts_with("pbkdf2:260000:"));
        assert!(verify_password("correct horse battery", &stored));
        assert!(!verify_password("wrong", &stored));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("x", ""));
        assert!(!verify_password("x", "md5:1:00:00"));
        assert!(!verify_password("x", "pbkdf2:abc:00:00"));
        assert!(!verify_password("x", "pbkdf2:1:zz:00"));
    }

    #[test]
    fn dummy_hash_is_full_cost_and_never_matches() {
        assert!(DUMMY_HASH.starts_with(&format!("pbkdf2:{}:", PBKDF2_ITERATIONS)));
        let parts: Vec<&str> = DUMMY_HASH.split(':').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(hex::decode(parts[2]).unwrap().len(), SALT_LENGTH);
        assert_eq!(hex::decode(parts[3]).unwrap().len(), HASH_LENGTH);
        assert!(!verify_password("", DUMMY_HASH));
        assert!(!verify_password("tr0ub4dor&3", DUMMY_HASH));
    }

    #[test]
    fn password_rules() {
        assert!(password_problems("tr0ub4dor&3", "alice").is_empty());
        assert!(!password_problems("short", "alice").is_empty());
        assert!(password_problems("1234567890123", "alice")
            .iter()
            .any(|p| p.contains("numeric")));
        assert!(password_problems("Password123", "alice")
            .iter()
            .any(|p| p.contains("common")));
        assert!(password_problems("alice-rocks-2024", "alice")
            .iter()
            .any(|p| p.contains("similar")));
    }

    #[test]
    fn validation_collects_field_errors() {
        let errors = validate(&Registration {
            username: "bad name!".to_string(),
            email: "not-an-email".to_string(),
            password: String::new(),
        })
        .unwrap_err();
        assert!(errors.contains_key("username"));
        assert!(errors.contains_key("email"));
        assert!(errors.contains_key("password"));

        assert!(validate(&registration("alice", "tr0ub4dor&3")).is_ok());
    }

    #[tokio::test]
    async fn register_then_authenticate() {
        let db = Database::open_in_memory().await.unwrap();
        let user = register(&db, &registration("alice", "tr0ub4dor&3"))
            .await
            .unwrap();

        let authed = authenticate(&db, "alice", "tr0ub4dor&3").await.unwrap();
        assert_eq!(authed.id, user.id);

        assert!(matches!(
            authenticate(&db, "alice", "nope").await,
            Err(AccountError::InvalidCredentials)
        ));
        assert!(matches!(
            authenticate(&db, "mallory", "tr0ub4dor&3").await,
            Err(AccountError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn duplicate_registration_is_reported() {
        let db = Database::open_in_memory().await.unwrap();
        register(&db, &registration("bob", "tr0ub4dor&3"))
            .await
            .unwrap();

        assert!(matches!(
            register(&db, &registration("bob", "an0ther-Secret")).await,
            Err(AccountError::DuplicateAccount)
        ));
    }
}
