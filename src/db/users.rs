use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use super::{now_string, Database, DbError};

/// A registered account.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub date_joined: String,
}

impl User {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            date_joined: row.get(4)?,
        })
    }
}

const USER_COLUMNS: &str = "id, username, email, password_hash, date_joined";

/// Length in bytes of generated API tokens (40 hex chars).
const TOKEN_BYTES: usize = 20;

impl Database {
    /// Insert a user. A taken username is reported as [`DbError::Conflict`].
    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, DbError> {
        let username = username.to_string();
        let email = email.to_string();
        let password_hash = password_hash.to_string();
        self.call(move |conn| {
            let date_joined = now_string();
            conn.execute(
                "INSERT INTO users (username, email, password_hash, date_joined)
                 VALUES (?1, ?2, ?3, ?4)",
                params![username, email, password_hash, date_joined],
            )
            .map_err(DbError::from_write)?;
            Ok(User {
                id: conn.last_insert_rowid(),
                username,
                email,
                password_hash,
                date_joined,
            })
        })
        .await
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, DbError> {
        let username = username.to_string();
        self.call(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS),
                    params![username],
                    User::from_row,
                )
                .optional()?)
        })
        .await
    }

    pub async fn find_user(&self, id: i64) -> Result<Option<User>, DbError> {
        self.call(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                    params![id],
                    User::from_row,
                )
                .optional()?)
        })
        .await
    }

    /// Return the user's API token, creating it on first use.
    pub async fn get_or_create_token(&self, user_id: i64) -> Result<String, DbError> {
        self.call(move |conn| {
            let candidate = hex::encode(rand::random::<[u8; TOKEN_BYTES]>());
            conn.execute(
                "INSERT OR IGNORE INTO auth_tokens (key, user_id, created_at) VALUES (?1, ?2, ?3)",
                params![candidate, user_id, now_string()],
            )
            .map_err(DbError::from_write)?;
            Ok(conn.query_row(
                "SELECT key FROM auth_tokens WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )?)
        })
        .await
    }

    /// Look up the owner of an API token.
    pub async fn user_for_token(&self, key: &str) -> Result<Option<User>, DbError> {
        let key = key.to_string();
        self.call(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT u.id, u.username, u.email, u.password_hash, u.date_joined
                     FROM auth_tokens t JOIN users u ON u.id = t.user_id
                     WHERE t.key = ?1",
                    params![key],
                    User::from_row,
                )
                .optional()?)
        })
        .await
    }
}
