//! Paywall subscription flag, one row per user.

use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use super::{now_string, Database, DbError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSubscription {
    pub user_id: i64,
    pub is_subscribed: bool,
    pub updated_at: String,
}

impl Database {
    /// Mark the user subscribed, creating the record on first use.
    pub async fn subscribe(&self, user_id: i64) -> Result<UserSubscription, DbError> {
        self.call(move |conn| {
            let now = now_string();
            conn.execute(
                "INSERT INTO user_subscriptions (user_id, is_subscribed, updated_at)
                 VALUES (?1, 1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET is_subscribed = 1, updated_at = excluded.updated_at",
                params![user_id, now],
            )
            .map_err(DbError::from_write)?;
            Ok(UserSubscription {
                user_id,
                is_subscribed: true,
                updated_at: now,
            })
        })
        .await
    }

    /// Clear the flag if a record exists. Returns whether one existed.
    ///
    /// Never creates a record.
    pub async fn unsubscribe(&self, user_id: i64) -> Result<bool, DbError> {
        self.call(move |conn| {
            let changed = conn.execute(
                "UPDATE user_subscriptions SET is_subscribed = 0, updated_at = ?2 WHERE user_id = ?1",
                params![user_id, now_string()],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    pub async fn subscription(&self, user_id: i64) -> Result<Option<UserSubscription>, DbError> {
        self.call(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT user_id, is_subscribed, updated_at FROM user_subscriptions WHERE user_id = ?1",
                    params![user_id],
                    |row| {
                        Ok(UserSubscription {
                            user_id: row.get(0)?,
                            is_subscribed: row.get(1)?,
                            updated_at: row.get(2)?,
                        })
                    },
                )
                .optional()?)
        })
        .await
    }

    /// Convenience for views: subscribed iff a record exists with the flag set.
    pub async fn is_subscribed(&self, user_id: i64) -> Result<bool, DbError> {
        Ok(self
            .subscription(user_id)
            .await?
            .map(|s| s.is_subscribed)
            .unwrap_or(false))
    }
}
