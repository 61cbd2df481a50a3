use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::{now_string, Database, DbError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Advertisement {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub target_url: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAdvertisement {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub image_url: Option<String>,
    pub target_url: Option<String>,
}

impl Database {
    /// All advertisements, newest first.
    pub async fn list_advertisements(&self) -> Result<Vec<Advertisement>, DbError> {
        self.call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, description, image_url, target_url, created_at
                 FROM advertisements ORDER BY created_at DESC, id DESC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(Advertisement {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    description: row.get(2)?,
                    image_url: row.get(3)?,
                    target_url: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    pub async fn insert_advertisement(&self, ad: NewAdvertisement) -> Result<i64, DbError> {
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO advertisements (title, description, image_url, target_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![ad.title, ad.description, ad.image_url, ad.target_url, now_string()],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_newest_first() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(db.list_advertisements().await.unwrap().is_empty());

        db.insert_advertisement(NewAdvertisement {
            title: "First".to_string(),
            ..NewAdvertisement::default()
        })
        .await
        .unwrap();
        db.insert_advertisement(NewAdvertisement {
            title: "Second".to_string(),
            target_url: Some("https://example.com".to_string()),
            ..NewAdvertisement::default()
        })
        .await
        .unwrap();

        let ads = db.list_advertisements().await.unwrap();
        let titles: Vec<_> = ads.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Second", "First"]);
        assert_eq!(ads[0].target_url.as_deref(), Some("https://example.com"));
        assert_eq!(ads[1].image_url, None);
    }
}
