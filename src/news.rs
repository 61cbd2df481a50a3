//! Client for the newsapi.org top-headlines endpoint.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::NewsConfig;

#[derive(Debug, Error)]
pub enum NewsError {
    /// Unreachable, non-2xx, or not the expected JSON.
    #[error("news API unavailable: {0}")]
    Unavailable(String),

    /// The API key was rejected.
    #[error("news API rejected the API key")]
    Unauthorized,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleSource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    #[serde(default)]
    pub source: ArticleSource,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub url_to_image: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HeadlinesResponse {
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Clone)]
pub struct NewsClient {
    client: reqwest::Client,
    base_url: String,
    country: String,
}

impl NewsClient {
    pub fn new(config: &NewsConfig) -> Result<Self, NewsError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| NewsError::Unavailable(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            country: config.country.clone(),
        })
    }

    /// Fetch top headlines, optionally narrowed to a category.
    pub async fn top_headlines(
        &self,
        api_key: &str,
        category: Option<&str>,
    ) -> Result<Vec<Article>, NewsError> {
        let mut query: Vec<(&str, &str)> = vec![("country", self.country.as_str())];
        if let Some(category) = category {
            query.push(("category", category));
        }
        query.push(("apiKey", api_key));

        let resp = self
            .client
            .get(format!("{}/top-headlines", self.base_url))
            .query(&query)
            .send()
            .await
            .map_err(|e| NewsError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(NewsError::Unauthorized);
        }
        if !status.is_success() {
            return Err(NewsError::Unavailable(format!("HTTP {}", status.as_u16())));
        }

        let body: HeadlinesResponse = resp
            .json()
            .await
            .map_err(|e| NewsError::Unavailable(format!("malformed body: {}", e)))?;
        Ok(body.articles)
    }
}
