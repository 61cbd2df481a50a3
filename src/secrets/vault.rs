//! HashiCorp Vault (and OpenBao) KV v2 client.
//!
//! Path mapping:
//! ```text
//! read(path = "newsapi", key = "API_KEY")  →  GET {addr}/v1/{mount}/data/newsapi  →  .data.data.API_KEY
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::store::{SecretStore, StoreCredential, StoreError, StoreSession};
use crate::config::VaultConfig;

const VAULT_TOKEN_HEADER: &str = "X-Vault-Token";

/// [`SecretStore`] backed by a Vault KV v2 mount.
pub struct VaultClient {
    client: Client,
    addr: String,
    mount: String,
}

impl VaultClient {
    pub fn new(config: &VaultConfig) -> Result<Self, StoreError> {
        let mut builder = Client::builder().timeout(Duration::from_secs(30));
        if config.skip_tls_verify {
            tracing::warn!("Secret store TLS verification disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }
        Ok(Self {
            client: builder.build()?,
            addr: config.addr.trim_end_matches('/').to_string(),
            mount: config.mount.clone(),
        })
    }

    fn data_url(&self, path: &str) -> String {
        format!(
            "{}/v1/{}/data/{}",
            self.addr,
            self.mount,
            path.trim_start_matches('/')
        )
    }

    async fn kubernetes_login(&self, role: &str, jwt: &str) -> Result<StoreSession, StoreError> {
        let url = format!("{}/v1/auth/kubernetes/login", self.addr);
        let body = serde_json::json!({ "role": role, "jwt": jwt.trim() });
        let resp = self.client.post(&url).json(&body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let errors = parse_vault_errors(resp).await;
            return Err(StoreError::Api { status, errors });
        }

        let json: Value = resp.json().await?;
        json.pointer("/auth/client_token")
            .and_then(|v| v.as_str())
            .map(StoreSession::new)
            .ok_or_else(|| {
                StoreError::Auth("missing client_token in kubernetes login response".to_string())
            })
    }
}

#[async_trait]
impl SecretStore for VaultClient {
    async fn authenticate(&self, credential: &StoreCredential) -> Result<StoreSession, StoreError> {
        match credential {
            StoreCredential::StaticToken(token) => Ok(StoreSession::new(token.clone())),
            StoreCredential::WorkloadIdentity { role, jwt } => {
                self.kubernetes_login(role, jwt).await
            }
        }
    }

    async fn read(
        &self,
        session: &StoreSession,
        path: &str,
        key: &str,
    ) -> Result<String, StoreError> {
        let resp = self
            .client
            .get(self.data_url(path))
            .header(VAULT_TOKEN_HEADER, session.token())
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let errors = parse_vault_errors(resp).await;
            return Err(StoreError::Api { status, errors });
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| StoreError::Deserialize(e.to_string()))?;

        // KV v2 nests the payload under data.data
        let data = json
            .pointer("/data/data")
            .ok_or_else(|| StoreError::Deserialize("missing data.data".to_string()))?;

        match data.get(key) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Null) | None => Err(StoreError::MissingKey {
                path: path.to_string(),
                key: key.to_string(),
            }),
            Some(other) => Ok(other.to_string()),
        }
    }
}

async fn parse_vault_errors(resp: reqwest::Response) -> Vec<String> {
    resp.json::<Value>()
        .await
        .ok()
        .and_then(|v| {
            v.get("errors")?.as_array().map(|arr| {
                arr.iter()
                    .filter_map(|e| e.as_str().map(String::from))
                    .collect()
            })
        })
        .unwrap_or_default()
}
