use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use dietlog_core::remote::{BACKUP_TABLE, BackupClient, BackupRow, RemoteError, StoredBackup};

use crate::config::BackupEndpoint;

/// PostgREST-style client for the `diet_backups` table.
pub struct RestBackupClient {
    client: reqwest::Client,
    table_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct UpdatedAtRow {
    updated_at: DateTime<Utc>,
}

impl RestBackupClient {
    pub fn new(endpoint: &BackupEndpoint) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "dietlog-cli/{} (diet tracker)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            table_url: format!("{}/rest/v1/{BACKUP_TABLE}", endpoint.url),
            api_key: endpoint.api_key.clone(),
        })
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.api_key).bearer_auth(&self.api_key)
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, RemoteError> {
        let resp = self
            .authorized(req)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        debug!(%status, "backup endpoint rejected request");
        Err(rejection(status, &body))
    }

    async fn rows<T: DeserializeOwned>(resp: Response) -> Result<Vec<T>, RemoteError> {
        resp.json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }
}

/// Prefer the server's `message` field, then the raw body, then the status text.
fn rejection(status: StatusCode, body: &str) -> RemoteError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .or_else(|| Some(body.trim().to_string()).filter(|b| !b.is_empty()))
        .unwrap_or_else(|| status.to_string());
    RemoteError::Rejected {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl BackupClient for RestBackupClient {
    async fn upsert(&self, row: BackupRow) -> Result<DateTime<Utc>, RemoteError> {
        let req = self
            .client
            .post(&self.table_url)
            .query(&[("on_conflict", "user_id"), ("select", "updated_at")])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&[&row]);
        let resp = self.send(req).await?;
        let rows: Vec<UpdatedAtRow> = Self::rows(resp).await?;
        rows.into_iter()
            .next()
            .map(|r| r.updated_at)
            .ok_or_else(|| RemoteError::InvalidResponse("upsert returned no row".to_string()))
    }

    async fn fetch(&self, user_id: &str) -> Result<StoredBackup, RemoteError> {
        let filter = format!("eq.{user_id}");
        let req = self
            .client
            .get(&self.table_url)
            .query(&[("user_id", filter.as_str()), ("select", "data,updated_at")]);
        let resp = self.send(req).await?;
        let rows: Vec<StoredBackup> = Self::rows(resp).await?;
        rows.into_iter().next().ok_or(RemoteError::NotFound)
    }

    async fn probe(&self, _user_id: &str) -> Result<(), RemoteError> {
        let req = self
            .client
            .get(&self.table_url)
            .query(&[("select", "updated_at"), ("limit", "1")]);
        self.send(req).await.map(|_| ())
    }
}
