//! Contract for the remote backup endpoint: one row per user holding the
//! whole backup blob and the server's update timestamp.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Table name used by REST implementations.
pub const BACKUP_TABLE: &str = "diet_backups";

pub const CONNECTIVITY_HINT: &str =
    "Cannot reach the backup server. Check the URL, the API key and your network connection";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRow {
    pub user_id: String,
    pub data: Value,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredBackup {
    pub data: Value,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The request never got a response.
    #[error("network error: {0}")]
    Network(String),
    #[error("no backup stored for this user")]
    NotFound,
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("unexpected response from backup server: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Message fit for the cloud status line. Transport failures become a
    /// connectivity hint; everything else keeps its own message.
    #[must_use]
    pub fn normalized(&self) -> String {
        match self {
            Self::Network(_) => CONNECTIVITY_HINT.to_string(),
            other => other.to_string(),
        }
    }
}

#[async_trait]
pub trait BackupClient: Send + Sync {
    /// Insert or replace the user's row. Returns the stored `updated_at`.
    async fn upsert(&self, row: BackupRow) -> Result<DateTime<Utc>, RemoteError>;

    async fn fetch(&self, user_id: &str) -> Result<StoredBackup, RemoteError>;

    /// Cheap reachability check. A missing row still proves the endpoint works.
    async fn probe(&self, user_id: &str) -> Result<(), RemoteError> {
        match self.fetch(user_id).await {
            Ok(_) | Err(RemoteError::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
