use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

/// REST endpoint holding the `diet_backups` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEndpoint {
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

pub struct Config {
    pub db_path: PathBuf,
    pub backup: Option<BackupEndpoint>,
    pub llm: Option<LlmSettings>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "dietlog").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Ok(Self::resolve(data_dir, |key| std::env::var(key).ok()))
    }

    /// Build the config from a data directory and an environment lookup.
    fn resolve(data_dir: PathBuf, env: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let db_path = var("DIETLOG_DB").map_or_else(|| data_dir.join("dietlog.db"), PathBuf::from);

        let backup = match (var("DIETLOG_BACKUP_URL"), var("DIETLOG_BACKUP_KEY")) {
            (Some(url), Some(api_key)) => Some(BackupEndpoint {
                url: url.trim_end_matches('/').to_string(),
                api_key,
            }),
            _ => None,
        };

        let llm = var("DIETLOG_LLM_API_KEY").map(|api_key| LlmSettings {
            api_key,
            base_url: var("DIETLOG_LLM_BASE_URL")
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: var("DIETLOG_LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
        });

        Config {
            db_path,
            backup,
            llm,
        }
    }
}
