use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::json;

use dietlog_core::suggest::{
    PLANNER_SYSTEM_PROMPT, SuggestionRequest, SuggestionResponse, parse_suggestions,
};

use crate::config::LlmSettings;

const TEMPERATURE: f64 = 0.5;

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct LlmClient {
    client: reqwest::Client,
    settings: LlmSettings,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

impl LlmClient {
    pub fn new(settings: LlmSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("dietlog-cli/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, settings })
    }

    pub async fn suggest(&self, request: &SuggestionRequest) -> Result<SuggestionResponse> {
        let messages = [
            ChatMessage {
                role: "system",
                content: PLANNER_SYSTEM_PROMPT.to_string(),
            },
            ChatMessage {
                role: "user",
                content: serde_json::to_string(request)?,
            },
        ];
        let body = json!({
            "model": self.settings.model,
            "response_format": {"type": "json_object"},
            "messages": messages,
            "temperature": TEMPERATURE,
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.settings.base_url))
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to reach the LLM endpoint")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("LLM request failed ({status}): {}", text.trim());
        }

        let data: ChatResponse = resp
            .json()
            .await
            .context("Failed to parse LLM response")?;
        let content = data
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        parse_suggestions(&content)
    }
}
