use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, CompletionBackend, CompletionRequest, UpstreamError};
use crate::util::truncate_for_log;

/// Connection settings for one OpenAI-compatible deployment.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    /// Label used in logs.
    pub name: String,
    /// Base URL up to and including the version segment, e.g.
    /// `https://api.openai.com/v1`.
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: Option<u32>,
    /// Temperature sent when a request does not specify one.
    pub default_temperature: Option<f32>,
    pub timeout_ms: u64,
}

/// Calls `POST {base_url}/chat/completions` with a bearer credential and
/// returns the first choice's message content.
pub struct OpenAiBackend {
    cfg: BackendConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiBackend {
    pub fn new(cfg: BackendConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .with_context(|| format!("failed to build HTTP client for {}", cfg.name))?;
        Ok(Self { cfg, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.cfg.base_url.trim_end_matches('/'))
    }

    fn credential(&self) -> Result<&str, UpstreamError> {
        self.cfg
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(UpstreamError::MissingCredential)
    }
}

#[async_trait::async_trait]
impl CompletionBackend for OpenAiBackend {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, UpstreamError> {
        let api_key = self.credential()?;
        let body = ChatCompletionBody {
            model: &self.cfg.model,
            messages: &request.messages,
            max_tokens: self.cfg.max_tokens,
            temperature: request.temperature.or(self.cfg.default_temperature),
        };
        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(UpstreamError::from_transport)?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: truncate_for_log(&text, 512),
            });
        }
        let text = resp.text().await.map_err(UpstreamError::from_transport)?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&text)
            .map_err(|err| UpstreamError::MalformedResponse(err.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(UpstreamError::EmptyResponse)
    }
}
