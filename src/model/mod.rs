//! Outbound text-completion backends.
//!
//! The service never talks to a model directly; it hands a list of
//! role-tagged messages to a [`CompletionBackend`] and receives the raw text
//! of the first choice. [`openai::OpenAiBackend`] speaks the OpenAI
//! chat-completions protocol and serves both the text model and the image
//! prompt gateway.

use serde::{Deserialize, Serialize};

pub mod openai;

pub use self::openai::{BackendConfig, OpenAiBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature; `None` leaves the backend default in place.
    pub temperature: Option<f32>,
}

/// Why a completion call produced no text.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("model credential is not configured")]
    MissingCredential,
    #[error("model request timed out")]
    Timeout,
    #[error("model request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("model returned HTTP {status}")]
    Status { status: u16, body: String },
    #[error("model response was malformed: {0}")]
    MalformedResponse(String),
    #[error("model response contained no content")]
    EmptyResponse,
}

impl UpstreamError {
    /// HTTP status returned by the provider, if the call got that far.
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else {
            UpstreamError::Transport(err)
        }
    }
}

/// A remote text-completion service.
#[async_trait::async_trait]
pub trait CompletionBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<String, UpstreamError>;
}
