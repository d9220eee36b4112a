pub mod openai_compatible;

use serde::{Deserialize, Serialize};

pub use openai_compatible::ChatCompletionClient;

// --- Message ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

// --- Result ---

/// Why a completion call produced no digest text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    #[error("request timed out")]
    Timeout,
    #[error("HTTP error {0}")]
    Http(u16),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

pub type CompletionResult = Result<String, CompletionError>;

// --- Client trait ---

/// One bounded request for the daily digest text. Implementations map every
/// failure into [`CompletionError`] instead of propagating it.
#[async_trait::async_trait]
pub trait CompletionClient: Send + Sync {
    async fn fetch_digest(&self) -> CompletionResult;
}
