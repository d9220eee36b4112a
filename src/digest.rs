use std::fmt;
use std::sync::Arc;

use crate::channels::{Channel, OutboundMessage, ParseMode};
use crate::llm::CompletionClient;
use crate::scheduler::Job;

pub const HEADER: &str = "Daily News Digest";
pub const FOOTER: &str = "_Powered by Perplexity AI_";
pub const FALLBACK_TEXT: &str = "Failed to get information from Perplexity. Check API key.";

/// One post: header, blank line, body, blank line, footer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishMessage {
    pub header: &'static str,
    pub body: String,
    pub footer: &'static str,
}

impl PublishMessage {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            header: HEADER,
            body: body.into(),
            footer: FOOTER,
        }
    }

    pub fn fallback() -> Self {
        Self::new(FALLBACK_TEXT)
    }
}

impl fmt::Display for PublishMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n\n{}\n\n{}", self.header, self.body, self.footer)
    }
}

/// Fetches the digest and posts it to the configured channel.
pub struct DigestPublisher {
    completion: Arc<dyn CompletionClient>,
    channel: Arc<dyn Channel>,
    chat_id: String,
    parse_mode: Option<ParseMode>,
}

impl DigestPublisher {
    pub fn new(
        completion: Arc<dyn CompletionClient>,
        channel: Arc<dyn Channel>,
        chat_id: impl Into<String>,
        parse_mode: Option<ParseMode>,
    ) -> Self {
        Self {
            completion,
            channel,
            chat_id: chat_id.into(),
            parse_mode,
        }
    }

    /// Build this cycle's message. A failed completion still yields a post,
    /// with the fallback body; the reason only goes to the log.
    pub async fn compose(&self) -> PublishMessage {
        tracing::info!("Fetching digest...");
        match self.completion.fetch_digest().await {
            Ok(text) => PublishMessage::new(text),
            Err(e) => {
                tracing::error!(kind = ?e, "Digest fetch failed: {e}");
                PublishMessage::fallback()
            }
        }
    }

    /// Run one full cycle. Never fails; send errors are logged and dropped.
    pub async fn publish(&self) {
        let message = self.compose().await;
        let outbound = OutboundMessage {
            chat_id: self.chat_id.clone(),
            text: message.to_string(),
            parse_mode: self.parse_mode,
        };
        match self.channel.send(&outbound).await {
            Ok(()) => tracing::info!(channel = self.channel.name(), "Posted digest"),
            Err(e) => tracing::error!(
                channel = self.channel.name(),
                "Failed to post digest: {e}"
            ),
        }
    }
}

#[async_trait::async_trait]
impl Job for DigestPublisher {
    async fn run(&self) {
        self.publish().await;
    }
}
