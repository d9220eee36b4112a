use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Channel, OutboundMessage, SendError};
use crate::config::TelegramConfig;

/// Telegram Bot API `sendMessage` over plain HTTPS.
pub struct TelegramChannel {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig, token: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<(), SendError> {
        // The token is part of the path; keep it out of error strings.
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);
        let request = SendMessageRequest {
            chat_id: &msg.chat_id,
            text: &msg.text,
            parse_mode: msg.parse_mode.map(|m| m.as_str()),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| SendError::Transport(e.without_url().to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| SendError::Transport(e.without_url().to_string()))?;

        match serde_json::from_str::<ApiResponse>(&body) {
            Ok(resp) if resp.ok && (200..300).contains(&status) => Ok(()),
            Ok(resp) => Err(SendError::Api {
                status,
                description: resp.description.unwrap_or_default(),
            }),
            Err(_) => Err(SendError::Api {
                status,
                description: body,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::channels::ParseMode;

    fn channel_for(server: &MockServer) -> TelegramChannel {
        let config = TelegramConfig {
            base_url: server.uri(),
            ..TelegramConfig::default()
        };
        TelegramChannel::new(&config, "123:abc")
    }

    fn message(parse_mode: Option<ParseMode>) -> OutboundMessage {
        OutboundMessage {
            chat_id: "@news".into(),
            text: "Daily News Digest\n\n*hello*".into(),
            parse_mode,
        }
    }

    #[tokio::test]
    async fn test_send_posts_to_bot_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_json(json!({
                "chat_id": "@news",
                "text": "Daily News Digest\n\n*hello*",
                "parse_mode": "Markdown",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 1}
            })))
            .expect(1)
            .mount(&server)
            .await;

        channel_for(&server)
            .send(&message(Some(ParseMode::Markdown)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_plain_text_omits_parse_mode() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        channel_for(&server).send(&message(None)).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body.get("parse_mode").is_none());
    }

    #[tokio::test]
    async fn test_api_error_carries_description() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        let err = channel_for(&server)
            .send(&message(Some(ParseMode::Markdown)))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SendError::Api {
                status: 400,
                description: "Bad Request: chat not found".into()
            }
        );
    }

    #[tokio::test]
    async fn test_non_json_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&server)
            .await;

        let err = channel_for(&server).send(&message(None)).await.unwrap_err();
        assert!(matches!(err, SendError::Api { status: 502, .. }));
    }

    #[test]
    fn test_parse_mode_names() {
        assert_eq!(ParseMode::from_name("Markdown"), Some(ParseMode::Markdown));
        assert_eq!(ParseMode::from_name("html"), Some(ParseMode::Html));
        assert_eq!(ParseMode::from_name("MarkdownV2"), Some(ParseMode::MarkdownV2));
        assert_eq!(ParseMode::from_name(""), None);
    }
}
