use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{NotificationSink, NotifyError};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot API sink (`sendMessage` with Markdown)
#[derive(Debug, Clone)]
pub struct TelegramSink {
    client: Client,
    api_base: String,
    bot_token: String,
}

#[derive(Debug, Serialize, PartialEq)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

impl TelegramSink {
    pub fn new(bot_token: impl Into<String>) -> Result<Self, NotifyError> {
        let bot_token = bot_token.into();
        if bot_token.trim().is_empty() {
            return Err(NotifyError::NotConfigured("bot token is empty".to_string()));
        }
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            bot_token,
        })
    }

    /// Point at a different API host (a local mock server in tests)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn send(&self, destination: &str, message: &str) -> Result<(), NotifyError> {
        if destination.trim().is_empty() {
            return Err(NotifyError::NotConfigured("chat id is empty".to_string()));
        }

        let payload = SendMessage {
            chat_id: destination,
            text: message,
            parse_mode: "Markdown",
        };
        // The request URL carries the bot token; keep it out of error messages
        let response = self
            .client
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Http(e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
