use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;

use super::{NotificationSink, SinkError};

pub const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api/v10";

const POST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct CreateMessage<'a> {
    content: &'a str,
}

/// Posts messages with a bot token through the Discord REST API.
pub struct DiscordSink {
    client: reqwest::Client,
    token: SecretString,
    api_base: String,
}

impl DiscordSink {
    pub fn new(client: reqwest::Client, token: SecretString, api_base: impl Into<String>) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        Self {
            client,
            token,
            api_base,
        }
    }
}

impl std::fmt::Debug for DiscordSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordSink")
            .field("api_base", &self.api_base)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl NotificationSink for DiscordSink {
    async fn post(&self, channel_id: u64, text: &str) -> Result<(), SinkError> {
        let url = format!("{}/channels/{}/messages", self.api_base, channel_id);
        let body = serde_json::to_vec(&CreateMessage { content: text })?;

        let response = self
            .client
            .post(&url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bot {}", self.token.expose_secret()),
            )
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .timeout(POST_TIMEOUT)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(channel_id, status = %status, "Discord rejected message");
            return Err(SinkError::Rejected(status.as_u16()));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}
