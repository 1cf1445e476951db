//! Delivery of announcements to chat channels.
//!
//! The engine only knows the [`NotificationSink`] trait. [`DiscordSink`]
//! posts through the Discord REST API; [`LogSink`] just logs, which is handy
//! for dry runs and for running without a bot token.

mod discord;

use async_trait::async_trait;
use thiserror::Error;

use crate::feed::FeedEntry;

pub use discord::{DiscordSink, DEFAULT_DISCORD_API_BASE};

/// Hard limit on the length of one Discord message, in characters
pub const MAX_MESSAGE_LEN: usize = 2000;

#[derive(Debug, Error)]
pub enum SinkError {
    /// Request could not be delivered
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    /// The platform refused the message (unknown channel, missing access, ...)
    #[error("Message rejected: status {0}")]
    Rejected(u16),
    #[error("Could not encode message: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Something that can post a text message into a channel.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn post(&self, channel_id: u64, text: &str) -> Result<(), SinkError>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Sink that writes every message to the log instead of a chat platform.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn post(&self, channel_id: u64, text: &str) -> Result<(), SinkError> {
        tracing::info!(channel_id, message = %text, "Announcement (log sink)");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Render the announcement for one new entry.
///
/// Messages stay within [`MAX_MESSAGE_LEN`] characters. The entry title is
/// shortened first so the link survives; only a link that cannot fit on its
/// own is cut.
pub fn format_notification(feed_title: &str, entry: &FeedEntry) -> String {
    let message = format!("## {}\n### {}\n{}", feed_title, entry.title, entry.link);
    if message.chars().count() <= MAX_MESSAGE_LEN {
        return message;
    }

    let fixed = format!("## {}\n### \n{}", feed_title, entry.link);
    let room = MAX_MESSAGE_LEN.saturating_sub(fixed.chars().count());
    if room == 0 {
        return message.chars().take(MAX_MESSAGE_LEN).collect();
    }
    let title: String = entry.title.chars().take(room).collect();
    format!("## {}\n### {}\n{}", feed_title, title, entry.link)
}
