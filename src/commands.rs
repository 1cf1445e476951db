//! Subscription management used by the CLI and chat commands.
//!
//! Every failure carries a short reason that can be shown to the person who
//! issued the command; see [`CommandError::user_message`].

use thiserror::Error;

use crate::config::Config;
use crate::feed::{fetch_document, parse_feed, FetchError, ParseError, TransferLimits};
use crate::storage::{Database, StoreError, Subscription};
use crate::util::{validate_feed_url, UrlValidationError};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    InvalidUrl(#[from] UrlValidationError),
    #[error("Could not download the feed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Could not read the feed: {0}")]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Which command failed, for the user-facing prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Add,
    Remove,
    List,
}

impl CommandError {
    /// Reason shown to the user, prefixed with the failed action.
    pub fn user_message(&self, kind: CommandKind) -> String {
        let action = match kind {
            CommandKind::Add => "Error adding feed",
            CommandKind::Remove => "Error removing feed",
            CommandKind::List => "Error listing feeds",
        };
        format!("{}: {}", action, self)
    }
}

/// Confirmation sent after a successful add
pub fn added_message(url: &str) -> String {
    format!(
        "The following feed has been successfully added to this channel:\n`{}`",
        url
    )
}

fn normalize_url(url: &str) -> String {
    let url = url.trim();
    url::Url::parse(url)
        .map(String::from)
        .unwrap_or_else(|_| url.to_string())
}

/// One page of a channel's subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionPage {
    /// Subscriptions in the channel across all pages
    pub total: i64,
    pub items: Vec<Subscription>,
}

pub struct SubscriptionService {
    db: Database,
    client: reqwest::Client,
    limits: TransferLimits,
    allow_private_hosts: bool,
}

impl SubscriptionService {
    pub fn new(db: Database, client: reqwest::Client, config: &Config) -> Self {
        Self {
            db,
            client,
            limits: config.transfer_limits(),
            allow_private_hosts: config.allow_private_hosts,
        }
    }

    /// Subscribe `channel_id` to the feed at `url`.
    ///
    /// The feed is downloaded and parsed once, both to prove it is a feed and
    /// to take its title. The checkpoint starts at the newest entry so that
    /// entries published before the subscription are never announced.
    pub async fn add(
        &self,
        url: &str,
        channel_id: u64,
        guild_id: u64,
    ) -> Result<Subscription, CommandError> {
        let url = validate_feed_url(url, self.allow_private_hosts)?;

        // Cheap check before spending a download on a duplicate
        if self.db.exists(url.as_str(), channel_id).await? {
            return Err(StoreError::AlreadyExists.into());
        }

        let body = fetch_document(&self.client, url.as_str(), self.limits).await?;
        let feed = parse_feed(&body)?;

        let subscription = Subscription::new(
            url.as_str(),
            channel_id,
            guild_id,
            feed.title.clone(),
            feed.newest(),
        );
        self.db.insert(&subscription).await?;

        tracing::info!(
            url = %subscription.url,
            channel_id,
            guild_id,
            title = %subscription.title,
            "Subscription added"
        );
        Ok(subscription)
    }

    /// Unsubscribe a channel. `url` is normalized the same way `add` stored it.
    pub async fn remove(&self, url: &str, channel_id: u64) -> Result<(), CommandError> {
        let url = normalize_url(url);
        self.db.delete(&url, channel_id).await?;
        tracing::info!(url = %url, channel_id, "Subscription removed");
        Ok(())
    }

    /// List a channel's subscriptions, `per_page` at a time, `page` counting from 0.
    pub async fn list(
        &self,
        channel_id: u64,
        page: u32,
        per_page: u32,
    ) -> Result<SubscriptionPage, CommandError> {
        let offset = i64::from(page) * i64::from(per_page);
        let total = self.db.count(channel_id).await?;
        let items = self.db.page(channel_id, offset, i64::from(per_page)).await?;
        Ok(SubscriptionPage { total, items })
    }

    /// Drop every subscription of a guild, e.g. after the bot was removed
    /// from it. Failures are logged and reported as zero removed.
    pub async fn purge_group(&self, guild_id: u64) -> u64 {
        match self.db.delete_all_for_group(guild_id).await {
            Ok(removed) => {
                tracing::info!(guild_id, removed, "Removed subscriptions for guild");
                removed
            }
            Err(e) => {
                tracing::error!(guild_id, error = %e, "Failed to remove subscriptions for guild");
                0
            }
        }
    }

    /// Drop every subscription posting into a deleted channel.
    pub async fn purge_channel(&self, channel_id: u64) -> u64 {
        match self.db.delete_all_for_channel(channel_id).await {
            Ok(removed) => {
                tracing::info!(channel_id, removed, "Removed subscriptions for channel");
                removed
            }
            Err(e) => {
                tracing::error!(channel_id, error = %e, "Failed to remove subscriptions for channel");
                0
            }
        }
    }
}
