use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::feed::{format_pub_date, parse_pub_date};

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a lock on the database file
    #[error("The subscription database is locked by another process")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

/// Errors returned by subscription store operations.
///
/// The display strings are shown verbatim to users of the command surface,
/// so they stay short and free of internal detail.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The caller passed something the store cannot act on
    #[error("Invalid arguments provided: {0}")]
    InvalidArguments(String),

    /// The store is unreachable or rejected the query
    #[error("An error was encountered with the feed database")]
    DataStore(#[source] DatabaseError),

    /// A subscription with the same (url, channel) pair is already stored
    #[error("The feed already exists")]
    AlreadyExists,

    /// No subscription matches the (url, channel) pair
    #[error("The feed does not exist")]
    NotExist,
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::DataStore(DatabaseError::from_sqlx(err))
    }
}

impl From<DatabaseError> for StoreError {
    fn from(err: DatabaseError) -> Self {
        StoreError::DataStore(err)
    }
}

// ============================================================================
// Identifier Encoding
// ============================================================================

/// Chat platform identifiers are unsigned 64-bit snowflakes but SQLite only
/// stores signed 64-bit integers. The bit pattern is preserved in both
/// directions, so values above `i64::MAX` come back unchanged.
pub(crate) fn id_to_sql(id: u64) -> i64 {
    id as i64
}

pub(crate) fn id_from_sql(raw: i64) -> u64 {
    raw as u64
}

// ============================================================================
// Data Structures
// ============================================================================

/// A (feed URL, channel) pair tracked for notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub url: String,
    pub channel_id: u64,
    pub guild_id: u64,
    pub title: String,
    /// Publication time of the newest entry already announced
    pub last_pubdate: DateTime<Utc>,
}

impl Subscription {
    pub fn new(
        url: impl Into<String>,
        channel_id: u64,
        guild_id: u64,
        title: impl Into<String>,
        last_pubdate: DateTime<Utc>,
    ) -> Self {
        Self {
            url: url.into(),
            channel_id,
            guild_id,
            title: title.into(),
            last_pubdate,
        }
    }
}

/// Internal row type for subscription queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SubscriptionRow {
    pub url: String,
    pub last_pubdate: String,
    pub channel_id: i64,
    pub title: String,
    pub guild_id: i64,
}

impl SubscriptionRow {
    /// Unreadable stored checkpoints decode as the epoch, the same way
    /// unreadable feed dates do.
    pub(crate) fn into_subscription(self) -> Subscription {
        Subscription {
            url: self.url,
            channel_id: id_from_sql(self.channel_id),
            guild_id: id_from_sql(self.guild_id),
            title: self.title,
            last_pubdate: parse_pub_date(&self.last_pubdate),
        }
    }
}

pub(crate) fn checkpoint_to_sql(ts: DateTime<Utc>) -> String {
    format_pub_date(ts)
}
