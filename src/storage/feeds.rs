use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::TryStreamExt;

use super::schema::Database;
use super::types::{
    checkpoint_to_sql, id_to_sql, StoreError, Subscription, SubscriptionRow,
};

/// Streaming read over every stored subscription.
///
/// Rows are pulled from the database one at a time, so memory use does not
/// grow with the number of subscriptions. Once [`next`](Self::next) has
/// returned `Ok(None)` the cursor is finished and further calls fail with
/// [`StoreError::InvalidArguments`].
pub struct SubscriptionCursor<'a> {
    rows: BoxStream<'a, Result<SubscriptionRow, sqlx::Error>>,
    /// First row, pulled eagerly by `begin_listing` so connection failures
    /// surface there instead of on the first `next`
    primed: Option<Option<Subscription>>,
    finished: bool,
}

impl SubscriptionCursor<'_> {
    /// Returns the next subscription, or `Ok(None)` once all rows were read.
    pub async fn next(&mut self) -> Result<Option<Subscription>, StoreError> {
        if self.finished {
            return Err(StoreError::InvalidArguments(
                "subscription cursor already finished".to_string(),
            ));
        }

        let next = match self.primed.take() {
            Some(primed) => primed,
            None => self
                .rows
                .try_next()
                .await?
                .map(SubscriptionRow::into_subscription),
        };

        if next.is_none() {
            self.finished = true;
        }
        Ok(next)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Database {
    // ========================================================================
    // Listing
    // ========================================================================

    /// Open a streaming read over all subscriptions.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DataStore`] if the query cannot be started.
    pub async fn begin_listing(&self) -> Result<SubscriptionCursor<'_>, StoreError> {
        let mut rows = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT url, last_pubdate, channel_id, title, guild_id FROM feeds ORDER BY rowid",
        )
        .fetch(&self.pool);

        let first = rows
            .try_next()
            .await?
            .map(SubscriptionRow::into_subscription);

        Ok(SubscriptionCursor {
            rows,
            primed: Some(first),
            finished: false,
        })
    }

    // ========================================================================
    // Single-record Operations
    // ========================================================================

    /// Check whether a subscription exists for the (url, channel) pair
    pub async fn exists(&self, url: &str, channel_id: u64) -> Result<bool, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(1) FROM feeds WHERE url = ? AND channel_id = ?")
                .bind(url)
                .bind(id_to_sql(channel_id))
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    /// Fetch a single subscription by its identity pair
    pub async fn get(&self, url: &str, channel_id: u64) -> Result<Option<Subscription>, StoreError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(
            "SELECT url, last_pubdate, channel_id, title, guild_id FROM feeds WHERE url = ? AND channel_id = ?",
        )
        .bind(url)
        .bind(id_to_sql(channel_id))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SubscriptionRow::into_subscription))
    }

    /// Insert a new subscription.
    ///
    /// Duplicates are rejected, never upserted.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidArguments`] if the URL is empty
    /// - [`StoreError::AlreadyExists`] if the (url, channel) pair is taken
    /// - [`StoreError::DataStore`] on any database failure
    pub async fn insert(&self, subscription: &Subscription) -> Result<(), StoreError> {
        if subscription.url.trim().is_empty() {
            return Err(StoreError::InvalidArguments("feed URL is empty".to_string()));
        }

        if self
            .exists(&subscription.url, subscription.channel_id)
            .await?
        {
            return Err(StoreError::AlreadyExists);
        }

        let result = sqlx::query(
            "INSERT INTO feeds (url, last_pubdate, channel_id, title, guild_id) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&subscription.url)
        .bind(checkpoint_to_sql(subscription.last_pubdate))
        .bind(id_to_sql(subscription.channel_id))
        .bind(&subscription.title)
        .bind(id_to_sql(subscription.guild_id))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            // Lost a race against a concurrent insert of the same pair
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::AlreadyExists)
            }
            Err(e) => {
                tracing::error!(url = %subscription.url, error = %e, "Failed to insert subscription");
                Err(e.into())
            }
        }
    }

    /// Delete one subscription.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotExist`] if no subscription matches.
    pub async fn delete(&self, url: &str, channel_id: u64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM feeds WHERE url = ? AND channel_id = ?")
            .bind(url)
            .bind(id_to_sql(channel_id))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotExist);
        }
        Ok(())
    }

    /// Persist a new checkpoint for one subscription.
    ///
    /// Writing the same timestamp twice leaves the row unchanged. Callers
    /// only ever pass timestamps that are not older than the stored one.
    pub async fn update_checkpoint(
        &self,
        url: &str,
        channel_id: u64,
        last_pubdate: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE feeds SET last_pubdate = ? WHERE url = ? AND channel_id = ?")
            .bind(checkpoint_to_sql(last_pubdate))
            .bind(url)
            .bind(id_to_sql(channel_id))
            .execute(&self.pool)
            .await;

        if let Err(e) = result {
            tracing::error!(url = %url, channel_id, error = %e, "Failed to update feed checkpoint");
            return Err(e.into());
        }
        Ok(())
    }

    // ========================================================================
    // Bulk Operations
    // ========================================================================

    /// Remove every subscription owned by a guild. Returns the number removed.
    pub async fn delete_all_for_group(&self, guild_id: u64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM feeds WHERE guild_id = ?")
            .bind(id_to_sql(guild_id))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Remove every subscription posting into a channel. Returns the number removed.
    pub async fn delete_all_for_channel(&self, channel_id: u64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM feeds WHERE channel_id = ?")
            .bind(id_to_sql(channel_id))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // ========================================================================
    // Listing for Presentation
    // ========================================================================

    /// Number of subscriptions in a channel
    pub async fn count(&self, channel_id: u64) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM feeds WHERE channel_id = ?")
            .bind(id_to_sql(channel_id))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// One page of a channel's subscriptions, ordered by title then URL
    pub async fn page(
        &self,
        channel_id: u64,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Subscription>, StoreError> {
        if offset < 0 || limit < 0 {
            return Err(StoreError::InvalidArguments(format!(
                "offset {} / limit {} must not be negative",
                offset, limit
            )));
        }

        let rows: Vec<SubscriptionRow> = sqlx::query_as(
            r#"
                SELECT url, last_pubdate, channel_id, title, guild_id
                FROM feeds
                WHERE channel_id = ?
                ORDER BY title, url
                LIMIT ? OFFSET ?
            "#,
        )
        .bind(id_to_sql(channel_id))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(SubscriptionRow::into_subscription)
            .collect())
    }
}
