//! Subscription store backed by SQLite.
//!
//! One row per (feed URL, channel) pair holds the subscription's display
//! title, owning guild, and checkpoint. The synchronization engine reads the
//! table through a streaming [`SubscriptionCursor`] and writes back only
//! through [`Database::update_checkpoint`].

mod feeds;
mod schema;
mod types;

pub use feeds::SubscriptionCursor;
pub use schema::Database;
pub use types::{DatabaseError, StoreError, Subscription};
