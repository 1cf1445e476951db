//! Feed retrieval, parsing and change detection.
//!
//! - [`fetcher`] - one HTTP GET into a bounded in-memory buffer
//! - [`multiplexer`] - many transfers at once behind a polling loop
//! - [`parser`] - RSS/Atom/JSON Feed documents into [`FeedEntry`] values via `feed-rs`
//! - [`delta`] - which entries are newer than a checkpoint
//! - [`pubdate`] - RFC-822 style dates for entries and checkpoints
//!
//! # Example
//!
//! ```ignore
//! use feedbell::feed::{compute_delta, parse_feed};
//!
//! let feed = parse_feed(&bytes)?;
//! let delta = compute_delta(feed.entries, subscription.last_pubdate);
//! for entry in &delta.new_entries {
//!     // oldest first
//! }
//! ```

mod delta;
mod fetcher;
mod multiplexer;
mod parser;
mod pubdate;

pub use delta::{compute_delta, Delta};
pub use fetcher::{
    build_client, fetch_document, FetchError, TransferLimits, DEFAULT_MAX_FEED_SIZE,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use multiplexer::{
    CompletedJob, JobHandle, MultiplexError, TransferMultiplexer, DEFAULT_MAX_IN_FLIGHT,
    DEFAULT_POLL_INTERVAL,
};
pub use parser::{parse_feed, FeedEntry, ParseError, ParsedFeed};
pub use pubdate::{format_pub_date, parse_entry_timestamp, parse_pub_date, try_parse_pub_date};
