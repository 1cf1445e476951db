use chrono::{DateTime, Utc};
use feed_rs::parser;
use thiserror::Error;

use super::pubdate::parse_entry_timestamp;

/// Errors that can occur while turning a document into entries.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The document is not RSS, Atom or JSON Feed, or is malformed
    #[error("Parse error: {0}")]
    Malformed(String),
}

/// One entry of a feed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    /// Epoch when the document carries no readable date
    pub published: DateTime<Utc>,
}

/// A parsed feed document with entries in document order.
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub title: String,
    pub entries: Vec<FeedEntry>,
}

impl ParsedFeed {
    /// Timestamp of the newest entry, or the epoch for an empty feed
    pub fn newest(&self) -> DateTime<Utc> {
        self.entries
            .iter()
            .map(|e| e.published)
            .max()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

/// Parse an RSS, Atom or JSON Feed document.
///
/// Entries with unreadable dates are kept with an epoch timestamp rather
/// than failing the whole document. Dates are read to whole seconds.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, ParseError> {
    let feed = parser::Builder::new()
        .timestamp_parser(parse_entry_timestamp)
        .build()
        .parse(bytes)
        .map_err(|e| ParseError::Malformed(e.to_string()))?;

    let title = feed
        .title
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled Feed".to_string());

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .unwrap_or_default();
            let published = entry
                .published
                .or(entry.updated)
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
            let title = entry
                .title
                .map(|t| t.content.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "Untitled".to_string());

            FeedEntry {
                title,
                link,
                published,
            }
        })
        .collect();

    Ok(ParsedFeed { title, entries })
}
