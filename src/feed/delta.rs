use chrono::{DateTime, Utc};

use super::parser::FeedEntry;

/// Entries not yet announced for a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    /// New entries, oldest first
    pub new_entries: Vec<FeedEntry>,
    /// Timestamp of the newest entry in the whole document
    pub newest: DateTime<Utc>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.new_entries.is_empty()
    }

    /// The checkpoint to persist after announcing this delta, if it moves forward.
    pub fn advanced_checkpoint(&self, checkpoint: DateTime<Utc>) -> Option<DateTime<Utc>> {
        (!self.new_entries.is_empty() && self.newest > checkpoint).then_some(self.newest)
    }
}

/// Work out which entries are newer than `checkpoint`.
///
/// Documents are expected newest-first: entries are taken in document order
/// until the first one that is not strictly newer than the checkpoint, then
/// returned in chronological order. A document that lists oldest-first stops
/// at its first entry, so nothing is announced until every entry in it is
/// newer than the checkpoint.
///
/// Entries with the epoch sentinel are never newer than a valid checkpoint,
/// and cannot drag `newest` backwards past a valid entry.
pub fn compute_delta(entries: Vec<FeedEntry>, checkpoint: DateTime<Utc>) -> Delta {
    let newest = entries
        .iter()
        .map(|e| e.published)
        .max()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let mut new_entries: Vec<FeedEntry> = entries
        .into_iter()
        .take_while(|e| e.published > checkpoint)
        .collect();
    new_entries.reverse();
    // Stable, so equal timestamps keep the reversed document order
    new_entries.sort_by_key(|e| e.published);

    Delta {
        new_entries,
        newest,
    }
}
