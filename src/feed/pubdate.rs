//! RFC-822 style publication dates.
//!
//! Feeds write `pubDate` as `Dow, DD Mon YYYY HH:MM:SS +HHMM`, or with a
//! zone abbreviation in place of the numeric offset. Anything that does not
//! parse collapses to the Unix epoch, which compares older than every real
//! checkpoint.

use chrono::{DateTime, FixedOffset, NaiveDateTime, SubsecRound, TimeZone, Utc};

/// Abbreviations chrono's RFC-2822 parser does not accept, in seconds east of UTC.
const NAMED_ZONES: &[(&str, i32)] = &[
    ("UTC", 0),
    ("Z", 0),
    ("WET", 0),
    ("BST", 3600),
    ("IST", 19_800),
    ("CET", 3600),
    ("CEST", 7200),
    ("EET", 7200),
    ("EEST", 10_800),
    ("MSK", 10_800),
    ("JST", 32_400),
    ("KST", 32_400),
    ("AEST", 36_000),
    ("AEDT", 39_600),
    ("NZST", 43_200),
    ("NZDT", 46_800),
    ("HST", -36_000),
    ("AKST", -32_400),
    ("AKDT", -28_800),
];

/// Parse a publication date, returning the epoch when it cannot be read.
pub fn parse_pub_date(text: &str) -> DateTime<Utc> {
    try_parse_pub_date(text).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Parse a publication date with a numeric or named timezone.
pub fn try_parse_pub_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    // Numeric offsets plus GMT/UT/US zones/military letters
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }

    let (head, zone) = text.rsplit_once(' ')?;
    let offset_secs = NAMED_ZONES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(zone))
        .map(|(_, secs)| *secs)?;
    let offset = FixedOffset::east_opt(offset_secs)?;

    let naive = NaiveDateTime::parse_from_str(head, "%a, %d %b %Y %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(head, "%d %b %Y %H:%M:%S"))
        .ok()?;

    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Timestamp parser handed to feed-rs for every entry and feed date.
///
/// Accepts RFC-3339 (Atom, JSON Feed, and some RSS), RFC-2822 with numeric or
/// named zones, and zone-less ISO dates read as UTC. Results are truncated to
/// whole seconds, the precision checkpoints are stored with.
pub fn parse_entry_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| try_parse_pub_date(text))
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
        .map(|dt| dt.trunc_subsecs(0))
}

/// Format a timestamp the way checkpoints are persisted.
pub fn format_pub_date(ts: DateTime<Utc>) -> String {
    ts.to_rfc2822()
}
