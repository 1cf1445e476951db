//! Integration tests for full synchronization cycles.
//!
//! Each test serves its feeds from a wiremock server, stores subscriptions in
//! its own in-memory SQLite database, and records announcements with an
//! in-process sink instead of talking to Discord.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use feedbell::feed::{build_client, format_pub_date};
use feedbell::notify::{NotificationSink, SinkError};
use feedbell::storage::{Database, Subscription};
use feedbell::sync::{CycleState, Orchestrator, SyncError, SyncSettings};

// ============================================================================
// Helpers
// ============================================================================

/// Sink that keeps every message, optionally refusing them all.
#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<(u64, String)>>,
    reject: bool,
}

impl RecordingSink {
    fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    fn messages(&self) -> Vec<(u64, String)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn post(&self, channel_id: u64, text: &str) -> Result<(), SinkError> {
        self.messages
            .lock()
            .unwrap()
            .push((channel_id, text.to_string()));
        if self.reject {
            return Err(SinkError::Rejected(403));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Entry `n` is published `n` hours after a fixed base time
fn ts(n: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + n * 3600, 0).unwrap()
}

/// RSS document with one item per entry, in the given order
fn rss(items: &[(&str, Option<String>)]) -> String {
    let mut body = String::from(
        r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Upstream Title</title><link>https://example.com</link><description>d</description>"#,
    );
    for (title, pub_date) in items {
        body.push_str("<item>");
        body.push_str(&format!("<title>{}</title>", title));
        body.push_str(&format!("<link>https://example.com/{}</link>", title));
        body.push_str(&format!("<guid>{}</guid>", title));
        if let Some(date) = pub_date {
            body.push_str(&format!("<pubDate>{}</pubDate>", date));
        }
        body.push_str("</item>");
    }
    body.push_str("</channel></rss>");
    body
}

/// RSS document with items `T{n}` for each `n`, in the given order
fn rss_numbered(ns: &[i64]) -> String {
    let items: Vec<(String, Option<String>)> = ns
        .iter()
        .map(|n| (format!("T{}", n), Some(format_pub_date(ts(*n)))))
        .collect();
    let borrowed: Vec<(&str, Option<String>)> = items
        .iter()
        .map(|(t, d)| (t.as_str(), d.clone()))
        .collect();
    rss(&borrowed)
}

async fn serve(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("Content-Type", "application/rss+xml"),
        )
        .mount(server)
        .await;
}

fn settings() -> SyncSettings {
    SyncSettings {
        poll_interval: Duration::from_millis(50),
        ..SyncSettings::default()
    }
}

async fn setup(sink: Arc<RecordingSink>) -> (Database, Orchestrator) {
    let db = Database::open(":memory:").await.unwrap();
    let orchestrator = Orchestrator::new(db.clone(), build_client().unwrap(), sink, settings());
    (db, orchestrator)
}

fn announcement(feed_title: &str, n: i64) -> String {
    format!("## {}\n### T{}\nhttps://example.com/T{}", feed_title, n, n)
}

// ============================================================================
// Ordering & Checkpoints
// ============================================================================

#[tokio::test]
async fn test_new_entries_announced_oldest_first() {
    let server = MockServer::start().await;
    serve(&server, "/feed", rss_numbered(&[5, 4, 3, 2])).await;

    let sink = Arc::new(RecordingSink::default());
    let (db, orchestrator) = setup(sink.clone()).await;
    let url = format!("{}/feed", server.uri());
    db.insert(&Subscription::new(&url, 10, 1, "Feed A", ts(2)))
        .await
        .unwrap();

    let report = orchestrator.run_cycle().await.unwrap();
    assert_eq!(report.total, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.notified, 3);
    assert_eq!(report.advanced, 1);

    assert_eq!(
        sink.messages(),
        vec![
            (10, announcement("Feed A", 3)),
            (10, announcement("Feed A", 4)),
            (10, announcement("Feed A", 5)),
        ]
    );
    let stored = db.get(&url, 10).await.unwrap().unwrap();
    assert_eq!(stored.last_pubdate, ts(5));
    assert_eq!(orchestrator.state(), CycleState::Idle);
}

#[tokio::test]
async fn test_unchanged_feed_is_idempotent() {
    let server = MockServer::start().await;
    serve(&server, "/feed", rss_numbered(&[3, 2, 1])).await;

    let sink = Arc::new(RecordingSink::default());
    let (db, orchestrator) = setup(sink.clone()).await;
    let url = format!("{}/feed", server.uri());
    db.insert(&Subscription::new(&url, 10, 1, "Feed A", ts(1)))
        .await
        .unwrap();

    let first = orchestrator.run_cycle().await.unwrap();
    assert_eq!(first.notified, 2);

    let second = orchestrator.run_cycle().await.unwrap();
    assert_eq!(second.notified, 0);
    assert_eq!(second.advanced, 0);
    assert_eq!(second.succeeded, 1);

    assert_eq!(sink.messages().len(), 2);
    let stored = db.get(&url, 10).await.unwrap().unwrap();
    assert_eq!(stored.last_pubdate, ts(3));
}

#[tokio::test]
async fn test_checkpoint_never_moves_backwards() {
    let server = MockServer::start().await;
    // Document is older than what was already announced
    serve(&server, "/feed", rss_numbered(&[4, 3])).await;

    let sink = Arc::new(RecordingSink::default());
    let (db, orchestrator) = setup(sink.clone()).await;
    let url = format!("{}/feed", server.uri());
    db.insert(&Subscription::new(&url, 10, 1, "Feed A", ts(9)))
        .await
        .unwrap();

    let report = orchestrator.run_cycle().await.unwrap();
    assert_eq!(report.advanced, 0);
    assert!(sink.messages().is_empty());
    assert_eq!(db.get(&url, 10).await.unwrap().unwrap().last_pubdate, ts(9));
}

#[tokio::test]
async fn test_empty_subscription_title_uses_feed_title() {
    let server = MockServer::start().await;
    serve(&server, "/feed", rss_numbered(&[2])).await;

    let sink = Arc::new(RecordingSink::default());
    let (db, orchestrator) = setup(sink.clone()).await;
    let url = format!("{}/feed", server.uri());
    db.insert(&Subscription::new(&url, 10, 1, "", ts(1)))
        .await
        .unwrap();

    orchestrator.run_cycle().await.unwrap();
    assert_eq!(sink.messages(), vec![(10, announcement("Upstream Title", 2))]);
}

#[tokio::test]
async fn test_fractional_second_entry_announced_once() {
    let server = MockServer::start().await;
    let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Precise</title>
  <id>urn:example:precise</id>
  <updated>2024-01-01T00:00:00.500Z</updated>
  <entry>
    <title>Half</title>
    <id>urn:example:half</id>
    <link href="https://example.com/half"/>
    <updated>2024-01-01T00:00:00.500Z</updated>
  </entry>
</feed>"#;
    serve(&server, "/atom", atom.to_string()).await;

    let sink = Arc::new(RecordingSink::default());
    let (db, orchestrator) = setup(sink.clone()).await;
    let url = format!("{}/atom", server.uri());
    db.insert(&Subscription::new(&url, 10, 1, "Precise", ts(0)))
        .await
        .unwrap();

    for _ in 0..3 {
        orchestrator.run_cycle().await.unwrap();
    }
    assert_eq!(sink.messages().len(), 1);
    assert_eq!(
        db.get(&url, 10).await.unwrap().unwrap().last_pubdate,
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn test_named_zone_pub_dates_are_announced() {
    let server = MockServer::start().await;
    // ts(2) is 2023-11-15 00:13:20 UTC
    let body = rss(&[("T2", Some("Wed, 15 Nov 2023 09:13:20 JST".to_string()))]);
    serve(&server, "/feed", body).await;

    let sink = Arc::new(RecordingSink::default());
    let (db, orchestrator) = setup(sink.clone()).await;
    let url = format!("{}/feed", server.uri());
    db.insert(&Subscription::new(&url, 10, 1, "Feed A", ts(1)))
        .await
        .unwrap();

    orchestrator.run_cycle().await.unwrap();
    assert_eq!(sink.messages(), vec![(10, announcement("Feed A", 2))]);
    assert_eq!(db.get(&url, 10).await.unwrap().unwrap().last_pubdate, ts(2));
}

// ============================================================================
// Unreadable Dates
// ============================================================================

#[tokio::test]
async fn test_undated_entry_at_top_announces_nothing() {
    let server = MockServer::start().await;
    let body = rss(&[
        ("Undated", Some("sometime last week".to_string())),
        ("T3", Some(format_pub_date(ts(3)))),
    ]);
    serve(&server, "/feed", body).await;

    let sink = Arc::new(RecordingSink::default());
    let (db, orchestrator) = setup(sink.clone()).await;
    let url = format!("{}/feed", server.uri());
    db.insert(&Subscription::new(&url, 10, 1, "Feed A", ts(2)))
        .await
        .unwrap();

    let report = orchestrator.run_cycle().await.unwrap();
    assert_eq!(report.notified, 0);
    assert_eq!(report.advanced, 0);
    assert_eq!(db.get(&url, 10).await.unwrap().unwrap().last_pubdate, ts(2));
}

#[tokio::test]
async fn test_undated_entry_does_not_drag_checkpoint_back() {
    let server = MockServer::start().await;
    let body = rss(&[("T4", Some(format_pub_date(ts(4)))), ("Undated", None)]);
    serve(&server, "/feed", body).await;

    let sink = Arc::new(RecordingSink::default());
    let (db, orchestrator) = setup(sink.clone()).await;
    let url = format!("{}/feed", server.uri());
    db.insert(&Subscription::new(&url, 10, 1, "Feed A", ts(2)))
        .await
        .unwrap();

    orchestrator.run_cycle().await.unwrap();
    assert_eq!(sink.messages(), vec![(10, announcement("Feed A", 4))]);
    assert_eq!(db.get(&url, 10).await.unwrap().unwrap().last_pubdate, ts(4));
}

// ============================================================================
// Failure Isolation
// ============================================================================

#[tokio::test]
async fn test_failed_transfer_does_not_affect_other_subscriptions() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    serve(&server, "/b", rss_numbered(&[3, 2, 1])).await;

    let sink = Arc::new(RecordingSink::default());
    let (db, orchestrator) = setup(sink.clone()).await;
    let url_a = format!("{}/a", server.uri());
    let url_b = format!("{}/b", server.uri());
    db.insert(&Subscription::new(&url_a, 10, 1, "Feed A", ts(0)))
        .await
        .unwrap();
    db.insert(&Subscription::new(&url_b, 11, 1, "Feed B", ts(1)))
        .await
        .unwrap();

    let report = orchestrator.run_cycle().await.unwrap();
    assert_eq!(report.total, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.notified, 2);

    assert_eq!(
        sink.messages(),
        vec![
            (11, announcement("Feed B", 2)),
            (11, announcement("Feed B", 3)),
        ]
    );
    assert_eq!(db.get(&url_a, 10).await.unwrap().unwrap().last_pubdate, ts(0));
    assert_eq!(db.get(&url_b, 11).await.unwrap().unwrap().last_pubdate, ts(3));
}

#[tokio::test]
async fn test_unparsable_document_is_skipped() {
    let server = MockServer::start().await;
    serve(&server, "/feed", "<html><body>not a feed</body></html>".to_string()).await;

    let sink = Arc::new(RecordingSink::default());
    let (db, orchestrator) = setup(sink.clone()).await;
    let url = format!("{}/feed", server.uri());
    db.insert(&Subscription::new(&url, 10, 1, "Feed A", ts(1)))
        .await
        .unwrap();

    let report = orchestrator.run_cycle().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.succeeded, 0);
    assert!(sink.messages().is_empty());
    assert_eq!(db.get(&url, 10).await.unwrap().unwrap().last_pubdate, ts(1));
}

#[tokio::test]
async fn test_rejected_dispatch_still_advances_checkpoint() {
    let server = MockServer::start().await;
    serve(&server, "/feed", rss_numbered(&[3, 2])).await;

    let sink = Arc::new(RecordingSink::rejecting());
    let (db, orchestrator) = setup(sink.clone()).await;
    let url = format!("{}/feed", server.uri());
    db.insert(&Subscription::new(&url, 10, 1, "Feed A", ts(1)))
        .await
        .unwrap();

    let report = orchestrator.run_cycle().await.unwrap();
    assert_eq!(report.notified, 0);
    assert_eq!(report.advanced, 1);
    // Both were attempted, in order
    assert_eq!(sink.messages().len(), 2);
    assert_eq!(db.get(&url, 10).await.unwrap().unwrap().last_pubdate, ts(3));
}

#[tokio::test]
async fn test_same_feed_in_two_channels_tracked_separately() {
    let server = MockServer::start().await;
    serve(&server, "/feed", rss_numbered(&[3, 2, 1])).await;

    let sink = Arc::new(RecordingSink::default());
    let (db, orchestrator) = setup(sink.clone()).await;
    let url = format!("{}/feed", server.uri());
    db.insert(&Subscription::new(&url, 10, 1, "Feed", ts(1)))
        .await
        .unwrap();
    db.insert(&Subscription::new(&url, u64::MAX, 2, "Feed", ts(2)))
        .await
        .unwrap();

    let report = orchestrator.run_cycle().await.unwrap();
    assert_eq!(report.notified, 3);

    let mut to_max: Vec<String> = sink
        .messages()
        .into_iter()
        .filter(|(channel, _)| *channel == u64::MAX)
        .map(|(_, text)| text)
        .collect();
    to_max.sort();
    assert_eq!(to_max, vec![announcement("Feed", 3)]);
    assert_eq!(db.get(&url, 10).await.unwrap().unwrap().last_pubdate, ts(3));
    assert_eq!(
        db.get(&url, u64::MAX).await.unwrap().unwrap().last_pubdate,
        ts(3)
    );
}

// ============================================================================
// Single Flight
// ============================================================================

#[tokio::test]
async fn test_concurrent_cycle_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(rss_numbered(&[2]))
                .set_delay(Duration::from_millis(800)),
        )
        .mount(&server)
        .await;

    let sink = Arc::new(RecordingSink::default());
    let (db, orchestrator) = setup(sink.clone()).await;
    db.insert(&Subscription::new(
        format!("{}/slow", server.uri()),
        10,
        1,
        "Slow",
        ts(1),
    ))
    .await
    .unwrap();

    let running = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run_cycle().await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_ne!(orchestrator.state(), CycleState::Idle);
    let err = orchestrator.run_cycle().await.unwrap_err();
    assert!(matches!(err, SyncError::CycleInProgress));

    let report = running.await.unwrap().unwrap();
    assert_eq!(report.notified, 1);
    assert_eq!(orchestrator.state(), CycleState::Idle);

    // Guard is free again
    let report = orchestrator.run_cycle().await.unwrap();
    assert_eq!(report.notified, 0);
}
