use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Semaphore;

use crate::feed::{
    compute_delta, parse_feed, CompletedJob, MultiplexError, ParsedFeed, TransferLimits,
    TransferMultiplexer, DEFAULT_MAX_IN_FLIGHT, DEFAULT_POLL_INTERVAL,
};
use crate::notify::{format_notification, NotificationSink};
use crate::storage::{Database, StoreError, Subscription};

/// Errors that end a synchronization cycle early.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Another cycle holds the single-flight guard
    #[error("A synchronization cycle is already running")]
    CycleInProgress,
    /// The subscription listing could not be read
    #[error("Could not list subscriptions: {0}")]
    Store(#[from] StoreError),
    /// The transfer machinery failed; not recoverable
    #[error(transparent)]
    Multiplexer(#[from] MultiplexError),
}

/// Where the current cycle is, as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    /// Reading subscriptions and submitting their transfers
    Listing,
    /// Driving transfers while some are still waiting for a slot
    Fetching,
    /// Every transfer has started; collecting the remaining completions
    Draining,
}

/// Outcome of one cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Subscriptions listed
    pub total: usize,
    /// Subscriptions fetched, parsed and checkpointed without error
    pub succeeded: usize,
    /// Subscriptions skipped because of a transfer, parse or checkpoint failure
    pub failed: usize,
    /// Messages accepted by the sink
    pub notified: usize,
    /// Checkpoints moved forward
    pub advanced: usize,
}

/// Tuning knobs for a cycle.
#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    pub poll_interval: Duration,
    pub max_in_flight: usize,
    pub limits: TransferLimits,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            limits: TransferLimits::default(),
        }
    }
}

struct Inner {
    db: Database,
    client: reqwest::Client,
    sink: Arc<dyn NotificationSink>,
    settings: SyncSettings,
    guard: Semaphore,
    state: Mutex<CycleState>,
}

/// Runs synchronization cycles over every stored subscription.
///
/// Cheap to clone; clones share the same single-flight guard, so at most one
/// cycle runs at a time no matter which clone starts it.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

/// Puts the observable state back to `Idle` however the cycle ends.
struct StateReset<'a>(&'a Orchestrator);

impl Drop for StateReset<'_> {
    fn drop(&mut self) {
        self.0.set_state(CycleState::Idle);
    }
}

impl Orchestrator {
    pub fn new(
        db: Database,
        client: reqwest::Client,
        sink: Arc<dyn NotificationSink>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                db,
                client,
                sink,
                settings,
                guard: Semaphore::new(1),
                state: Mutex::new(CycleState::Idle),
            }),
        }
    }

    pub fn state(&self) -> CycleState {
        *self
            .inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: CycleState) {
        *self
            .inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }

    /// Run one full cycle: fetch every subscription, announce new entries and
    /// advance checkpoints.
    ///
    /// Failures of a single subscription are logged and counted in the
    /// report; they never end the cycle.
    ///
    /// # Errors
    ///
    /// - [`SyncError::CycleInProgress`] if a cycle is already running; the
    ///   call is rejected, not queued
    /// - [`SyncError::Store`] if the subscriptions cannot be listed
    /// - [`SyncError::Multiplexer`] if the transfer machinery fails
    pub async fn run_cycle(&self) -> Result<CycleReport, SyncError> {
        let _permit = self
            .inner
            .guard
            .try_acquire()
            .map_err(|_| SyncError::CycleInProgress)?;
        let _reset = StateReset(self);

        let started = Instant::now();
        let settings = self.inner.settings;
        let mut report = CycleReport::default();
        let mut mux = TransferMultiplexer::new(
            self.inner.client.clone(),
            settings.limits,
            settings.max_in_flight,
        );

        self.set_state(CycleState::Listing);
        report.total = self.submit_all(&mut mux).await?;
        tracing::debug!(total = report.total, "Subscriptions listed");

        while !mux.is_idle() {
            self.set_state(if mux.queued() > 0 {
                CycleState::Fetching
            } else {
                CycleState::Draining
            });
            for job in mux.drive(settings.poll_interval).await? {
                self.process(job, &mut report).await;
            }
        }

        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            notified = report.notified,
            advanced = report.advanced,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "{}/{} feeds synchronized",
            report.succeeded,
            report.total
        );
        Ok(report)
    }

    /// Read the whole listing, submitting each subscription as it arrives.
    ///
    /// The cursor is dropped before returning so no read is open while
    /// checkpoints are written.
    async fn submit_all(
        &self,
        mux: &mut TransferMultiplexer<Subscription>,
    ) -> Result<usize, StoreError> {
        let mut cursor = self.inner.db.begin_listing().await?;
        let mut submitted = 0;
        while let Some(subscription) = cursor.next().await? {
            let handle = mux.submit(subscription.url.clone(), subscription);
            tracing::trace!(%handle, "Subscription submitted");
            submitted += 1;
        }
        Ok(submitted)
    }

    async fn process(&self, job: CompletedJob<Subscription>, report: &mut CycleReport) {
        let subscription = job.context;

        let body = match job.result {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(
                    url = %subscription.url,
                    channel_id = subscription.channel_id,
                    error = %e,
                    "Failed to fetch feed"
                );
                report.failed += 1;
                return;
            }
        };

        let ParsedFeed { title, entries } = match parse_feed(&body) {
            Ok(feed) => feed,
            Err(e) => {
                tracing::warn!(
                    url = %subscription.url,
                    channel_id = subscription.channel_id,
                    error = %e,
                    "Failed to parse feed"
                );
                report.failed += 1;
                return;
            }
        };

        let feed_title = if subscription.title.trim().is_empty() {
            title.as_str()
        } else {
            subscription.title.as_str()
        };

        let delta = compute_delta(entries, subscription.last_pubdate);
        for entry in &delta.new_entries {
            let text = format_notification(feed_title, entry);
            match self.inner.sink.post(subscription.channel_id, &text).await {
                Ok(()) => report.notified += 1,
                Err(e) => tracing::warn!(
                    sink = self.inner.sink.name(),
                    url = %subscription.url,
                    channel_id = subscription.channel_id,
                    error = %e,
                    "Failed to deliver notification"
                ),
            }
        }

        if let Some(checkpoint) = delta.advanced_checkpoint(subscription.last_pubdate) {
            if let Err(e) = self
                .inner
                .db
                .update_checkpoint(&subscription.url, subscription.channel_id, checkpoint)
                .await
            {
                tracing::error!(
                    url = %subscription.url,
                    channel_id = subscription.channel_id,
                    error = %e,
                    "Failed to advance checkpoint"
                );
                report.failed += 1;
                return;
            }
            report.advanced += 1;
            tracing::debug!(
                url = %subscription.url,
                channel_id = subscription.channel_id,
                new_entries = delta.new_entries.len(),
                "Checkpoint advanced"
            );
        }

        report.succeeded += 1;
    }
}
