//! Concurrent feed downloads driven by a polling loop.
//!
//! The multiplexer owns every transfer from [`submit`](TransferMultiplexer::submit)
//! until it is handed back by [`drive`](TransferMultiplexer::drive). Callers
//! attach a context value to each job (typically the subscription it belongs
//! to); it is kept in a table keyed by [`JobHandle`] and returned with the
//! completed job, so nothing has to be correlated by hand.
//!
//! ```text
//! submit ──► queued ──► running (≤ max_in_flight) ──► drive() ──► CompletedJob
//! ```
//!
//! A slow or hanging source only occupies one slot; `drive` never waits
//! longer than its poll budget before returning control.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tokio::task::{JoinError, JoinSet};

use super::fetcher::{fetch_document, FetchError, TransferLimits};

/// Default wait for a completion inside one `drive` call
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Default number of transfers allowed to run at once
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// Failure of the multiplexing machinery itself, not of a single transfer.
///
/// There is no recovering from this inside a cycle.
#[derive(Debug, Error)]
pub enum MultiplexError {
    #[error("Transfer multiplexer failed: {0}")]
    Substrate(String),
}

impl From<JoinError> for MultiplexError {
    fn from(err: JoinError) -> Self {
        MultiplexError::Substrate(err.to_string())
    }
}

/// Identifies one submitted transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobHandle(u64);

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job#{}", self.0)
    }
}

/// A transfer that finished, successfully or not.
#[derive(Debug)]
pub struct CompletedJob<C> {
    pub handle: JobHandle,
    pub url: String,
    pub context: C,
    /// Response body, or why the transfer failed
    pub result: Result<Vec<u8>, FetchError>,
}

struct TransferJob<C> {
    url: String,
    context: C,
}

type TransferOutput = (JobHandle, Result<Vec<u8>, FetchError>);

pub struct TransferMultiplexer<C> {
    client: reqwest::Client,
    limits: TransferLimits,
    max_in_flight: usize,
    next_handle: u64,
    jobs: HashMap<JobHandle, TransferJob<C>>,
    queued: VecDeque<JobHandle>,
    running: JoinSet<TransferOutput>,
}

impl<C> TransferMultiplexer<C> {
    /// Create a multiplexer that runs at most `max_in_flight` transfers at once.
    ///
    /// A `max_in_flight` of zero is treated as one.
    pub fn new(client: reqwest::Client, limits: TransferLimits, max_in_flight: usize) -> Self {
        Self {
            client,
            limits,
            max_in_flight: max_in_flight.max(1),
            next_handle: 0,
            jobs: HashMap::new(),
            queued: VecDeque::new(),
            running: JoinSet::new(),
        }
    }

    /// Register a transfer for `url`.
    ///
    /// The transfer starts immediately when a slot is free, otherwise it waits
    /// for a later `drive` call to launch it. Must be called from within a
    /// tokio runtime.
    pub fn submit(&mut self, url: impl Into<String>, context: C) -> JobHandle {
        let handle = JobHandle(self.next_handle);
        self.next_handle += 1;

        self.jobs.insert(
            handle,
            TransferJob {
                url: url.into(),
                context,
            },
        );
        self.queued.push_back(handle);
        self.launch_queued();

        handle
    }

    /// Advance all transfers and return those that completed.
    ///
    /// Waits up to `poll_timeout` for the first completion, then collects
    /// every other completion that is already available without waiting.
    /// Returns an empty vector when nothing finished within the budget.
    ///
    /// # Errors
    ///
    /// Returns [`MultiplexError::Substrate`] if a transfer task panicked or
    /// was cancelled, or reported a job this multiplexer does not know.
    pub async fn drive(
        &mut self,
        poll_timeout: Duration,
    ) -> Result<Vec<CompletedJob<C>>, MultiplexError> {
        let mut completed = Vec::new();
        self.launch_queued();

        if self.running.is_empty() {
            return Ok(completed);
        }

        match tokio::time::timeout(poll_timeout, self.running.join_next()).await {
            Ok(Some(joined)) => completed.push(self.finish(joined?)?),
            Ok(None) | Err(_) => return Ok(completed),
        }

        while let Some(joined) = self.running.try_join_next() {
            completed.push(self.finish(joined?)?);
        }

        self.launch_queued();
        Ok(completed)
    }

    /// True once every submitted job has been returned by `drive`.
    pub fn is_idle(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Jobs submitted but not yet started
    pub fn queued(&self) -> usize {
        self.queued.len()
    }

    /// Jobs currently transferring
    pub fn in_flight(&self) -> usize {
        self.running.len()
    }

    fn launch_queued(&mut self) {
        while self.running.len() < self.max_in_flight {
            let Some(handle) = self.queued.pop_front() else {
                break;
            };
            let Some(job) = self.jobs.get(&handle) else {
                continue;
            };

            let client = self.client.clone();
            let url = job.url.clone();
            let limits = self.limits;
            self.running.spawn(async move {
                let result = fetch_document(&client, &url, limits).await;
                (handle, result)
            });
            tracing::trace!(%handle, url = %job.url, "Transfer started");
        }
    }

    fn finish(&mut self, output: TransferOutput) -> Result<CompletedJob<C>, MultiplexError> {
        let (handle, result) = output;
        let job = self.jobs.remove(&handle).ok_or_else(|| {
            MultiplexError::Substrate(format!("completion for unknown {}", handle))
        })?;

        Ok(CompletedJob {
            handle,
            url: job.url,
            context: job.context,
            result,
        })
    }
}
