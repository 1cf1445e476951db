use std::future::Future;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};

use super::orchestrator::{CycleReport, Orchestrator, SyncError};

/// Default time between cycles (10 minutes)
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(600);

/// Runs a cycle on a fixed period until shut down.
pub struct Scheduler {
    orchestrator: Orchestrator,
    period: Duration,
}

impl Scheduler {
    pub fn new(orchestrator: Orchestrator, period: Duration) -> Self {
        Self {
            orchestrator,
            period,
        }
    }

    /// Run cycles until `shutdown` resolves.
    ///
    /// The first cycle starts immediately. A tick that fires while the
    /// previous cycle is still running is skipped, and a failed cycle is only
    /// logged, except for a multiplexer failure which ends the loop.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Multiplexer`] when the transfer machinery fails.
    pub async fn run<F>(&self, shutdown: F) -> Result<(), SyncError>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            "Sync scheduler started (interval: {} seconds)",
            self.period.as_secs()
        );

        let mut timer = interval(self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Sync scheduler stopping");
                    return Ok(());
                }
                _ = timer.tick() => {}
            }

            settle(self.orchestrator.run_cycle().await)?;
        }
    }
}

/// Log a cycle's outcome; only errors that should stop the scheduler are returned.
fn settle(outcome: Result<CycleReport, SyncError>) -> Result<(), SyncError> {
    match outcome {
        Ok(_) => Ok(()),
        Err(SyncError::CycleInProgress) => {
            tracing::debug!("Previous cycle still running, skipping tick");
            Ok(())
        }
        Err(SyncError::Store(e)) => {
            tracing::error!(error = %e, "Sync cycle aborted");
            Ok(())
        }
        Err(e @ SyncError::Multiplexer(_)) => {
            tracing::error!(error = %e, "Sync scheduler stopped by fatal error");
            Err(e)
        }
    }
}
