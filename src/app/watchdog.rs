use std::future::Future;
use std::time::Duration;

use crate::app::lifecycle::JobLifecycle;
use crate::app::model::{ContentStatus, Document};
use crate::app::status::StatusCounts;

pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone)]
pub struct SweepReport {
    pub reset: Vec<Document>,
    pub counts: StatusCounts,
}

/// Periodically returns abandoned `extracting` claims to the pool.
pub struct Watchdog {
    lifecycle: JobLifecycle,
    stale_after: Duration,
    interval: Duration,
}

impl Watchdog {
    pub fn new(lifecycle: JobLifecycle, stale_after: Duration, interval: Duration) -> Self {
        Self {
            lifecycle,
            stale_after,
            interval,
        }
    }

    pub async fn sweep(&self) -> anyhow::Result<SweepReport> {
        let reset = self.lifecycle.reset_stale_claims(self.stale_after).await?;
        let counts = StatusCounts::collect(self.lifecycle.store().as_ref()).await?;
        tracing::info!(
            reset = reset.len(),
            pending = counts.get(ContentStatus::Pending),
            extracting = counts.get(ContentStatus::Extracting),
            extracted = counts.get(ContentStatus::Extracted),
            failed = counts.get(ContentStatus::Failed),
            "watchdog sweep"
        );
        Ok(SweepReport { reset, counts })
    }

    /// Sweeps every `interval` until `shutdown` resolves. Each report is
    /// handed to `on_sweep`.
    pub async fn run<S>(
        &self,
        shutdown: S,
        mut on_sweep: impl FnMut(&SweepReport),
    ) -> anyhow::Result<()>
    where
        S: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("watchdog stopping");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    let report = self.sweep().await?;
                    on_sweep(&report);
                }
            }
        }
    }
}
