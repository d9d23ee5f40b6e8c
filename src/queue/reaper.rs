use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::queue::config_queue::ConfigQueue;

/// Periodically returns stale `running` configs to the queue.
///
/// This is the only recovery path for workers that die between dequeue and
/// acknowledgement, so `stale_timeout` must exceed the slowest single job.
pub struct StaleReaper {
    queue: ConfigQueue,
    interval: Duration,
    stale_timeout: chrono::Duration,
}

impl StaleReaper {
    pub fn new(queue: ConfigQueue, interval: Duration, stale_timeout: chrono::Duration) -> Self {
        Self {
            queue,
            interval,
            stale_timeout,
        }
    }

    /// Run one sweep. Returns the number of configs touched.
    pub async fn sweep(&self) -> usize {
        match self.queue.reset_stale(self.stale_timeout).await {
            Ok(outcome) => outcome.reset.len() + outcome.failed.len(),
            Err(e) => {
                tracing::warn!(error = %e, "Stale sweep failed, will retry next interval");
                0
            }
        }
    }

    /// Sweep every `interval` until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        // The first tick completes immediately; skip it so a restart does not
        // sweep before workers had a chance to acknowledge.
        ticker.tick().await;

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            stale_timeout_minutes = self.stale_timeout.num_minutes(),
            "Stale reaper started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Stale reaper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep().await;
                }
            }
        }
    }
}
