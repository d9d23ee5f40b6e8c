use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{CatalogError, Result};
use crate::queue::job::{JobConfig, JobStatus};
use crate::queue::store::{Completion, ConfigStore, StaleReset};

/// Source of "now" for queue timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Aggregate completion state of one model version's matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    /// completed / total, as a percentage rounded to two decimals
    pub percent_complete: f64,
}

/// Owns every status transition of benchmark configs.
///
/// The queue holds no state of its own besides the store handle: atomicity
/// of each operation is delegated to a single [`ConfigStore`] call, so any
/// number of `ConfigQueue` clones (or processes sharing the same store) can
/// serve workers concurrently.
#[derive(Clone)]
pub struct ConfigQueue {
    store: Arc<dyn ConfigStore>,
    clock: Arc<dyn Clock>,
    max_retries: Option<u32>,
}

impl ConfigQueue {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            max_retries: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Bound on stale recycles before a config is failed. `None` recycles forever.
    pub fn with_max_retries(mut self, max_retries: Option<u32>) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    /// Claim up to `limit` pending configs with `priority <= priority_threshold`.
    ///
    /// Concurrent callers receive disjoint batches. An empty vector means
    /// nothing is eligible right now.
    pub async fn dequeue_batch(
        &self,
        limit: usize,
        priority_threshold: i32,
    ) -> Result<Vec<JobConfig>> {
        let now = self.clock.now();
        let batch = self
            .store
            .claim_pending(limit, priority_threshold, now)
            .await?;
        if !batch.is_empty() {
            tracing::debug!(
                count = batch.len(),
                limit,
                priority_threshold,
                "Dequeued config batch"
            );
        }
        Ok(batch)
    }

    pub async fn mark_completed(&self, id: Uuid) -> Result<JobConfig> {
        let config = self
            .store
            .finish(id, Completion::Completed, self.clock.now())
            .await?;
        tracing::info!(config_id = %id, "Config completed");
        Ok(config)
    }

    pub async fn mark_failed(&self, id: Uuid, error_message: impl Into<String>) -> Result<JobConfig> {
        let message = error_message.into();
        let config = self
            .store
            .finish(id, Completion::Failed(message.clone()), self.clock.now())
            .await?;
        tracing::info!(config_id = %id, error = %message, "Config failed");
        Ok(config)
    }

    /// Return every config stuck in `running` for longer than `timeout` to
    /// `pending`. Safe to run alongside dequeues and acknowledgements: a
    /// config acknowledged first is no longer `running` and is skipped.
    pub async fn reset_stale(&self, timeout: Duration) -> Result<StaleReset> {
        if timeout < Duration::zero() {
            return Err(CatalogError::InvalidRequest(
                "stale timeout must not be negative".to_string(),
            ));
        }
        let now = self.clock.now();
        // A timeout reaching past the representable range leaves nothing stale.
        let Some(cutoff) = now.checked_sub_signed(timeout) else {
            return Ok(StaleReset::default());
        };
        let outcome = self
            .store
            .reset_stale(cutoff, self.max_retries, now)
            .await?;

        if !outcome.is_empty() {
            tracing::info!(
                reset = outcome.reset.len(),
                failed = outcome.failed.len(),
                timeout_minutes = timeout.num_minutes(),
                "Reclaimed stale configs"
            );
        }
        for id in &outcome.failed {
            tracing::warn!(config_id = %id, max_retries = ?self.max_retries, "Config exceeded retry limit");
        }
        Ok(outcome)
    }

    pub async fn progress(&self, model_version_id: Uuid) -> Result<Progress> {
        let counts = self.store.status_counts(model_version_id).await?;
        let total = counts.total();
        let percent_complete = if total == 0 {
            0.0
        } else {
            (counts.completed as f64 / total as f64 * 10_000.0).round() / 100.0
        };

        Ok(Progress {
            total,
            pending: counts.pending,
            running: counts.running,
            completed: counts.completed,
            failed: counts.failed,
            percent_complete,
        })
    }

    pub async fn get(&self, id: Uuid) -> Result<JobConfig> {
        self.store
            .get(id)
            .await?
            .ok_or(CatalogError::ConfigNotFound(id))
    }

    pub async fn configs_for_model_version(
        &self,
        model_version_id: Uuid,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<JobConfig>> {
        self.store
            .list_by_model_version(model_version_id, status, limit)
            .await
    }
}

impl std::fmt::Debug for ConfigQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigQueue")
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}
