//! Persistence seam for benchmark configs.
//!
//! [`ConfigStore`] is the only shared mutable resource in the queue. Every
//! state-changing method is a single atomic read-modify-write: an
//! implementation must either apply the whole update or leave every row in
//! its prior state. A SQL backend maps `claim_pending` onto
//! `UPDATE ... WHERE id IN (SELECT ... FOR UPDATE SKIP LOCKED) RETURNING *`;
//! [`MemoryConfigStore`] gets the same guarantee from one write-lock
//! critical section that filters on `status = pending` and returns only the
//! rows it changed.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{CatalogError, Result};
use crate::queue::job::{JobConfig, JobStatus, MatrixKey};

/// Terminal outcome reported by the worker holding a config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Completed,
    Failed(String),
}

impl Completion {
    pub fn status(&self) -> JobStatus {
        match self {
            Completion::Completed => JobStatus::Completed,
            Completion::Failed(_) => JobStatus::Failed,
        }
    }
}

/// Per-status row counts for one model version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.running + self.completed + self.failed
    }

    fn bump(&mut self, status: JobStatus) {
        match status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Running => self.running += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed => self.failed += 1,
        }
    }
}

/// Result of one stale sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StaleReset {
    /// Configs returned to `pending`.
    pub reset: Vec<Uuid>,
    /// Configs that hit the retry bound and were marked `failed` instead.
    pub failed: Vec<Uuid>,
}

impl StaleReset {
    pub fn is_empty(&self) -> bool {
        self.reset.is_empty() && self.failed.is_empty()
    }
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Insert every config whose [`MatrixKey`] is not yet present, in one
    /// write. Existing rows are left untouched. Returns the number inserted.
    async fn insert_missing(&self, configs: Vec<JobConfig>) -> Result<usize>;

    /// Atomically move up to `limit` pending configs with
    /// `priority <= priority_threshold` to `running`, ordered by
    /// (priority, created_at). Rows already claimed by a concurrent caller
    /// are never returned twice.
    async fn claim_pending(
        &self,
        limit: usize,
        priority_threshold: i32,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobConfig>>;

    /// Compare-and-set a `running` config to its terminal status.
    async fn finish(&self, id: Uuid, completion: Completion, now: DateTime<Utc>)
        -> Result<JobConfig>;

    /// Reclaim every `running` config whose `started_at` is strictly older
    /// than `cutoff`. With `max_retries = Some(n)`, configs that have already
    /// been retried `n` times are failed instead of recycled.
    async fn reset_stale(
        &self,
        cutoff: DateTime<Utc>,
        max_retries: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<StaleReset>;

    async fn get(&self, id: Uuid) -> Result<Option<JobConfig>>;

    async fn status_counts(&self, model_version_id: Uuid) -> Result<StatusCounts>;

    /// Configs of one model version ordered by (priority, created_at).
    async fn list_by_model_version(
        &self,
        model_version_id: Uuid,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<JobConfig>>;
}

#[derive(Debug)]
struct Row {
    config: JobConfig,
    /// Insertion order, breaks created_at ties inside one bulk insert.
    seq: u64,
}

type PendingEntry = (i32, DateTime<Utc>, u64, Uuid);
type RunningEntry = (DateTime<Utc>, Uuid);

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<Uuid, Row>,
    keys: HashMap<MatrixKey, Uuid>,
    /// status = pending ordered by (priority, created_at)
    pending: BTreeSet<PendingEntry>,
    /// status = running ordered by started_at
    running: BTreeSet<RunningEntry>,
    next_seq: u64,
}

impl Tables {
    fn pending_entry(row: &Row) -> PendingEntry {
        (
            row.config.priority,
            row.config.created_at,
            row.seq,
            row.config.id,
        )
    }
}

/// In-process [`ConfigStore`] backed by indexed maps behind one lock.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    tables: RwLock<Tables>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tables.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tables.read().await.rows.is_empty()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn insert_missing(&self, configs: Vec<JobConfig>) -> Result<usize> {
        let mut tables = self.tables.write().await;
        let mut inserted = 0;

        for config in configs {
            let key = config.key();
            if tables.keys.contains_key(&key) {
                continue;
            }
            let seq = tables.next_seq;
            tables.next_seq += 1;

            let row = Row { config, seq };
            let id = row.config.id;
            match row.config.status {
                JobStatus::Pending => {
                    tables.pending.insert(Tables::pending_entry(&row));
                }
                JobStatus::Running => {
                    if let Some(started_at) = row.config.started_at {
                        tables.running.insert((started_at, id));
                    }
                }
                _ => {}
            }
            tables.keys.insert(key, id);
            tables.rows.insert(id, row);
            inserted += 1;
        }

        Ok(inserted)
    }

    async fn claim_pending(
        &self,
        limit: usize,
        priority_threshold: i32,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobConfig>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut tables = self.tables.write().await;
        let selected: Vec<PendingEntry> = tables
            .pending
            .iter()
            .take_while(|(priority, ..)| *priority <= priority_threshold)
            .take(limit)
            .copied()
            .collect();

        let mut claimed = Vec::with_capacity(selected.len());
        for entry in selected {
            tables.pending.remove(&entry);
            let id = entry.3;
            let Some(row) = tables.rows.get_mut(&id) else {
                continue;
            };
            // Conditional update: only rows still pending change hands.
            if row.config.status != JobStatus::Pending {
                continue;
            }
            row.config.status = JobStatus::Running;
            row.config.started_at = Some(now);
            claimed.push(row.config.clone());
            tables.running.insert((now, id));
        }

        Ok(claimed)
    }

    async fn finish(
        &self,
        id: Uuid,
        completion: Completion,
        now: DateTime<Utc>,
    ) -> Result<JobConfig> {
        let mut tables = self.tables.write().await;
        let row = tables
            .rows
            .get_mut(&id)
            .ok_or(CatalogError::ConfigNotFound(id))?;

        if row.config.status != JobStatus::Running {
            return Err(CatalogError::InvalidTransition {
                id,
                from: row.config.status,
                to: completion.status(),
            });
        }

        let started_at = row.config.started_at;
        row.config.status = completion.status();
        row.config.completed_at = Some(now);
        if let Completion::Failed(message) = completion {
            row.config.error_message = Some(message);
        }
        let updated = row.config.clone();

        if let Some(started_at) = started_at {
            tables.running.remove(&(started_at, id));
        }
        Ok(updated)
    }

    async fn reset_stale(
        &self,
        cutoff: DateTime<Utc>,
        max_retries: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<StaleReset> {
        let mut tables = self.tables.write().await;
        let stale: Vec<RunningEntry> = tables
            .running
            .range(..(cutoff, Uuid::nil()))
            .copied()
            .collect();

        let mut outcome = StaleReset::default();
        for entry in stale {
            tables.running.remove(&entry);
            let id = entry.1;
            let Some(row) = tables.rows.get_mut(&id) else {
                continue;
            };
            if row.config.status != JobStatus::Running {
                continue;
            }

            let exhausted = max_retries.is_some_and(|max| row.config.retry_count >= max);
            if exhausted {
                row.config.status = JobStatus::Failed;
                row.config.completed_at = Some(now);
                row.config.error_message = Some(format!(
                    "stale after {} retries, retry limit reached",
                    row.config.retry_count
                ));
                outcome.failed.push(id);
            } else {
                row.config.status = JobStatus::Pending;
                row.config.started_at = None;
                row.config.retry_count += 1;
                let pending = Tables::pending_entry(row);
                tables.pending.insert(pending);
                outcome.reset.push(id);
            }
        }

        Ok(outcome)
    }

    async fn get(&self, id: Uuid) -> Result<Option<JobConfig>> {
        let tables = self.tables.read().await;
        Ok(tables.rows.get(&id).map(|row| row.config.clone()))
    }

    async fn status_counts(&self, model_version_id: Uuid) -> Result<StatusCounts> {
        let tables = self.tables.read().await;
        let mut counts = StatusCounts::default();
        for row in tables.rows.values() {
            if row.config.model_version_id == model_version_id {
                counts.bump(row.config.status);
            }
        }
        Ok(counts)
    }

    async fn list_by_model_version(
        &self,
        model_version_id: Uuid,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<JobConfig>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<&Row> = tables
            .rows
            .values()
            .filter(|row| row.config.model_version_id == model_version_id)
            .filter(|row| status.map_or(true, |s| row.config.status == s))
            .collect();
        rows.sort_by_key(|row| (row.config.priority, row.config.created_at, row.seq));
        Ok(rows
            .into_iter()
            .take(limit)
            .map(|row| row.config.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn config(priority: i32, batch_size: u32, created_at: DateTime<Utc>) -> JobConfig {
        JobConfig::new(
            MatrixKey {
                model_version_id: Uuid::nil(),
                hardware_config: "l4-x1".to_string(),
                framework: "vllm".to_string(),
                workload_type: "chatbot".to_string(),
                batch_size,
                sequence_length: 1024,
            },
            priority,
            created_at,
        )
    }

    #[tokio::test]
    async fn insert_missing_skips_existing_keys() {
        let store = MemoryConfigStore::new();
        let now = Utc::now();

        let first = store
            .insert_missing(vec![config(100, 1, now), config(110, 2, now)])
            .await
            .unwrap();
        assert_eq!(first, 2);

        let second = store
            .insert_missing(vec![config(100, 1, now), config(130, 4, now)])
            .await
            .unwrap();
        assert_eq!(second, 1);
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn claim_respects_priority_then_insertion_order() {
        let store = MemoryConfigStore::new();
        let now = Utc::now();
        store
            .insert_missing(vec![
                config(300, 1, now),
                config(100, 2, now),
                config(100, 4, now),
                config(900, 8, now),
            ])
            .await
            .unwrap();

        let claimed = store.claim_pending(10, 500, now).await.unwrap();
        let batch_sizes: Vec<u32> = claimed.iter().map(|c| c.batch_size).collect();
        assert_eq!(batch_sizes, vec![2, 4, 1]);
        assert!(claimed.iter().all(|c| c.status == JobStatus::Running));
        assert!(claimed.iter().all(|c| c.started_at == Some(now)));

        // The priority-900 config stays pending.
        let counts = store.status_counts(Uuid::nil()).await.unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.running, 3);
    }

    #[tokio::test]
    async fn claim_with_zero_limit_is_empty() {
        let store = MemoryConfigStore::new();
        store
            .insert_missing(vec![config(100, 1, Utc::now())])
            .await
            .unwrap();
        assert!(store
            .claim_pending(0, 1000, Utc::now())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn finish_requires_running() {
        let store = MemoryConfigStore::new();
        let now = Utc::now();
        let cfg = config(100, 1, now);
        let id = cfg.id;
        store.insert_missing(vec![cfg]).await.unwrap();

        let err = store.finish(id, Completion::Completed, now).await.unwrap_err();
        assert!(matches!(
            err,
            CatalogError::InvalidTransition {
                from: JobStatus::Pending,
                to: JobStatus::Completed,
                ..
            }
        ));

        store.claim_pending(1, 1000, now).await.unwrap();
        let done = store
            .finish(id, Completion::Failed("oom".to_string()), now)
            .await
            .unwrap();
        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(done.error_message.as_deref(), Some("oom"));
        assert_eq!(done.completed_at, Some(now));
    }

    #[tokio::test]
    async fn finish_unknown_config() {
        let store = MemoryConfigStore::new();
        let id = Uuid::new_v4();
        let err = store
            .finish(id, Completion::Completed, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::ConfigNotFound(missing) if missing == id));
    }

    #[tokio::test]
    async fn reset_stale_only_touches_configs_older_than_cutoff() {
        let store = MemoryConfigStore::new();
        let t0 = Utc::now();
        store
            .insert_missing(vec![config(100, 1, t0), config(110, 2, t0)])
            .await
            .unwrap();

        let early = store.claim_pending(1, 1000, t0).await.unwrap();
        let late = store
            .claim_pending(1, 1000, t0 + Duration::minutes(90))
            .await
            .unwrap();

        let swept = store
            .reset_stale(t0 + Duration::minutes(60), None, t0 + Duration::minutes(120))
            .await
            .unwrap();
        assert_eq!(swept.reset, vec![early[0].id]);
        assert!(swept.failed.is_empty());

        let reclaimed = store.get(early[0].id).await.unwrap().unwrap();
        assert_eq!(reclaimed.status, JobStatus::Pending);
        assert_eq!(reclaimed.retry_count, 1);
        assert!(reclaimed.started_at.is_none());

        let untouched = store.get(late[0].id).await.unwrap().unwrap();
        assert_eq!(untouched.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn reset_stale_fails_configs_past_retry_bound() {
        let store = MemoryConfigStore::new();
        let t0 = Utc::now();
        let cfg = config(100, 1, t0);
        let id = cfg.id;
        store.insert_missing(vec![cfg]).await.unwrap();

        store.claim_pending(1, 1000, t0).await.unwrap();
        let first = store
            .reset_stale(t0 + Duration::minutes(1), Some(1), t0 + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(first.reset, vec![id]);

        store.claim_pending(1, 1000, t0 + Duration::minutes(2)).await.unwrap();
        let second = store
            .reset_stale(t0 + Duration::minutes(5), Some(1), t0 + Duration::minutes(5))
            .await
            .unwrap();
        assert!(second.reset.is_empty());
        assert_eq!(second.failed, vec![id]);

        let failed = store.get(id).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed.error_message.is_some());
    }

    #[tokio::test]
    async fn list_by_model_version_filters_and_orders() {
        let store = MemoryConfigStore::new();
        let now = Utc::now();
        let mut other = config(50, 1, now);
        other.model_version_id = Uuid::new_v4();
        store
            .insert_missing(vec![config(300, 1, now), config(100, 2, now), other])
            .await
            .unwrap();

        let listed = store
            .list_by_model_version(Uuid::nil(), None, 10)
            .await
            .unwrap();
        let priorities: Vec<i32> = listed.iter().map(|c| c.priority).collect();
        assert_eq!(priorities, vec![100, 300]);

        let running = store
            .list_by_model_version(Uuid::nil(), Some(JobStatus::Running), 10)
            .await
            .unwrap();
        assert!(running.is_empty());
    }
}
