use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Completed and failed configs are never handed out again by the queue.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

/// The six dimensions that identify one cell of a test matrix.
/// No two configs in a store may share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatrixKey {
    pub model_version_id: Uuid,
    pub hardware_config: String,
    pub framework: String,
    pub workload_type: String,
    pub batch_size: u32,
    pub sequence_length: u32,
}

impl std::fmt::Display for MatrixKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/bs{}/seq{}",
            self.model_version_id,
            self.hardware_config,
            self.framework,
            self.workload_type,
            self.batch_size,
            self.sequence_length
        )
    }
}

/// One benchmark configuration tracked by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub id: Uuid,
    pub model_version_id: Uuid,
    pub hardware_config: String,
    pub framework: String,
    pub workload_type: String,
    pub batch_size: u32,
    pub sequence_length: u32,
    pub status: JobStatus,
    /// Lower values are dequeued first.
    pub priority: i32,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobConfig {
    pub fn new(key: MatrixKey, priority: i32, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            model_version_id: key.model_version_id,
            hardware_config: key.hardware_config,
            framework: key.framework,
            workload_type: key.workload_type,
            batch_size: key.batch_size,
            sequence_length: key.sequence_length,
            status: JobStatus::Pending,
            priority,
            retry_count: 0,
            error_message: None,
            created_at,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn key(&self) -> MatrixKey {
        MatrixKey {
            model_version_id: self.model_version_id,
            hardware_config: self.hardware_config.clone(),
            framework: self.framework.clone(),
            workload_type: self.workload_type.clone(),
            batch_size: self.batch_size,
            sequence_length: self.sequence_length,
        }
    }
}
