//! Benchmark configuration job queue.
//!
//! - [`matrix`]: expands test dimensions into pending configs
//! - [`store`]: the [`ConfigStore`] persistence seam and its in-memory backend
//! - [`config_queue`]: dequeue, acknowledgement, stale recovery and progress
//! - [`reaper`]: background task driving stale recovery
//!
//! # Lifecycle
//!
//! ```text
//! pending --dequeue_batch--> running --mark_completed--> completed
//!    ^                          |  \--mark_failed-----> failed
//!    +------reset_stale---------+
//! ```

pub mod config_queue;
pub mod job;
pub mod matrix;
pub mod reaper;
pub mod store;

pub use config_queue::{Clock, ConfigQueue, Progress, SystemClock};
pub use job::{JobConfig, JobStatus, MatrixKey};
pub use matrix::{MatrixOutcome, MatrixPreview, MatrixSpec};
pub use reaper::StaleReaper;
pub use store::{ConfigStore, MemoryConfigStore, StaleReset};
