//! # queuectl
//!
//! A persistent queue of shell commands backed by SQLite.
//!
//! Jobs are enqueued as `pending`, claimed atomically by workers, executed
//! through the platform shell, and resolved as `completed`, retried with
//! exponential backoff, or moved to the dead letter queue once their retries
//! are exhausted. Workers in separate processes coordinate through the
//! database only.
//!
//! ```no_run
//! use queuectl::{JobSpec, WorkerOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let worker = WorkerOptions::default()
//!     .database_url("sqlite://data/queue.db")
//!     .init()
//!     .await?;
//!
//! let utils = worker.create_utils();
//! utils.add_job(JobSpec::new("echo hello")).await?;
//!
//! worker.run_once().await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod db;
pub mod errors;
pub mod job_spec;
pub mod launcher;
pub mod retry;
pub mod runner;
pub mod sql;
pub mod worker_utils;

pub use crate::builder::{WorkerBuildError, WorkerOptions};
pub use crate::errors::{QueueError, Result};
pub use crate::job_spec::{JobSpec, JobSpecBuilder, JobSpecError};
pub use crate::launcher::{
    launch_workers, stop_workers, InProcessHandle, InProcessLauncher, LaunchError, WorkerHandle,
    WorkerLauncher,
};
pub use crate::retry::{AttemptOutcome, RetryDecision, RetryPolicy};
pub use crate::runner::{ProcessJobError, ReleaseJobError, Worker, WorkerRuntimeError, WorkerState};
pub use crate::sql::config::ConfigKey;
pub use crate::sql::queue_details::QueueSummary;
pub use crate::worker_utils::WorkerUtils;

pub use queuectl_command_runner::{CommandOutput, CommandRunner, ExecutionFault, ShellRunner};
pub use queuectl_job::{Job, JobState};
