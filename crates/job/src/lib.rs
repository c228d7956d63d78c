use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use derive_builder::Builder;
use getset::Getters;
use serde::Serialize;
use sqlx::FromRow;
use thiserror::Error;

/// Lifecycle state of a job.
///
/// ```text
/// pending ──claim──▶ processing ──▶ completed
///    ▲                   │
///    ├──── retry ────────┤
///    │                   ▼
///    └──── requeue ───── dead
/// ```
///
/// `completed` is terminal. `dead` is terminal unless an operator requeues the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting to be claimed once `available_at` has passed
    Pending,
    /// Held by exactly one worker
    Processing,
    /// Command exited with status 0
    Completed,
    /// Retries exhausted, quarantined in the dead-letter queue
    Dead,
}

impl JobState {
    pub const ALL: [JobState; 4] = [
        JobState::Pending,
        JobState::Processing,
        JobState::Completed,
        JobState::Dead,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Dead => "dead",
        }
    }

    /// Whether no further transition can happen without operator action.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Dead)
    }
}

impl Display for JobState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown job state '{0}', expected one of pending, processing, completed, dead")]
pub struct ParseJobStateError(pub String);

impl FromStr for JobState {
    type Err = ParseJobStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(JobState::Pending),
            "processing" => Ok(JobState::Processing),
            "completed" => Ok(JobState::Completed),
            "dead" => Ok(JobState::Dead),
            _ => Err(ParseJobStateError(s.to_string())),
        }
    }
}

/// A job as stored in the `jobs` table.
///
/// The store is the single source of truth: a `Job` value is a snapshot taken
/// when the row was read or claimed, never a live handle.
#[derive(FromRow, Getters, Serialize, Debug, Clone, PartialEq, Eq, Builder)]
#[getset(get = "pub")]
#[builder(build_fn(private, name = "build_internal"), pattern = "owned")]
pub struct Job {
    /// Caller supplied or generated identifier
    #[builder(setter(into))]
    id: String,
    /// Opaque shell command handed to the runner
    #[builder(setter(into))]
    command: String,
    #[builder(default = "JobState::Pending")]
    state: JobState,
    /// Completed execution attempts so far
    #[builder(default)]
    attempts: u32,
    /// Retries allowed before the job is dead-lettered
    #[builder(default = "3")]
    max_retries: u32,
    /// Enqueue time, FIFO tie-break for claims
    #[builder(default = "Utc::now()")]
    created_at: DateTime<Utc>,
    /// Time of the last state transition
    #[builder(default = "Utc::now()")]
    updated_at: DateTime<Utc>,
    /// Epoch seconds before which the job cannot be claimed
    #[builder(default = "Utc::now().timestamp()")]
    available_at: i64,
    /// Worker currently holding the job
    #[builder(default, setter(strip_option, into))]
    worker: Option<String>,
    /// Short description of the last failed attempt
    #[builder(default, setter(strip_option, into))]
    last_error: Option<String>,
}

impl Job {
    /// Creates a new builder for constructing a `Job`.
    pub fn builder() -> JobBuilder {
        JobBuilder::default()
    }

    /// Whether the job may be claimed at `now_secs` (epoch seconds).
    pub fn is_available(&self, now_secs: i64) -> bool {
        self.state == JobState::Pending && self.available_at <= now_secs
    }
}

impl JobBuilder {
    /// Builds the Job. `id` and `command` must have been set.
    pub fn build(self) -> Result<Job, JobBuilderError> {
        self.build_internal()
    }
}
