use std::time::Duration;

use chrono::Utc;
use queuectl_job::{Job, JobState};
use queuectl_migrations::migrate;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::errors::Result;
use crate::job_spec::JobSpec;
use crate::sql::add_job::add_job;
use crate::sql::config::{get_config_u32, set_config, ConfigKey};
use crate::sql::list_jobs::{find_job, list_jobs};
use crate::sql::queue_details::{queue_summary, QueueSummary};
use crate::sql::requeue_job::requeue_dead_job;
use crate::sql::return_jobs::return_stale_jobs;

/// Operator-facing queue operations: enqueue, inspection, dead-letter handling
/// and configuration.
///
/// Holds no job state of its own; every call goes to the store.
#[derive(Debug, Clone)]
pub struct WorkerUtils {
    pool: SqlitePool,
}

impl WorkerUtils {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Validates `spec`, fills in the id and retry defaults, and inserts a
    /// `pending` job.
    ///
    /// # Errors
    /// * [`QueueError::InvalidJobSpec`](crate::QueueError::InvalidJobSpec) when the command is missing or blank
    /// * [`QueueError::DuplicateId`](crate::QueueError::DuplicateId) when the id is already used
    pub async fn add_job(&self, spec: JobSpec) -> Result<Job> {
        spec.validate()?;

        let id = spec
            .id
            .unwrap_or_else(|| uuid::Uuid::now_v7().to_string());
        let max_retries = match spec.max_retries {
            Some(max_retries) => max_retries,
            None => get_config_u32(&self.pool, ConfigKey::DefaultMaxRetries).await?,
        };

        add_job(&self.pool, &id, &spec.command, max_retries, Utc::now()).await
    }

    /// Lists jobs newest first, optionally filtered by state.
    pub async fn list_jobs(&self, state: Option<JobState>) -> Result<Vec<Job>> {
        list_jobs(&self.pool, state).await
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        find_job(&self.pool, job_id).await
    }

    /// Counts jobs per state.
    pub async fn summary(&self) -> Result<QueueSummary> {
        queue_summary(&self.pool).await
    }

    /// Lists dead-lettered jobs.
    pub async fn dlq_list(&self) -> Result<Vec<Job>> {
        list_jobs(&self.pool, Some(JobState::Dead)).await
    }

    /// Requeues a dead-lettered job with `attempts = 0`, eligible immediately.
    ///
    /// Returns `false` and changes nothing when the job does not exist or is not
    /// `dead`. Operator tooling stays idempotent: retrying twice is harmless.
    pub async fn dlq_retry(&self, job_id: &str) -> Result<bool> {
        let requeued = requeue_dead_job(&self.pool, job_id, Utc::now()).await?;
        if requeued {
            info!(job_id, "Dead job moved back to pending");
        } else {
            warn!(job_id, "Job is not in the dead-letter queue, nothing to retry");
        }
        Ok(requeued)
    }

    /// Effective value of a config key, the built-in default when unset.
    pub async fn get_config(&self, key: ConfigKey) -> Result<u32> {
        get_config_u32(&self.pool, key).await
    }

    pub async fn set_config(&self, key: ConfigKey, value: u32) -> Result<()> {
        set_config(&self.pool, key.as_str(), &value.to_string()).await?;
        info!(key = key.as_str(), value, "Config updated");
        Ok(())
    }

    /// Returns `processing` jobs that have not changed for longer than
    /// `stale_after` to `pending`, for recovery after a worker crash.
    ///
    /// Workers never do this on their own; a job that is legitimately running
    /// longer than `stale_after` would be executed twice.
    pub async fn reclaim_stale_jobs(&self, stale_after: Duration) -> Result<Vec<String>> {
        let now = Utc::now();
        let stale_after =
            chrono::Duration::from_std(stale_after).unwrap_or(chrono::Duration::MAX);
        let stale_before = now
            .checked_sub_signed(stale_after)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

        let ids = return_stale_jobs(&self.pool, stale_before, now).await?;
        for job_id in &ids {
            warn!(job_id = %job_id, "Reclaimed stale processing job");
        }
        Ok(ids)
    }

    /// Runs the schema migrations on one pooled connection.
    ///
    /// See [`db::connect`](crate::db::connect) for opening an already migrated pool.
    pub async fn migrate(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        migrate(&mut conn).await?;
        Ok(())
    }
}
