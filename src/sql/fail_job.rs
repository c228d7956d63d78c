use chrono::{DateTime, Utc};
use indoc::indoc;
use queuectl_job::JobState;
use sqlx::{query, SqliteExecutor};
use tracing::warn;

use crate::errors::Result;

/// Returns a failed job to `pending` with its new attempt count and backoff.
#[tracing::instrument(skip_all, err, fields(otel.kind="client", db.system="sqlite", job_id = job_id))]
pub async fn retry_job<'e>(
    executor: impl SqliteExecutor<'e>,
    job_id: &str,
    worker_id: &str,
    attempts: u32,
    available_at: i64,
    last_error: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let sql = indoc! {r#"
        update jobs
            set state = $1, worker = null, attempts = $2, available_at = $3, last_error = $4, updated_at = $5
            where id = $6 and state = $7 and worker = $8
    "#};

    let affected = query(sql)
        .bind(JobState::Pending)
        .bind(attempts)
        .bind(available_at)
        .bind(last_error)
        .bind(now)
        .bind(job_id)
        .bind(JobState::Processing)
        .bind(worker_id)
        .execute(executor)
        .await?
        .rows_affected();

    if affected == 0 {
        warn!(job_id, worker_id, "Job was no longer held by this worker, retry ignored");
    }

    Ok(())
}

/// Moves a job that exhausted its retries to the dead-letter state.
#[tracing::instrument(skip_all, err, fields(otel.kind="client", db.system="sqlite", job_id = job_id))]
pub async fn kill_job<'e>(
    executor: impl SqliteExecutor<'e>,
    job_id: &str,
    worker_id: &str,
    attempts: u32,
    last_error: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let sql = indoc! {r#"
        update jobs
            set state = $1, worker = null, attempts = $2, last_error = $3, updated_at = $4
            where id = $5 and state = $6 and worker = $7
    "#};

    let affected = query(sql)
        .bind(JobState::Dead)
        .bind(attempts)
        .bind(last_error)
        .bind(now)
        .bind(job_id)
        .bind(JobState::Processing)
        .bind(worker_id)
        .execute(executor)
        .await?
        .rows_affected();

    if affected == 0 {
        warn!(job_id, worker_id, "Job was no longer held by this worker, dead-letter ignored");
    }

    Ok(())
}
