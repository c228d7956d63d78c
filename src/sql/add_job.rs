use chrono::{DateTime, Utc};
use indoc::indoc;
use queuectl_job::{Job, JobState};
use sqlx::{query_as, SqliteExecutor};
use tracing::info;

use crate::errors::{QueueError, Result};

/// Inserts a new `pending` job with `attempts = 0`, eligible from `now`.
///
/// Fails with [`QueueError::DuplicateId`] when `id` is already taken.
#[tracing::instrument(skip_all, err, fields(otel.kind="client", db.system="sqlite", job_id = id))]
pub async fn add_job<'e>(
    executor: impl SqliteExecutor<'e>,
    id: &str,
    command: &str,
    max_retries: u32,
    now: DateTime<Utc>,
) -> Result<Job> {
    let sql = indoc! {r#"
        insert into jobs (id, command, state, attempts, max_retries, created_at, updated_at, available_at, worker)
            values ($1, $2, $3, 0, $4, $5, $5, $6, null)
            returning *
    "#};

    let job: Job = query_as(sql)
        .bind(id)
        .bind(command)
        .bind(JobState::Pending)
        .bind(max_retries)
        .bind(now)
        .bind(now.timestamp())
        .fetch_one(executor)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                QueueError::DuplicateId(id.to_string())
            }
            e => QueueError::SqlError(e),
        })?;

    info!(job_id = id, command, max_retries, "Job added to queue");

    Ok(job)
}
