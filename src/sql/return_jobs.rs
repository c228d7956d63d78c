use chrono::{DateTime, Utc};
use indoc::indoc;
use queuectl_job::JobState;
use sqlx::{query, SqliteExecutor};
use tracing::warn;

use crate::errors::Result;

/// Hands a job back to `pending` after an execution fault.
///
/// `attempts` and `available_at` are left untouched, so the job is immediately
/// claimable again.
#[tracing::instrument(skip_all, err, fields(otel.kind="client", db.system="sqlite", job_id = job_id))]
pub async fn return_job<'e>(
    executor: impl SqliteExecutor<'e>,
    job_id: &str,
    worker_id: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let sql = indoc! {r#"
        update jobs
            set state = $1, worker = null, updated_at = $2
            where id = $3 and state = $4 and worker = $5
    "#};

    let affected = query(sql)
        .bind(JobState::Pending)
        .bind(now)
        .bind(job_id)
        .bind(JobState::Processing)
        .bind(worker_id)
        .execute(executor)
        .await?
        .rows_affected();

    if affected == 0 {
        warn!(job_id, worker_id, "Job was no longer held by this worker, release ignored");
    }

    Ok(())
}

/// Returns every `processing` job not touched since `stale_before` to `pending`.
///
/// Used by operators to recover jobs left behind by a crashed worker. Attempts are
/// not incremented. Returns the ids of the reclaimed jobs.
#[tracing::instrument(skip_all, err, fields(otel.kind="client", db.system="sqlite"))]
pub async fn return_stale_jobs<'e>(
    executor: impl SqliteExecutor<'e>,
    stale_before: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Vec<String>> {
    let sql = indoc! {r#"
        update jobs
            set state = $1, worker = null, updated_at = $2
            where state = $3 and updated_at < $4
            returning id
    "#};

    let ids: Vec<String> = sqlx::query_scalar(sql)
        .bind(JobState::Pending)
        .bind(now)
        .bind(JobState::Processing)
        .bind(stale_before)
        .fetch_all(executor)
        .await?;

    Ok(ids)
}
