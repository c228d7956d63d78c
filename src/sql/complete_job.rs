use chrono::{DateTime, Utc};
use indoc::indoc;
use queuectl_job::JobState;
use sqlx::{query, SqliteExecutor};
use tracing::warn;

use crate::errors::Result;

/// Moves a job held by `worker_id` to `completed`.
#[tracing::instrument(skip_all, err, fields(otel.kind="client", db.system="sqlite", job_id = job_id))]
pub async fn complete_job<'e>(
    executor: impl SqliteExecutor<'e>,
    job_id: &str,
    worker_id: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let sql = indoc! {r#"
        update jobs
            set state = $1, worker = null, last_error = null, updated_at = $2
            where id = $3 and state = $4 and worker = $5
    "#};

    let affected = query(sql)
        .bind(JobState::Completed)
        .bind(now)
        .bind(job_id)
        .bind(JobState::Processing)
        .bind(worker_id)
        .execute(executor)
        .await?
        .rows_affected();

    if affected == 0 {
        warn!(job_id, worker_id, "Job was no longer held by this worker, completion ignored");
    }

    Ok(())
}
