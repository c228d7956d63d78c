use chrono::{DateTime, Utc};
use indoc::indoc;
use queuectl_job::JobState;
use sqlx::{query, SqliteExecutor};

use crate::errors::Result;

/// Moves a `dead` job back to `pending` with `attempts = 0`, eligible from `now`.
///
/// Jobs in any other state are left untouched. Returns whether a job was requeued.
#[tracing::instrument(skip_all, err, fields(otel.kind="client", db.system="sqlite", job_id = job_id))]
pub async fn requeue_dead_job<'e>(
    executor: impl SqliteExecutor<'e>,
    job_id: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let sql = indoc! {r#"
        update jobs
            set state = $1, attempts = 0, available_at = $2, worker = null, last_error = null, updated_at = $3
            where id = $4 and state = $5
    "#};

    let affected = query(sql)
        .bind(JobState::Pending)
        .bind(now.timestamp())
        .bind(now)
        .bind(job_id)
        .bind(JobState::Dead)
        .execute(executor)
        .await?
        .rows_affected();

    Ok(affected == 1)
}
