use chrono::{DateTime, Utc};
use indoc::indoc;
use queuectl_job::{Job, JobState};
use sqlx::{query_as, SqlitePool};
use tracing::trace;

use crate::errors::Result;

/// Claims the oldest eligible job for `worker_id`.
///
/// Selects the oldest `pending` job whose `available_at <= now`, then flips it to
/// `processing` with a single conditional update guarded by `state = 'pending'`.
/// The job is returned only when that update affected exactly one row. Losing
/// the race to another worker yields `Ok(None)`, exactly like an empty queue.
#[tracing::instrument(skip_all, err, fields(otel.kind="client", db.system="sqlite", worker_id = worker_id))]
pub async fn get_job(
    pool: &SqlitePool,
    worker_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<Job>> {
    let candidate: Option<(String,)> = query_as(indoc! {r#"
        select id from jobs
            where state = $1 and available_at <= $2
            order by created_at asc, rowid asc
            limit 1
    "#})
    .bind(JobState::Pending)
    .bind(now.timestamp())
    .fetch_optional(pool)
    .await?;

    let Some((job_id,)) = candidate else {
        return Ok(None);
    };

    let mut claimed: Vec<Job> = query_as(indoc! {r#"
        update jobs
            set state = $1, worker = $2, updated_at = $3
            where id = $4 and state = $5
            returning *
    "#})
    .bind(JobState::Processing)
    .bind(worker_id)
    .bind(now)
    .bind(&job_id)
    .bind(JobState::Pending)
    .fetch_all(pool)
    .await?;

    if claimed.len() != 1 {
        trace!(job_id = %job_id, worker_id, "Lost claim race");
        return Ok(None);
    }

    Ok(claimed.pop())
}
