use indoc::indoc;
use queuectl_job::{Job, JobState};
use sqlx::{query_as, SqliteExecutor};

use crate::errors::Result;

/// Maximum number of rows returned by an unfiltered listing.
pub const UNFILTERED_LIST_LIMIT: i64 = 200;

/// Lists jobs, newest first.
///
/// Filtering on a state returns every matching job; an unfiltered listing is
/// capped at [`UNFILTERED_LIST_LIMIT`] rows.
#[tracing::instrument(skip_all, err, fields(otel.kind="client", db.system="sqlite", state = ?state))]
pub async fn list_jobs<'e>(
    executor: impl SqliteExecutor<'e>,
    state: Option<JobState>,
) -> Result<Vec<Job>> {
    let jobs = match state {
        Some(state) => {
            query_as(indoc! {r#"
                select * from jobs
                    where state = $1
                    order by created_at desc, rowid desc
            "#})
            .bind(state)
            .fetch_all(executor)
            .await?
        }
        None => {
            query_as(indoc! {r#"
                select * from jobs
                    order by created_at desc, rowid desc
                    limit $1
            "#})
            .bind(UNFILTERED_LIST_LIMIT)
            .fetch_all(executor)
            .await?
        }
    };

    Ok(jobs)
}

/// Fetches a single job by id.
#[tracing::instrument(skip_all, err, fields(otel.kind="client", db.system="sqlite", job_id = job_id))]
pub async fn find_job<'e>(executor: impl SqliteExecutor<'e>, job_id: &str) -> Result<Option<Job>> {
    let job = query_as("select * from jobs where id = $1")
        .bind(job_id)
        .fetch_optional(executor)
        .await?;

    Ok(job)
}
