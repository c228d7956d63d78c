use queuectl_job::JobState;
use serde::Serialize;
use sqlx::{query_as, SqliteExecutor};

use crate::errors::Result;

/// Number of jobs in each state.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueSummary {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub dead: u64,
}

impl QueueSummary {
    pub fn get(&self, state: JobState) -> u64 {
        match state {
            JobState::Pending => self.pending,
            JobState::Processing => self.processing,
            JobState::Completed => self.completed,
            JobState::Dead => self.dead,
        }
    }

    fn slot(&mut self, state: JobState) -> &mut u64 {
        match state {
            JobState::Pending => &mut self.pending,
            JobState::Processing => &mut self.processing,
            JobState::Completed => &mut self.completed,
            JobState::Dead => &mut self.dead,
        }
    }

    pub fn total(&self) -> u64 {
        JobState::ALL.iter().map(|state| self.get(*state)).sum()
    }
}

#[tracing::instrument(skip_all, err, fields(otel.kind="client", db.system="sqlite"))]
pub async fn queue_summary<'e>(executor: impl SqliteExecutor<'e>) -> Result<QueueSummary> {
    let rows: Vec<(JobState, i64)> =
        query_as("select state, count(*) from jobs group by state")
            .fetch_all(executor)
            .await?;

    let mut summary = QueueSummary::default();
    for (state, count) in rows {
        *summary.slot(state) = count.try_into().unwrap_or_default();
    }

    Ok(summary)
}
