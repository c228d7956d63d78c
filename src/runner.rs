use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use getset::Getters;
use queuectl_command_runner::{CommandOutput, CommandRunner, ExecutionFault};
use queuectl_job::Job;
use queuectl_shutdown_signal::{is_triggered, ShutdownSignal};
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};

use crate::builder::WorkerOptions;
use crate::errors::QueueError;
use crate::retry::{AttemptOutcome, RetryDecision, RetryPolicy};
use crate::sql::complete_job::complete_job;
use crate::sql::config::{get_config_u32, ConfigKey};
use crate::sql::fail_job::{kill_job, retry_job};
use crate::sql::get_job::get_job;
use crate::sql::return_jobs::return_job;
use crate::worker_utils::WorkerUtils;

/// Lifecycle of a worker.
///
/// `Running -> Draining -> Stopped`. A draining worker issues no new claims
/// but lets the job it holds finish and resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Running,
    Draining,
    Stopped,
}

impl Display for WorkerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let display = match self {
            WorkerState::Running => "running",
            WorkerState::Draining => "draining",
            WorkerState::Stopped => "stopped",
        };
        write!(f, "{display}")
    }
}

/// A single worker: claims one job at a time, runs its command, and applies
/// the retry policy to the outcome.
///
/// Any number of workers, in any number of processes, may share a database.
/// The claim guarantees each job is held by at most one of them.
#[derive(Getters)]
#[getset(get = "pub")]
pub struct Worker {
    /// Unique identifier recorded on the jobs this worker claims
    pub(crate) worker_id: String,
    /// How long to sleep when no job is available
    pub(crate) poll_interval: Duration,
    /// Pause after an unexpected store error before polling again
    #[getset(skip)]
    pub(crate) fault_pause: Duration,
    /// Database connection pool
    pub(crate) pool: SqlitePool,
    /// Resolves once shutdown has been requested
    pub(crate) shutdown_signal: ShutdownSignal,
    #[getset(skip)]
    pub(crate) shutdown_token: CancellationToken,
    #[getset(skip)]
    pub(crate) command_runner: Arc<dyn CommandRunner>,
    #[getset(skip)]
    pub(crate) state: watch::Sender<WorkerState>,
}

/// Errors that can occur during worker runtime.
#[derive(Error, Debug)]
pub enum WorkerRuntimeError {
    /// An error occurred while processing a job
    #[error("Unexpected error occured while processing job : '{0}'")]
    ProcessJob(#[from] ProcessJobError),
}

impl Worker {
    /// Entry point for configuring a worker.
    pub fn options() -> WorkerOptions {
        WorkerOptions::default()
    }

    /// Runs the worker loop until shutdown is requested.
    ///
    /// Store errors never stop the loop: they are logged and the worker pauses
    /// before polling again. When shutdown is requested while a job is
    /// executing, the worker drains: the command runs to termination and its
    /// outcome is recorded before `run` returns.
    ///
    /// The shutdown signal is checked right before every claim. A request that
    /// lands while a claim query is already in flight does not cancel it: the
    /// job claimed by that query still runs and resolves before the worker stops.
    pub async fn run(&self) {
        info!(
            worker_id = %self.worker_id,
            poll_interval = ?self.poll_interval,
            "Worker started"
        );
        self.set_state(WorkerState::Running);

        loop {
            if is_triggered(&self.shutdown_signal) {
                self.set_state(WorkerState::Draining);
                break;
            }

            match process_one_job(self).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    if self.sleep_or_shutdown(self.poll_interval).await {
                        self.set_state(WorkerState::Draining);
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, worker_id = %self.worker_id, "Error in worker loop");
                    if self.sleep_or_shutdown(self.fault_pause).await {
                        self.set_state(WorkerState::Draining);
                        break;
                    }
                }
            }
        }

        self.set_state(WorkerState::Stopped);
        info!(worker_id = %self.worker_id, "Worker stopped");
    }

    /// Processes jobs until none is available, then returns.
    ///
    /// Unlike [`Worker::run`], store errors are returned to the caller.
    pub async fn run_once(&self) -> Result<(), WorkerRuntimeError> {
        self.set_state(WorkerState::Running);

        let result = async {
            while !is_triggered(&self.shutdown_signal) {
                if process_one_job(self).await?.is_none() {
                    break;
                }
            }
            Ok::<(), WorkerRuntimeError>(())
        }
        .await;

        self.set_state(WorkerState::Stopped);
        result
    }

    /// Asks the worker to stop claiming jobs and exit once idle.
    pub fn request_shutdown(&self) {
        self.shutdown_token.cancel();
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Receiver notified on every lifecycle transition.
    pub fn subscribe_state(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Operator utilities sharing this worker's pool.
    pub fn create_utils(&self) -> WorkerUtils {
        WorkerUtils::new(self.pool.clone())
    }

    fn set_state(&self, state: WorkerState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            trace!(worker_id = %self.worker_id, from = %current, to = %state, "Worker state changed");
            *current = state;
            true
        });
    }

    /// Sleeps for `duration`. Returns `true` if shutdown was requested meanwhile.
    async fn sleep_or_shutdown(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = self.shutdown_signal.clone() => true,
        }
    }

    async fn retry_policy(&self) -> Result<RetryPolicy, QueueError> {
        let backoff_base = get_config_u32(&self.pool, ConfigKey::BackoffBase).await?;
        Ok(RetryPolicy::new(backoff_base))
    }
}

/// Errors that can occur while processing a job.
#[derive(Error, Debug)]
pub enum ProcessJobError {
    /// Error occurred when trying to resolve a job after running it
    #[error("An error occured while releasing a job : '{0}'")]
    ReleaseJobError(#[from] ReleaseJobError),
    /// Error occurred when trying to claim a job
    #[error("An error occured while fetching a job to run : '{0}'")]
    GetJobError(#[from] QueueError),
    /// Error occurred when reading the retry settings before running a job
    #[error("Could not read retry settings for job '{job_id}' : '{source}'")]
    RetryPolicyError {
        job_id: String,
        #[source]
        source: QueueError,
    },
}

/// Claims one job and, if there was one, runs and resolves it.
///
/// # Returns
///
/// - `Ok(Some(job))` the job that was claimed and resolved
/// - `Ok(None)` when no job was eligible or another worker won the claim
async fn process_one_job(worker: &Worker) -> Result<Option<Job>, ProcessJobError> {
    if is_triggered(&worker.shutdown_signal) {
        trace!(worker_id = %worker.worker_id, "Shutdown requested, not claiming");
        return Ok(None);
    }

    let job = get_job(&worker.pool, &worker.worker_id, Utc::now())
        .await
        .inspect_err(|e| {
            error!(error = %e, "Could not claim job");
        })?;

    match job {
        Some(job) => {
            if let Err(e) = run_and_release_job(&job, worker).await {
                return_job_after_error(&job, worker).await;
                return Err(e);
            }
            Ok(Some(job))
        }
        None => {
            trace!(worker_id = %worker.worker_id, "No job found");
            Ok(None)
        }
    }
}

/// Best effort hand back of a claimed job whose outcome could not be recorded.
///
/// On success the job is claimable again and its attempts are unchanged. On
/// failure it stays `processing` until an operator reaps it.
async fn return_job_after_error(job: &Job, worker: &Worker) {
    match return_job(&worker.pool, job.id(), &worker.worker_id, Utc::now()).await {
        Ok(()) => warn!(job_id = %job.id(), "Job returned to the queue after an error"),
        Err(e) => error!(
            job_id = %job.id(),
            error = %e,
            "Could not return job to the queue, it stays processing until reaped"
        ),
    }
}

/// Runs the command of a claimed job and records its outcome.
///
/// The retry settings are read before the command starts. A shutdown request
/// during execution switches the worker to draining; the command is never
/// interrupted.
async fn run_and_release_job(job: &Job, worker: &Worker) -> Result<(), ProcessJobError> {
    let policy = worker
        .retry_policy()
        .await
        .map_err(|source| ProcessJobError::RetryPolicyError {
            job_id: job.id().clone(),
            source,
        })?;

    info!(
        job_id = %job.id(),
        attempts = job.attempts(),
        command = %job.command(),
        "Running job"
    );

    let execution = worker.command_runner.execute(job.command());
    tokio::pin!(execution);

    let result = tokio::select! {
        biased;
        result = &mut execution => result,
        _ = worker.shutdown_signal.clone() => {
            worker.set_state(WorkerState::Draining);
            info!(job_id = %job.id(), "Draining: waiting for the running job to finish");
            execution.await
        }
    };

    release_job(result, job, worker, policy).await?;
    Ok(())
}

/// Error that occurs when trying to record the outcome of a job.
#[derive(Error, Debug)]
#[error("Failed to release job '{job_id}'. {source}")]
pub struct ReleaseJobError {
    job_id: String,
    #[source]
    source: QueueError,
}

/// Applies the retry policy to `result` and writes the matching mutation.
async fn release_job(
    result: Result<CommandOutput, ExecutionFault>,
    job: &Job,
    worker: &Worker,
    policy: RetryPolicy,
) -> Result<(), ReleaseJobError> {
    let release_error = |source| ReleaseJobError {
        job_id: job.id().clone(),
        source,
    };

    let outcome = match &result {
        Ok(output) if output.success => AttemptOutcome::Succeeded,
        Ok(_) => AttemptOutcome::Failed,
        Err(_) => AttemptOutcome::Fault,
    };
    let now = Utc::now();
    let decision = policy.decide(*job.attempts(), *job.max_retries(), outcome, now.timestamp());
    let last_error = match &result {
        Ok(output) => output.failure_summary(),
        Err(fault) => fault.to_string(),
    };

    match decision {
        RetryDecision::Complete => {
            complete_job(&worker.pool, job.id(), &worker.worker_id, now)
                .await
                .map_err(release_error)?;

            let duration = result.as_ref().map(|o| o.duration).unwrap_or_default();
            info!(job_id = %job.id(), ?duration, "Job completed");
        }
        RetryDecision::Retry {
            attempts,
            available_at,
        } => {
            retry_job(
                &worker.pool,
                job.id(),
                &worker.worker_id,
                attempts,
                available_at,
                &last_error,
                now,
            )
            .await
            .map_err(release_error)?;

            warn!(
                job_id = %job.id(),
                attempts,
                max_retries = job.max_retries(),
                delay_secs = available_at - now.timestamp(),
                error = %last_error,
                "Job failed, scheduled for retry"
            );
        }
        RetryDecision::Dead { attempts } => {
            kill_job(
                &worker.pool,
                job.id(),
                &worker.worker_id,
                attempts,
                &last_error,
                now,
            )
            .await
            .map_err(release_error)?;

            error!(
                job_id = %job.id(),
                attempts,
                error = %last_error,
                "Job max retries reached, moved to dead letter queue"
            );
        }
        RetryDecision::Release => {
            return_job(&worker.pool, job.id(), &worker.worker_id, now)
                .await
                .map_err(release_error)?;

            warn!(
                job_id = %job.id(),
                error = %last_error,
                "Could not execute job, released for immediate retry"
            );
        }
    }

    Ok(())
}
