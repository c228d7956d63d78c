//! Starting and stopping groups of workers.
//!
//! [`WorkerLauncher`] abstracts where a worker lives. The library ships
//! [`InProcessLauncher`], which runs each worker as a tokio task; the
//! `queuectl` binary launches detached worker processes instead. Either way the
//! workers only coordinate through the store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use queuectl_command_runner::CommandRunner;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::builder::{WorkerBuildError, WorkerOptions};
use crate::runner::{Worker, WorkerState};

/// Errors raised while starting or signalling a worker.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Failed to build worker: {0}")]
    Build(#[from] WorkerBuildError),

    #[error("Failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Failed to signal worker {worker}: {reason}")]
    Signal { worker: String, reason: String },
}

/// A running worker that can be asked to stop.
pub trait WorkerHandle: Send {
    /// Identifier used in logs and status output.
    fn id(&self) -> String;

    /// Requests a graceful shutdown. Returns immediately.
    fn signal_shutdown(&self) -> Result<(), LaunchError>;

    /// Resolves once the worker has exited.
    fn wait(self) -> impl Future<Output = ()> + Send;
}

/// Starts workers.
pub trait WorkerLauncher {
    type Handle: WorkerHandle;

    fn launch(
        &self,
        poll_interval: Duration,
    ) -> impl Future<Output = Result<Self::Handle, LaunchError>> + Send;
}

/// Launches `count` workers. Stops at the first failure, leaving the workers
/// already started running.
pub async fn launch_workers<L: WorkerLauncher>(
    launcher: &L,
    count: usize,
    poll_interval: Duration,
) -> Result<Vec<L::Handle>, LaunchError> {
    let mut handles = Vec::with_capacity(count);
    for _ in 0..count {
        let handle = launcher.launch(poll_interval).await?;
        info!(worker = %handle.id(), "Worker launched");
        handles.push(handle);
    }
    Ok(handles)
}

/// Signals every worker, then waits for all of them to exit.
pub async fn stop_workers<H: WorkerHandle>(handles: Vec<H>) -> Result<(), LaunchError> {
    for handle in &handles {
        handle.signal_shutdown()?;
    }
    futures::future::join_all(handles.into_iter().map(H::wait)).await;
    Ok(())
}

/// Runs workers as tasks on the current tokio runtime, sharing one pool.
#[derive(Clone)]
pub struct InProcessLauncher {
    pool: SqlitePool,
    command_runner: Option<Arc<dyn CommandRunner>>,
}

impl InProcessLauncher {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            command_runner: None,
        }
    }

    /// Replaces the shell runner of every launched worker.
    pub fn command_runner(mut self, value: Arc<dyn CommandRunner>) -> Self {
        self.command_runner = Some(value);
        self
    }
}

impl WorkerLauncher for InProcessLauncher {
    type Handle = InProcessHandle;

    async fn launch(&self, poll_interval: Duration) -> Result<InProcessHandle, LaunchError> {
        let mut options = WorkerOptions::default()
            .sqlite_pool(self.pool.clone())
            .poll_interval(poll_interval)
            .listen_os_shutdown_signals(false);
        if let Some(runner) = &self.command_runner {
            options = options.command_runner(runner.clone());
        }

        let worker = Arc::new(options.init().await?);
        let join = tokio::spawn({
            let worker = worker.clone();
            async move { worker.run().await }
        });

        Ok(InProcessHandle { worker, join })
    }
}

/// Handle on a worker task started by [`InProcessLauncher`].
pub struct InProcessHandle {
    worker: Arc<Worker>,
    join: JoinHandle<()>,
}

impl InProcessHandle {
    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    pub fn state(&self) -> WorkerState {
        self.worker.state()
    }
}

impl WorkerHandle for InProcessHandle {
    fn id(&self) -> String {
        self.worker.worker_id().clone()
    }

    fn signal_shutdown(&self) -> Result<(), LaunchError> {
        self.worker.request_shutdown();
        Ok(())
    }

    async fn wait(self) {
        if let Err(e) = self.join.await {
            error!(error = %e, worker = %self.worker.worker_id(), "Worker task panicked");
        }
    }
}
