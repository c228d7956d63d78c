use std::sync::Arc;
use std::time::Duration;

use queuectl_command_runner::{CommandRunner, ShellRunner};
use queuectl_migrations::migrate;
use queuectl_shutdown_signal::shutdown_signal;
use rand::RngCore;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::runner::WorkerState;
use crate::Worker;

/// Pause after a loop-level fault before polling again.
const DEFAULT_FAULT_PAUSE: Duration = Duration::from_millis(500);

/// Configuration options for initializing a worker.
///
/// # Example
///
/// ```no_run
/// use queuectl::WorkerOptions;
/// use std::time::Duration;
///
/// async fn example() -> Result<(), Box<dyn std::error::Error>> {
///     let worker = WorkerOptions::default()
///         .poll_interval(Duration::from_millis(500))
///         .database_url("sqlite://data/queue.db")
///         .init()
///         .await?;
///
///     worker.run().await;
///     Ok(())
/// }
/// ```
#[derive(Default)]
pub struct WorkerOptions {
    /// How long to sleep when no job is available
    poll_interval: Option<Duration>,

    /// SQLite connection pool
    sqlite_pool: Option<SqlitePool>,

    /// SQLite connection url
    database_url: Option<String>,

    /// Maximum number of connections in the pool
    max_connections: Option<u32>,

    /// Explicit worker identifier
    worker_id: Option<String>,

    /// Whether SIGINT / SIGTERM / SIGHUP trigger a graceful shutdown
    listen_os_shutdown_signals: Option<bool>,

    /// Token that triggers a graceful shutdown when cancelled
    shutdown_token: Option<CancellationToken>,

    /// Executes the job commands
    command_runner: Option<Arc<dyn CommandRunner>>,
}

/// Errors that can occur when initializing a worker.
#[derive(Error, Debug)]
pub enum WorkerBuildError {
    /// Failed to connect to the SQLite database
    #[error("Error occurred while connecting to the SQLite database: {0}")]
    ConnectError(#[from] sqlx::Error),

    /// The database URL was not provided and no pool was supplied
    #[error("Missing database_url configuration - must provide either database_url or sqlite_pool")]
    MissingDatabaseUrl,

    /// Failed to apply database migrations
    #[error("Error occurred while migrating the database schema: {0}")]
    MigrationError(#[from] queuectl_migrations::MigrateError),
}

impl WorkerOptions {
    /// Connects, migrates the schema and builds the worker.
    pub async fn init(self) -> Result<Worker, WorkerBuildError> {
        let pool = match self.sqlite_pool {
            Some(pool) => {
                let mut conn = pool.acquire().await?;
                migrate(&mut conn).await?;
                pool
            }
            None => {
                let db_url = self
                    .database_url
                    .ok_or(WorkerBuildError::MissingDatabaseUrl)?;

                crate::db::connect(&db_url, self.max_connections.unwrap_or(2)).await?
            }
        };

        let worker_id = self.worker_id.unwrap_or_else(generate_worker_id);
        let shutdown_token = self.shutdown_token.unwrap_or_default();
        let shutdown_signal = shutdown_signal(
            shutdown_token.clone(),
            self.listen_os_shutdown_signals.unwrap_or(true),
        );
        let (state, _) = watch::channel(WorkerState::Running);

        Ok(Worker {
            worker_id,
            poll_interval: self.poll_interval.unwrap_or(Duration::from_millis(1000)),
            fault_pause: DEFAULT_FAULT_PAUSE,
            pool,
            shutdown_signal,
            shutdown_token,
            command_runner: self
                .command_runner
                .unwrap_or_else(|| Arc::new(ShellRunner::default())),
            state,
        })
    }

    /// Sets how long the worker sleeps when no job is available.
    ///
    /// # Default
    /// 1000 milliseconds.
    pub fn poll_interval(mut self, value: Duration) -> Self {
        self.poll_interval = Some(value);
        self
    }

    /// Uses an existing pool instead of connecting from `database_url`.
    ///
    /// The pool should come from [`db::connect`](crate::db::connect), which
    /// migrates before connecting. Migrating here only covers the connection
    /// used for it; other open connections keep the schema they loaded.
    pub fn sqlite_pool(mut self, value: SqlitePool) -> Self {
        self.sqlite_pool = Some(value);
        self
    }

    /// Sets the database url, e.g. `sqlite://data/queue.db`.
    pub fn database_url(mut self, value: &str) -> Self {
        self.database_url = Some(value.into());
        self
    }

    /// Sets the pool size used when connecting from `database_url`.
    ///
    /// # Default
    /// 2 connections: a worker runs one job at a time.
    pub fn max_connections(mut self, value: u32) -> Self {
        self.max_connections = Some(value);
        self
    }

    /// Overrides the generated worker identifier.
    pub fn worker_id(mut self, value: impl Into<String>) -> Self {
        self.worker_id = Some(value.into());
        self
    }

    /// Whether OS signals trigger a graceful shutdown.
    ///
    /// # Default
    /// `true`. Disable it when several workers share one process.
    pub fn listen_os_shutdown_signals(mut self, value: bool) -> Self {
        self.listen_os_shutdown_signals = Some(value);
        self
    }

    /// Shares a cancellation token that triggers a graceful shutdown.
    pub fn shutdown_token(mut self, value: CancellationToken) -> Self {
        self.shutdown_token = Some(value);
        self
    }

    /// Replaces the shell runner used to execute job commands.
    pub fn command_runner(mut self, value: Arc<dyn CommandRunner>) -> Self {
        self.command_runner = Some(value);
        self
    }
}

/// Builds an identifier unique across hosts, processes and restarts.
fn generate_worker_id() -> String {
    let mut random_bytes = [0u8; 6];
    rand::rng().fill_bytes(&mut random_bytes);

    format!(
        "queuectl_{}_{}",
        std::process::id(),
        hex::encode(random_bytes)
    )
}
