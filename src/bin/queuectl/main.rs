use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use queuectl::{
    db, launch_workers, ConfigKey, Job, JobSpec, JobState, WorkerHandle, WorkerOptions,
    WorkerUtils,
};
use tracing::debug;
use tracing_subscriber::{
    filter::EnvFilter, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

use crate::process_launcher::ProcessLauncher;

mod process_launcher;

const DEFAULT_LOG_FILTER: &str = "info,sqlx=warn";

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    long_about = "Persistent shell-command job queue with retries and a dead letter queue"
)]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = "QUEUECTL_DATABASE", default_value = "data/queue.db")]
    database: PathBuf,

    /// Directory holding the pid files of background workers
    #[arg(long, global = true, env = "QUEUECTL_WORKERS_DIR", default_value = "workers")]
    workers_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Enqueue a job, e.g. '{\"id\":\"job1\",\"command\":\"sleep 2\"}'")]
    Enqueue { spec: String },
    #[command(about = "List jobs as JSON lines, newest first")]
    List {
        #[arg(short, long)]
        state: Option<JobState>,
    },
    #[command(about = "Show job counts per state and the running workers")]
    Status,
    /// Start, stop and run workers
    #[command(subcommand)]
    Worker(WorkerCommand),
    /// Inspect and retry dead jobs
    #[command(subcommand)]
    Dlq(DlqCommand),
    /// Read and change queue defaults
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
enum WorkerCommand {
    #[command(about = "Start background worker processes")]
    Start {
        #[arg(short, long, default_value_t = 1)]
        count: usize,
        /// Poll interval in milliseconds
        #[arg(short, long, default_value_t = 1000)]
        interval: u64,
    },
    #[command(about = "Run a worker in the foreground until interrupted")]
    Run {
        /// Poll interval in milliseconds
        #[arg(short, long, default_value_t = 1000)]
        interval: u64,
        /// Process every eligible job, then exit
        #[arg(long)]
        once: bool,
    },
    #[command(about = "Gracefully stop the background workers")]
    Stop {
        /// Wait for the workers to finish their current job and exit
        #[arg(long)]
        wait: bool,
    },
    #[command(about = "Return processing jobs untouched for too long to pending")]
    Reap {
        /// Age in seconds after which a processing job is considered abandoned
        #[arg(long)]
        stale_after: u64,
    },
}

#[derive(Subcommand)]
enum DlqCommand {
    #[command(about = "List dead jobs as JSON lines")]
    List,
    #[command(about = "Move a dead job back to pending with its attempts reset")]
    Retry { id: String },
}

#[derive(Subcommand)]
enum ConfigCommand {
    #[command(about = "Set default_max_retries or backoff_base")]
    Set { key: ConfigKey, value: u32 },
    #[command(about = "Print the effective value of a key")]
    Get { key: ConfigKey },
}

fn enable_logs() {
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let filter_layer = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    enable_logs();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // Usage errors exit 1 like any other malformed input.
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Enqueue { spec } => {
            let spec = JobSpec::parse(&spec)?;
            let utils = open_utils(&cli.database).await?;
            let job = utils.add_job(spec).await?;
            println!("Enqueued job {}", job.id());
        }
        Command::List { state } => {
            let utils = open_utils(&cli.database).await?;
            print_jobs(&utils.list_jobs(state).await?)?;
        }
        Command::Status => {
            let utils = open_utils(&cli.database).await?;
            let summary = utils.summary().await?;
            println!("Database: {}", cli.database.display());
            for state in JobState::ALL {
                println!("{state}: {}", summary.get(state));
            }
            println!("total: {}", summary.total());

            let launcher = ProcessLauncher::new(&cli.database, &cli.workers_dir)?;
            let workers = launcher.recorded_workers()?;
            println!("Workers: {}", workers.len());
            for worker in &workers {
                println!("  {}", worker.pid_file().display());
            }
        }
        Command::Worker(command) => {
            run_worker_command(command, &cli.database, &cli.workers_dir).await?
        }
        Command::Dlq(DlqCommand::List) => {
            let utils = open_utils(&cli.database).await?;
            print_jobs(&utils.dlq_list().await?)?;
        }
        Command::Dlq(DlqCommand::Retry { id }) => {
            let utils = open_utils(&cli.database).await?;
            if utils.dlq_retry(&id).await? {
                println!("Job {id} moved back to pending");
            } else {
                println!("Job {id} is not in the dead letter queue, nothing to do");
            }
        }
        Command::Config(ConfigCommand::Set { key, value }) => {
            let utils = open_utils(&cli.database).await?;
            utils.set_config(key, value).await?;
            println!("{key} = {value}");
        }
        Command::Config(ConfigCommand::Get { key }) => {
            let utils = open_utils(&cli.database).await?;
            println!("{}", utils.get_config(key).await?);
        }
    }

    Ok(())
}

async fn run_worker_command(
    command: WorkerCommand,
    database: &Path,
    workers_dir: &Path,
) -> anyhow::Result<()> {
    match command {
        WorkerCommand::Start { count, interval } => {
            // Creates the schema once before the workers race for it.
            open_utils(database).await?;

            let launcher = ProcessLauncher::new(database, workers_dir)?;
            let handles =
                launch_workers(&launcher, count, Duration::from_millis(interval)).await?;
            for handle in &handles {
                println!("Started worker {}", handle.id());
            }
        }
        WorkerCommand::Run { interval, once } => {
            ensure_parent_dir(database)?;
            let worker = WorkerOptions::default()
                .database_url(&db::database_url(database))
                .poll_interval(Duration::from_millis(interval))
                .init()
                .await?;

            let result = if once {
                worker.run_once().await.map_err(anyhow::Error::from)
            } else {
                worker.run().await;
                Ok(())
            };

            ProcessLauncher::new(database, workers_dir)?.forget(std::process::id());
            result?;
        }
        WorkerCommand::Stop { wait } => {
            let launcher = ProcessLauncher::new(database, workers_dir)?;
            let workers = launcher.recorded_workers()?;
            if workers.is_empty() {
                println!("No workers running");
                return Ok(());
            }

            for worker in &workers {
                worker.signal_shutdown()?;
                println!("Stopping worker {}", worker.id());
            }
            if wait {
                futures::future::join_all(workers.into_iter().map(WorkerHandle::wait)).await;
                println!("All workers stopped");
            } else {
                for worker in &workers {
                    launcher.forget(worker.pid());
                }
            }
        }
        WorkerCommand::Reap { stale_after } => {
            let utils = open_utils(database).await?;
            let reclaimed = utils
                .reclaim_stale_jobs(Duration::from_secs(stale_after))
                .await?;
            for id in &reclaimed {
                println!("Reclaimed job {id}");
            }
            println!("{} job(s) returned to pending", reclaimed.len());
        }
    }

    Ok(())
}

async fn open_utils(database: &Path) -> anyhow::Result<WorkerUtils> {
    ensure_parent_dir(database)?;
    let pool = db::connect(&db::database_url(database), 1)
        .await
        .with_context(|| format!("Failed to open database {}", database.display()))?;

    let utils = WorkerUtils::new(pool);
    debug!(database = %database.display(), "Database ready");
    Ok(utils)
}

fn ensure_parent_dir(database: &Path) -> anyhow::Result<()> {
    if let Some(parent) = database.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

fn print_jobs(jobs: &[Job]) -> anyhow::Result<()> {
    for job in jobs {
        println!("{}", serde_json::to_string(job)?);
    }
    Ok(())
}
