//! Background workers as detached `queuectl worker run` processes.
//!
//! Each launched process is recorded as `worker-<pid>.pid` in the workers
//! directory. Stopping a worker sends it SIGTERM, which the worker turns into a
//! graceful drain.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use cfg_if::cfg_if;
use queuectl::{LaunchError, WorkerHandle, WorkerLauncher};
use tracing::{debug, warn};

const PID_FILE_PREFIX: &str = "worker-";
const PID_FILE_SUFFIX: &str = ".pid";
const LOG_FILE: &str = "workers.log";
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct ProcessLauncher {
    executable: PathBuf,
    database: PathBuf,
    workers_dir: PathBuf,
}

impl ProcessLauncher {
    pub fn new(database: &Path, workers_dir: &Path) -> std::io::Result<Self> {
        Ok(Self {
            executable: std::env::current_exe()?,
            database: database.to_path_buf(),
            workers_dir: workers_dir.to_path_buf(),
        })
    }

    fn pid_file(&self, pid: u32) -> PathBuf {
        self.workers_dir
            .join(format!("{PID_FILE_PREFIX}{pid}{PID_FILE_SUFFIX}"))
    }

    /// Workers with a pid file, whether or not the process is still alive.
    pub fn recorded_workers(&self) -> std::io::Result<Vec<ProcessHandle>> {
        let entries = match fs::read_dir(&self.workers_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut workers = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let Some(pid) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(parse_pid_file_name)
            else {
                continue;
            };
            workers.push(ProcessHandle {
                pid,
                pid_file: path,
            });
        }
        workers.sort_by_key(|w| w.pid);
        Ok(workers)
    }

    /// Removes the pid file of `pid`, if any.
    pub fn forget(&self, pid: u32) {
        remove_pid_file(&self.pid_file(pid));
    }
}

fn parse_pid_file_name(name: &str) -> Option<u32> {
    name.strip_prefix(PID_FILE_PREFIX)?
        .strip_suffix(PID_FILE_SUFFIX)?
        .parse()
        .ok()
}

fn remove_pid_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(pid_file = %path.display(), "Removed pid file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(error = %e, pid_file = %path.display(), "Failed to remove pid file"),
    }
}

impl WorkerLauncher for ProcessLauncher {
    type Handle = ProcessHandle;

    async fn launch(&self, poll_interval: Duration) -> Result<ProcessHandle, LaunchError> {
        fs::create_dir_all(&self.workers_dir)?;
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.workers_dir.join(LOG_FILE))?;

        let mut command = Command::new(&self.executable);
        command
            .arg("--database")
            .arg(&self.database)
            .arg("--workers-dir")
            .arg(&self.workers_dir)
            .args(["worker", "run", "--interval"])
            .arg(poll_interval.as_millis().to_string())
            .stdin(Stdio::null())
            .stdout(log.try_clone()?)
            .stderr(log);

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Keep terminal ctrl-c away from background workers.
            command.process_group(0);
        }

        let child = command.spawn()?;
        let pid = child.id();
        let pid_file = self.pid_file(pid);
        fs::write(&pid_file, pid.to_string())?;

        Ok(ProcessHandle { pid, pid_file })
    }
}

/// A background worker process known through its pid file.
pub struct ProcessHandle {
    pid: u32,
    pid_file: PathBuf,
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn pid_file(&self) -> &Path {
        &self.pid_file
    }
}

cfg_if! {
    if #[cfg(unix)] {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        fn nix_pid(pid: u32) -> Pid {
            Pid::from_raw(pid as i32)
        }

        fn terminate_process(pid: u32) -> Result<(), LaunchError> {
            match kill(nix_pid(pid), Signal::SIGTERM) {
                Ok(()) => Ok(()),
                Err(Errno::ESRCH) => {
                    warn!(pid, "Worker process is already gone");
                    Ok(())
                }
                Err(e) => Err(LaunchError::Signal {
                    worker: pid.to_string(),
                    reason: e.to_string(),
                }),
            }
        }

        fn process_is_alive(pid: u32) -> bool {
            !matches!(kill(nix_pid(pid), None), Err(Errno::ESRCH))
        }
    } else {
        fn terminate_process(pid: u32) -> Result<(), LaunchError> {
            Err(LaunchError::Signal {
                worker: pid.to_string(),
                reason: "stopping background workers is only supported on unix".to_string(),
            })
        }

        fn process_is_alive(_pid: u32) -> bool {
            false
        }
    }
}

impl WorkerHandle for ProcessHandle {
    fn id(&self) -> String {
        format!("pid {}", self.pid)
    }

    fn signal_shutdown(&self) -> Result<(), LaunchError> {
        terminate_process(self.pid)
    }

    async fn wait(self) {
        while process_is_alive(self.pid) {
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }
        remove_pid_file(&self.pid_file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pid_file_name() {
        assert_eq!(parse_pid_file_name("worker-4242.pid"), Some(4242));
        assert_eq!(parse_pid_file_name("worker-.pid"), None);
        assert_eq!(parse_pid_file_name("worker-12.log"), None);
        assert_eq!(parse_pid_file_name("workers.log"), None);
    }

    #[test]
    fn test_recorded_workers_in_missing_directory() {
        let dir = std::env::temp_dir().join(format!("queuectl-{}", uuid::Uuid::now_v7()));
        let launcher = ProcessLauncher::new(Path::new("queue.db"), &dir).unwrap();
        assert!(launcher.recorded_workers().unwrap().is_empty());
    }

    #[test]
    fn test_recorded_workers_reads_pid_files() {
        let dir = std::env::temp_dir().join(format!("queuectl-{}", uuid::Uuid::now_v7()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("worker-20.pid"), "20").unwrap();
        fs::write(dir.join("worker-3.pid"), "3").unwrap();
        fs::write(dir.join(LOG_FILE), "").unwrap();

        let launcher = ProcessLauncher::new(Path::new("queue.db"), &dir).unwrap();
        let pids: Vec<u32> = launcher
            .recorded_workers()
            .unwrap()
            .iter()
            .map(ProcessHandle::pid)
            .collect();
        assert_eq!(pids, vec![3, 20]);

        launcher.forget(3);
        assert!(!dir.join("worker-3.pid").exists());
        fs::remove_dir_all(&dir).unwrap();
    }
}
