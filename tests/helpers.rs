#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Once;
use std::time::Duration;

use chrono::Utc;
use queuectl::sql::add_job::add_job;
use queuectl::{db, Job, WorkerOptions, WorkerUtils};
use sqlx::SqlitePool;
use tokio::task::LocalSet;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug)]
pub struct TestDatabase {
    pub pool: SqlitePool,
    pub path: PathBuf,
}

impl TestDatabase {
    async fn drop(&self) {
        self.pool.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let mut path = self.path.clone().into_os_string();
            path.push(suffix);
            let _ = std::fs::remove_file(path);
        }
    }

    pub fn create_worker_options(&self) -> WorkerOptions {
        WorkerOptions::default()
            .sqlite_pool(self.pool.clone())
            .poll_interval(Duration::from_millis(50))
            .listen_os_shutdown_signals(false)
    }

    pub fn worker_utils(&self) -> WorkerUtils {
        WorkerUtils::new(self.pool.clone())
    }

    /// Every job in insertion order.
    pub async fn get_jobs(&self) -> Vec<Job> {
        sqlx::query_as("select * from jobs order by rowid asc")
            .fetch_all(&self.pool)
            .await
            .expect("Failed to get jobs")
    }

    pub async fn get_job(&self, id: &str) -> Job {
        sqlx::query_as("select * from jobs where id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .expect("Failed to get job")
    }

    /// Makes every pending job eligible immediately, skipping its backoff.
    pub async fn make_jobs_run_now(&self) {
        sqlx::query("update jobs set available_at = $1 where state = 'pending'")
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .expect("Failed to update jobs");
    }

    pub async fn get_migrations(&self) -> Vec<i64> {
        sqlx::query_scalar("select id from _queuectl_migrations order by id asc")
            .fetch_all(&self.pool)
            .await
            .expect("Failed to get migrations")
    }

    pub async fn add_job(&self, id: &str, command: &str, max_retries: u32) -> Job {
        add_job(&self.pool, id, command, max_retries, Utc::now())
            .await
            .expect("Failed to add job")
    }
}

pub async fn create_test_database() -> TestDatabase {
    let path = std::env::temp_dir().join(format!(
        "__test_queuectl_{}.db",
        uuid::Uuid::now_v7().simple()
    ));

    let pool = db::connect(&db::database_url(&path), 4)
        .await
        .expect("Failed to open test database");

    TestDatabase { pool, path }
}

pub async fn with_test_db<F, Fut>(test_fn: F)
where
    F: FnOnce(TestDatabase) -> Fut + 'static,
    Fut: std::future::Future<Output = ()>,
{
    let local_set = LocalSet::new();

    local_set
        .run_until(async move {
            let test_db = create_test_database().await;
            let test_db_2 = test_db.clone();

            let result = tokio::task::spawn_local(async move {
                test_fn(test_db_2).await;
            })
            .await;

            test_db.drop().await;
            result.expect("Test failed");
        })
        .await;
}

/// Polls `check` until it returns true or `timeout` elapses.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

pub fn enable_logs() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let fmt_layer = tracing_subscriber::fmt::layer().with_test_writer();
        let filter_layer =
            EnvFilter::try_new("debug,sqlx=warn").expect("Failed to create log filter");

        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .init();
    });
}
