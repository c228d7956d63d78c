use chrono::Utc;
use futures::future::join_all;
use queuectl::db;
use queuectl::sql::add_job::add_job;
use queuectl::sql::get_job::get_job;
use queuectl_migrations::migrate;
use sqlx::{Connection, SqliteConnection};

mod helpers;

fn temp_database_url() -> (std::path::PathBuf, String) {
    let path = std::env::temp_dir().join(format!(
        "__test_queuectl_{}.db",
        uuid::Uuid::now_v7().simple()
    ));
    let url = db::database_url(&path);
    (path, url)
}

fn remove_database(path: &std::path::Path) {
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
    }
}

#[tokio::test]
async fn migrate_applies_every_migration_once() {
    helpers::with_test_db(|test_db| async move {
        assert_eq!(test_db.get_migrations().await, vec![1, 2]);

        test_db
            .worker_utils()
            .migrate()
            .await
            .expect("Re-running migrate should succeed");
        assert_eq!(test_db.get_migrations().await, vec![1, 2]);
    })
    .await;
}

#[tokio::test]
async fn migrate_creates_schema() {
    helpers::with_test_db(|test_db| async move {
        let tables: Vec<String> = sqlx::query_scalar(
            "select name from sqlite_master where type = 'table' and name not like 'sqlite_%' order by name",
        )
        .fetch_all(&test_db.pool)
        .await
        .unwrap();
        assert_eq!(tables, vec!["_queuectl_migrations", "config", "jobs"]);

        let columns: Vec<String> = sqlx::query_scalar("select name from pragma_table_info('jobs')")
            .fetch_all(&test_db.pool)
            .await
            .unwrap();
        for column in [
            "id",
            "command",
            "state",
            "attempts",
            "max_retries",
            "created_at",
            "updated_at",
            "available_at",
            "worker",
            "last_error",
        ] {
            assert!(columns.iter().any(|c| c == column), "missing column {column}");
        }
    })
    .await;
}

#[tokio::test]
async fn fresh_pool_returns_full_rows_right_after_migrating() {
    let (path, url) = temp_database_url();
    let pool = db::connect(&url, 4).await.expect("Failed to open database");

    let now = Utc::now();
    let added = join_all((0..4).map(|i| {
        let pool = pool.clone();
        async move { add_job(&pool, &format!("job{i}"), "true", 3, now).await }
    }))
    .await;
    for job in added {
        let job = job.expect("First inserts on a fresh pool should return the row");
        assert!(job.last_error().is_none());
    }

    let claims = join_all((0..4).map(|i| {
        let pool = pool.clone();
        async move { get_job(&pool, &format!("worker{i}"), Utc::now()).await }
    }))
    .await;
    for claim in claims {
        claim.expect("Claims on a fresh pool should decode the row");
    }

    let rows: i64 = sqlx::query_scalar("select count(*) from jobs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 4);

    pool.close().await;
    remove_database(&path);
}

#[tokio::test]
async fn concurrent_migrations_do_not_conflict() {
    let (path, url) = temp_database_url();
    let options = db::connect_options(&url).unwrap();
    let mut first = SqliteConnection::connect_with(&options).await.unwrap();
    let mut second = SqliteConnection::connect_with(&options).await.unwrap();

    let (a, b) = tokio::join!(migrate(&mut first), migrate(&mut second));
    a.unwrap();
    b.unwrap();

    let applied: Vec<i64> = sqlx::query_scalar("select id from _queuectl_migrations order by id")
        .fetch_all(&mut first)
        .await
        .unwrap();
    assert_eq!(applied, vec![1, 2]);

    first.close().await.unwrap();
    second.close().await.unwrap();
    remove_database(&path);
}
