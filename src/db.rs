use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use queuectl_migrations::migrate;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Connection, SqliteConnection, SqlitePool};

use crate::builder::WorkerBuildError;

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection options for a SQLite database shared by independent worker
/// processes.
///
/// The file is created when missing. WAL mode lets readers proceed while a
/// worker holds the write lock; the busy timeout serialises concurrent writers.
pub fn connect_options(database_url: &str) -> sqlx::Result<SqliteConnectOptions> {
    Ok(SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT))
}

/// Migrates the database, then opens a pool on it.
///
/// Migrations run on a dedicated connection that is closed before the pool
/// connects, so every pooled connection loads the final schema.
pub async fn connect(
    database_url: &str,
    max_connections: u32,
) -> Result<SqlitePool, WorkerBuildError> {
    let options = connect_options(database_url)?;

    let mut conn = SqliteConnection::connect_with(&options).await?;
    migrate(&mut conn).await?;
    conn.close().await?;

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// `sqlite://` url for a database file path.
pub fn database_url(path: &Path) -> String {
    format!("sqlite://{}", path.display())
}
