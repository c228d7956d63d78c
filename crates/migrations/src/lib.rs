pub mod sql;

use indoc::indoc;
use sql::QUEUE_MIGRATIONS;
use sqlx::{query, query_scalar, Connection, SqliteConnection, SqliteExecutor};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("Error occured while migrate: {0}")]
    SqlError(#[from] sqlx::Error),
}

/// Creates the table that records applied migrations.
async fn install_migrations_table<'e>(executor: impl SqliteExecutor<'e>) -> Result<(), MigrateError> {
    query(indoc! {r#"
        create table if not exists _queuectl_migrations (
            id integer primary key,
            ts text not null default current_timestamp
        );
    "#})
    .execute(executor)
    .await?;

    Ok(())
}

/// Returns the id of the last migration that was run against the database.
async fn get_last_migration<'e>(
    executor: impl SqliteExecutor<'e>,
) -> Result<Option<u32>, MigrateError> {
    let id: Option<i64> = query_scalar("select max(id) from _queuectl_migrations")
        .fetch_one(executor)
        .await?;

    Ok(id.and_then(|id| id.try_into().ok()))
}

/// Runs the pending migrations on `conn`.
///
/// Safe to call concurrently from several processes sharing one database file:
/// each migration claims its row in `_queuectl_migrations` as the first write of
/// its transaction, so a migration applied by another process is skipped.
///
/// Migrate before opening a pool on the database. A connection that loaded the
/// schema before a migration altered `jobs` reports stale columns for
/// `returning *` statements.
pub async fn migrate(conn: &mut SqliteConnection) -> Result<(), MigrateError> {
    install_migrations_table(&mut *conn).await?;
    let last_migration = get_last_migration(&mut *conn).await?;

    let mut highest_migration = 0;
    let mut migrated = false;
    for migration in QUEUE_MIGRATIONS.iter() {
        let migration_number = migration.migration_number();
        highest_migration = highest_migration.max(migration_number);

        if last_migration.is_some_and(|last| migration_number <= last) {
            continue;
        }

        let mut tx = Connection::begin(&mut *conn).await?;
        let claimed = query("insert or ignore into _queuectl_migrations (id) values ($1)")
            .bind(migration_number as i64)
            .execute(tx.as_mut())
            .await?
            .rows_affected();

        if claimed == 0 {
            tx.rollback().await?;
            continue;
        }

        info!(
            migration_number,
            migration_name = migration.name(),
            "Running migration {}",
            migration.name(),
        );
        migration.execute(&mut tx).await?;
        tx.commit().await?;
        migrated = true;
    }

    if migrated {
        info!("Migrations complete");
    }

    if let Some(last_migration) = last_migration {
        if highest_migration < last_migration {
            warn!(
                last_migration,
                highest_migration,
                "Database is using queue schema revision {}, but this build only knows revisions up to {}. Attempting to continue regardless.",
                last_migration,
                highest_migration,
            );
        }
    }

    Ok(())
}
