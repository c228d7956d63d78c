use queuectl_migrations::MigrateError;

use crate::job_spec::JobSpecError;
use thiserror::Error;

/// Errors that can occur during queue operations.
///
/// This enum represents the various errors that can occur when interacting
/// with the job store.
#[derive(Error, Debug)]
pub enum QueueError {
    /// An error occurred while executing an SQL query
    #[error("Error occured while query: {0}")]
    SqlError(#[from] sqlx::Error),

    /// An error occurred while serializing or deserializing JSON data
    #[error("Error while serializing params: {0}")]
    JsonSerializeError(#[from] serde_json::Error),

    /// The submitted job spec was rejected before reaching the store
    #[error("Invalid job spec: {0}")]
    InvalidJobSpec(#[from] JobSpecError),

    /// A job with the same id already exists
    #[error("A job with id '{0}' already exists")]
    DuplicateId(String),

    /// Failed to apply database migrations
    #[error("Error occurred while migrating the database schema: {0}")]
    MigrationError(#[from] MigrateError),
}

/// A Result type alias for QueueError.
pub type Result<T> = core::result::Result<T, QueueError>;
