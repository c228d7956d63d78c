pub mod add_job;
pub mod complete_job;
pub mod config;
pub mod fail_job;
pub mod get_job;
pub mod list_jobs;
pub mod queue_details;
pub mod requeue_job;
pub mod return_jobs;
