use derive_builder::Builder;
use getset::{Getters, MutGetters, Setters};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Errors raised while validating a job submitted by an operator.
///
/// These are rejected before anything reaches the store.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum JobSpecError {
    #[error("Invalid JSON job spec: {0}")]
    InvalidJson(String),
    #[error("Job spec must be a JSON object")]
    NotAnObject,
    #[error("Job must include \"command\"")]
    MissingCommand,
    #[error("Job \"id\" must be a non-empty string")]
    InvalidId,
    #[error("Job \"max_retries\" must be a non-negative integer, got {0}")]
    InvalidMaxRetries(String),
}

/// A job as submitted to the queue.
///
/// ```
/// use queuectl::JobSpec;
///
/// let spec = JobSpec::builder()
///     .command("echo hello")
///     .max_retries(5)
///     .build();
/// assert!(spec.id().is_none());
/// ```
#[derive(Getters, Setters, MutGetters, Debug, Default, Clone, PartialEq, Eq, Builder)]
#[getset(get = "pub", set = "pub", get_mut = "pub")]
#[builder(
    build_fn(private, name = "build_internal"),
    default,
    pattern = "owned"
)]
pub struct JobSpec {
    /// Job identifier. A UUID is generated when absent.
    #[builder(setter(into, strip_option))]
    pub id: Option<String>,

    /// Shell command to run. Required and must not be blank.
    #[builder(setter(into))]
    pub command: String,

    /// Retries allowed before dead-lettering. Falls back to the
    /// `default_max_retries` config value when absent.
    #[builder(setter(strip_option))]
    pub max_retries: Option<u32>,
}

#[derive(Deserialize)]
struct RawJobSpec {
    id: Option<Value>,
    command: Option<Value>,
    max_retries: Option<Value>,
}

impl JobSpec {
    pub fn new(command: impl Into<String>) -> Self {
        JobSpec {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn builder() -> JobSpecBuilder {
        JobSpecBuilder::new()
    }

    /// Parses an operator supplied JSON job spec such as
    /// `{"id": "job1", "command": "sleep 2", "max_retries": 3}`.
    pub fn parse(json: &str) -> Result<JobSpec, JobSpecError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| JobSpecError::InvalidJson(e.to_string()))?;
        if !value.is_object() {
            return Err(JobSpecError::NotAnObject);
        }
        let raw: RawJobSpec =
            serde_json::from_value(value).map_err(|e| JobSpecError::InvalidJson(e.to_string()))?;

        let id = match raw.id {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) => Some(id),
            Some(_) => return Err(JobSpecError::InvalidId),
        };

        let command = match raw.command {
            Some(Value::String(command)) => command,
            _ => return Err(JobSpecError::MissingCommand),
        };

        let max_retries = match raw.max_retries {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => Some(
                n.as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| JobSpecError::InvalidMaxRetries(n.to_string()))?,
            ),
            Some(other) => return Err(JobSpecError::InvalidMaxRetries(other.to_string())),
        };

        let spec = JobSpec {
            id,
            command,
            max_retries,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Checks the required fields.
    pub fn validate(&self) -> Result<(), JobSpecError> {
        if self.command.trim().is_empty() {
            return Err(JobSpecError::MissingCommand);
        }
        if self.id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(JobSpecError::InvalidId);
        }
        Ok(())
    }
}

impl JobSpecBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(self) -> JobSpec {
        self.build_internal()
            .expect("There is a default value for all fields")
    }
}
