use std::fmt::{Display, Formatter};
use std::str::FromStr;

use sqlx::{query, query_scalar, SqliteExecutor};
use tracing::warn;

use crate::errors::Result;

/// Operator-tunable keys stored in the `config` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    /// Retries granted to jobs enqueued without `max_retries`
    DefaultMaxRetries,
    /// Base of the exponential retry backoff, in seconds
    BackoffBase,
}

impl ConfigKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::DefaultMaxRetries => "default_max_retries",
            ConfigKey::BackoffBase => "backoff_base",
        }
    }

    pub fn default_value(&self) -> u32 {
        match self {
            ConfigKey::DefaultMaxRetries => 3,
            ConfigKey::BackoffBase => 2,
        }
    }
}

impl Display for ConfigKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConfigKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "default_max_retries" => Ok(ConfigKey::DefaultMaxRetries),
            "backoff_base" => Ok(ConfigKey::BackoffBase),
            _ => Err(format!(
                "unknown config key '{s}', expected default_max_retries or backoff_base"
            )),
        }
    }
}

#[tracing::instrument(skip_all, err, fields(otel.kind="client", db.system="sqlite", key = key))]
pub async fn get_config<'e>(executor: impl SqliteExecutor<'e>, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> = query_scalar("select value from config where key = $1")
        .bind(key)
        .fetch_optional(executor)
        .await?;

    Ok(value.flatten())
}

#[tracing::instrument(skip_all, err, fields(otel.kind="client", db.system="sqlite", key = key))]
pub async fn set_config<'e>(executor: impl SqliteExecutor<'e>, key: &str, value: &str) -> Result<()> {
    query("insert into config (key, value) values ($1, $2) on conflict (key) do update set value = excluded.value")
        .bind(key)
        .bind(value)
        .execute(executor)
        .await?;

    Ok(())
}

/// Reads an integer setting, falling back to the key's default when it is unset
/// or unparsable. Never cached: every call hits the store.
pub async fn get_config_u32<'e>(executor: impl SqliteExecutor<'e>, key: ConfigKey) -> Result<u32> {
    let raw = get_config(executor, key.as_str()).await?;

    let value = match raw {
        None => key.default_value(),
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key = key.as_str(), value = %raw, "Invalid config value, using default");
            key.default_value()
        }),
    };

    Ok(value)
}
