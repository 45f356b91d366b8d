use std::str::FromStr;
use std::time::Duration;
use strum_macros::{Display, EnumString};
use thiserror::Error;

use crate::tasks::WorkerConfig;

/// Where the process is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ExecutionEnvironment {
    Local,
    Test,
    Production,
}

impl ExecutionEnvironment {
    /// Local and test runs skip the stats debounce and allow dev-only routes
    pub fn is_local(&self) -> bool {
        matches!(self, ExecutionEnvironment::Local | ExecutionEnvironment::Test)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Process configuration read from environment variables
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: ExecutionEnvironment,
    pub bind_address: String,
    /// Postgres is used when set; in-memory stores otherwise
    pub database_url: Option<String>,
    /// Delay before a stats update starts outside local environments
    pub stats_debounce: Duration,
    pub task_timeout: Duration,
    pub worker: WorkerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: ExecutionEnvironment::Production,
            bind_address: "0.0.0.0:3000".to_string(),
            database_url: None,
            stats_debounce: Duration::from_secs(10),
            task_timeout: Duration::from_secs(60),
            worker: WorkerConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let environment = match lookup("APP_ENV") {
            Some(value) => ExecutionEnvironment::from_str(&value).map_err(|_| ConfigError::Invalid {
                key: "APP_ENV",
                value,
            })?,
            None => defaults.environment,
        };

        let worker = WorkerConfig {
            poll_interval: millis(&lookup, "TASK_POLL_INTERVAL_MS")?
                .unwrap_or(defaults.worker.poll_interval),
            batch_size: parse(&lookup, "TASK_BATCH_SIZE")?.unwrap_or(defaults.worker.batch_size),
            max_attempts: parse(&lookup, "TASK_MAX_ATTEMPTS")?
                .unwrap_or(defaults.worker.max_attempts),
            retry_base_delay: millis(&lookup, "TASK_RETRY_BASE_MS")?
                .unwrap_or(defaults.worker.retry_base_delay),
        };

        Ok(Self {
            environment,
            bind_address: lookup("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            stats_debounce: parse(&lookup, "STATS_DEBOUNCE_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.stats_debounce),
            task_timeout: parse(&lookup, "TASK_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.task_timeout),
            worker,
        })
    }
}

fn parse<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value })
        })
        .transpose()
}

fn millis<F>(lookup: &F, key: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(parse(lookup, key)?.map(Duration::from_millis))
}
