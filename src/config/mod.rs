//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast on malformed values. The Redis URL is
//! wrapped in secrecy::SecretString since it may embed credentials.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::{Error, Result};

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_TASK_TIMEOUT_SECS: u64 = 10;
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_MAX_REDELIVERIES: u32 = 5;

#[derive(Debug)]
pub struct Config {
    pub redis_url: SecretString,
    /// Per-task processing budget. The lock TTL set at migration time is
    /// `discovered_tasks × per_task_timeout + 1s`.
    pub per_task_timeout: Duration,
    /// Selector backoff when the waiting set is empty or the lock is contended.
    pub poll_interval: Duration,
    /// Crash-recovery redeliveries allowed before a task is dead-lettered.
    pub max_redeliveries: u32,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            redis_url: SecretString::from(
                std::env::var("REDIS_URL").unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string()),
            ),
            per_task_timeout: Duration::from_secs(parsed_var(
                "FAIRQ_TASK_TIMEOUT_SECS",
                DEFAULT_TASK_TIMEOUT_SECS,
            )?),
            poll_interval: Duration::from_millis(parsed_var(
                "FAIRQ_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )?),
            max_redeliveries: parsed_var("FAIRQ_MAX_REDELIVERIES", DEFAULT_MAX_REDELIVERIES)?,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("invalid value for {name}: {raw}"))),
        Err(_) => Ok(default),
    }
}
