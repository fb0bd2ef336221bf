use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::resilience::RetryPolicy;
use crate::storage::backup::DEFAULT_CAPACITY;

/// Application configuration loaded from environment variables.
/// Every variable is optional; malformed values fail startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind_addr: String,
    pub rust_log: String,
    /// File store directory. `None` keeps documents in memory only.
    pub data_dir: Option<PathBuf>,
    pub backup_capacity: usize,
    pub retry_max_attempts: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    /// Probed at startup and by `GET /api/v1/connectivity`.
    pub probe_url: Option<String>,
    pub probe_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 7878,
            bind_addr: "127.0.0.1".to_string(),
            rust_log: "info".to_string(),
            data_dir: None,
            backup_capacity: DEFAULT_CAPACITY,
            retry_max_attempts: 3,
            retry_base_ms: 1000,
            retry_max_ms: 8000,
            probe_url: None,
            probe_timeout_ms: 3000,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        Ok(Config {
            port: parse_or("PORT", &lookup, defaults.port)?,
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            rust_log: lookup("RUST_LOG").unwrap_or(defaults.rust_log),
            data_dir: non_empty(lookup("KEEPER_DATA_DIR")).map(PathBuf::from),
            backup_capacity: parse_or("KEEPER_BACKUP_CAPACITY", &lookup, defaults.backup_capacity)?
                .max(1),
            retry_max_attempts: parse_or(
                "KEEPER_RETRY_MAX_ATTEMPTS",
                &lookup,
                defaults.retry_max_attempts,
            )?
            .max(1),
            retry_base_ms: parse_or("KEEPER_RETRY_BASE_MS", &lookup, defaults.retry_base_ms)?,
            retry_max_ms: parse_or("KEEPER_RETRY_MAX_MS", &lookup, defaults.retry_max_ms)?,
            probe_url: non_empty(lookup("KEEPER_PROBE_URL")),
            probe_timeout_ms: parse_or(
                "KEEPER_PROBE_TIMEOUT_MS",
                &lookup,
                defaults.probe_timeout_ms,
            )?,
        })
    }

    /// Retry policy for store writes.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(self.retry_max_attempts)
            .with_delays(
                Duration::from_millis(self.retry_base_ms),
                Duration::from_millis(self.retry_max_ms.max(self.retry_base_ms)),
            )
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

fn parse_or<T>(key: &str, lookup: &impl Fn(&str) -> Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match non_empty(lookup(key)) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
