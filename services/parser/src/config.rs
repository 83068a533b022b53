//! Environment configuration shared by both binaries.

use std::time::Duration;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKind {
    Postgres { db_url: String },
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreKind,
    pub api_bind: String,
    pub db_max_connections: u32,
    pub max_upload_bytes: usize,
    pub retry: RetryPolicy,
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

impl Config {
    /// Read settings from the process environment (after `.env` is loaded).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let store = match lookup("STORE").as_deref().map(str::trim) {
            Some("memory") => StoreKind::Memory,
            None | Some("postgres") => StoreKind::Postgres {
                db_url: lookup("DB_URL").ok_or(ConfigError::Missing("DB_URL"))?,
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "STORE",
                    value: other.to_string(),
                })
            }
        };

        let retry = Self::retry_from_lookup(&lookup)?;

        let max_upload_mb: usize = parse(&lookup, "MAX_UPLOAD_MB", 50)?;
        let max_upload_bytes = max_upload_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| ConfigError::Invalid {
                key: "MAX_UPLOAD_MB",
                value: max_upload_mb.to_string(),
            })?;

        Ok(Self {
            store,
            api_bind: lookup("API_BIND").unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            db_max_connections: parse(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            max_upload_bytes,
            retry,
        })
    }

    /// Retry settings alone, for callers that never touch the database
    /// settings (dry runs).
    pub fn retry_from_env() -> Result<RetryPolicy, ConfigError> {
        Self::retry_from_lookup(&|key: &str| std::env::var(key).ok())
    }

    pub fn retry_from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<RetryPolicy, ConfigError> {
        let defaults = RetryPolicy::default();
        Ok(RetryPolicy {
            initial_delay: Duration::from_millis(parse(
                lookup,
                "RETRY_INITIAL_MS",
                defaults.initial_delay.as_millis() as u64,
            )?),
            max_delay: Duration::from_millis(parse(
                lookup,
                "RETRY_MAX_MS",
                defaults.max_delay.as_millis() as u64,
            )?),
            deadline: Duration::from_secs(parse(
                lookup,
                "RETRY_DEADLINE_SECS",
                defaults.deadline.as_secs(),
            )?),
            ..defaults
        })
    }

    /// In-memory store with default limits.
    pub fn for_memory() -> Self {
        Self {
            store: StoreKind::Memory,
            api_bind: "127.0.0.1:8080".to_string(),
            db_max_connections: 10,
            max_upload_bytes: 50 * 1024 * 1024,
            retry: RetryPolicy::default(),
        }
    }
}
