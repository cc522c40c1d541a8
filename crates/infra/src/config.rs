//! Configuration loading and representation.
//!
//! Loaded from environment variables with defaults. Values are injected into constructors;
//! nothing below reads the environment after startup.

use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use warehouse_analysis::ReplenishmentPolicy;
use warehouse_observability::{LogConfig, LogFormat};

use crate::analysis::ReplenishmentRunnerConfig;

pub const BIND_ADDR: &str = "WAREHOUSE_BIND_ADDR";
pub const DATABASE_URL: &str = "DATABASE_URL";
pub const DATABASE_MAX_CONNECTIONS: &str = "DATABASE_MAX_CONNECTIONS";
pub const STORE_TIMEOUT_MS: &str = "WAREHOUSE_STORE_TIMEOUT_MS";
pub const ANALYSIS_INTERVAL_SECS: &str = "WAREHOUSE_ANALYSIS_INTERVAL_SECS";
pub const ANALYSIS_WINDOW_SECS: &str = "WAREHOUSE_ANALYSIS_WINDOW_SECS";
pub const ANALYSIS_DECREASE_ABOVE_PERCENT: &str = "WAREHOUSE_ANALYSIS_DECREASE_ABOVE_PERCENT";
pub const ANALYSIS_INCREASE_BELOW_PERCENT: &str = "WAREHOUSE_ANALYSIS_INCREASE_BELOW_PERCENT";
pub const LOG_FORMAT: &str = "WAREHOUSE_LOG_FORMAT";
pub const LOG_LEVEL: &str = "WAREHOUSE_LOG_LEVEL";
pub const SEED_DEMO: &str = "WAREHOUSE_SEED_DEMO";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// `PostgreSQL` configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// `None` selects the in-memory store.
    pub database: Option<DatabaseConfig>,
    /// Bound on each durable-store call.
    pub store_timeout: Duration,
    pub analysis: ReplenishmentRunnerConfig,
    pub log: LogConfig,
    /// Seed demo reference data (in-memory store only).
    pub seed_demo: bool,
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bind_addr = parse_or(&get, BIND_ADDR, "0.0.0.0:8080".parse().ok())?;

        let database = match get(DATABASE_URL) {
            Some(url) => Some(DatabaseConfig {
                url,
                max_connections: positive(&get, DATABASE_MAX_CONNECTIONS, 10)?,
            }),
            None => None,
        };

        let store_timeout =
            Duration::from_millis(positive(&get, STORE_TIMEOUT_MS, 5_000)?);
        let interval = Duration::from_secs(positive(&get, ANALYSIS_INTERVAL_SECS, 180)?);
        let window = Duration::from_secs(positive(&get, ANALYSIS_WINDOW_SECS, 180)?);

        let policy = ReplenishmentPolicy {
            decrease_above_percent: positive(&get, ANALYSIS_DECREASE_ABOVE_PERCENT, 50)?,
            increase_below_percent: positive(&get, ANALYSIS_INCREASE_BELOW_PERCENT, 30)?,
        };

        let log = LogConfig {
            format: parse_or::<LogFormat>(&get, LOG_FORMAT, Some(LogFormat::Json))?,
            level: get(LOG_LEVEL).unwrap_or_else(|| "info".to_string()),
        };

        let seed_demo = match get(SEED_DEMO) {
            None => false,
            Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::Invalid {
                key: SEED_DEMO,
                value: raw.clone(),
                reason: "expected true/false".to_string(),
            })?,
        };

        Ok(Self {
            bind_addr,
            database,
            store_timeout,
            analysis: ReplenishmentRunnerConfig {
                interval,
                window,
                policy,
                store_timeout,
            },
            log,
            seed_demo,
        })
    }
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Option<T>,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match get(key) {
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => default.ok_or_else(|| ConfigError::Invalid {
            key,
            value: String::new(),
            reason: "required".to_string(),
        }),
    }
}

fn positive<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialEq + Default,
    T::Err: Display,
{
    let value = parse_or(get, key, Some(default))?;
    if value == T::default() {
        return Err(ConfigError::Invalid {
            key,
            value: "0".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
