// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the request governor.
//!
//! Defaults match the limits the public API has always run with:
//! 25 requests per 10 second window, state under `data/` and `logs/`.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the governor service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:3000)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Admin endpoint configuration
    #[serde(default)]
    pub admin: AdminConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Rate limiting and persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per window before a client is banned (default: 25)
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Sliding window length in milliseconds (default: 10000)
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Informational only. Bans are permanent until lifted by an admin.
    #[serde(default)]
    pub ban_duration_secs: u64,

    /// Directory holding the ban table (default: data)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory holding the audit log (default: logs)
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Interval between idle-window sweeps in seconds (default: 60)
    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,

    /// Audit entries buffered before new ones are dropped (default: 1024)
    #[serde(default = "default_audit_queue_capacity")]
    pub audit_queue_capacity: usize,
}

/// Admin endpoint configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Shared secret for `/admin/*`. Admin calls are rejected when unset.
    #[serde(default)]
    pub secret: Option<String>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_max_requests() -> u32 {
    25
}

fn default_window_ms() -> u64 {
    10_000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_reaper_interval_secs() -> u64 {
    60
}

fn default_audit_queue_capacity() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            rate_limit: RateLimitConfig::default(),
            admin: AdminConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
            ban_duration_secs: 0,
            data_dir: default_data_dir(),
            log_dir: default_log_dir(),
            reaper_interval_secs: default_reaper_interval_secs(),
            audit_queue_capacity: default_audit_queue_capacity(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl RateLimitConfig {
    /// Get the sliding window duration
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Get the reaper sweep interval
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }

    /// Get the configured ban duration
    pub fn ban_duration(&self) -> Duration {
        Duration::from_secs(self.ban_duration_secs)
    }

    /// Path of the persisted ban table.
    pub fn ban_file(&self) -> PathBuf {
        self.data_dir.join("banned-ips.json")
    }

    /// Path of the audit log.
    pub fn audit_file(&self) -> PathBuf {
        self.log_dir.join("request-logs.log")
    }

    /// Reject limits the governor cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_requests == 0 {
            return Err(ConfigError::ZeroMaxRequests);
        }
        if self.window_ms == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.reaper_interval_secs == 0 {
            return Err(ConfigError::ZeroReaperInterval);
        }
        if self.audit_queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyPath("data"));
        }
        if self.log_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyPath("log"));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset variables fall back to defaults; set but unparsable numeric
    /// variables are an error rather than silently ignored.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = RateLimitConfig::default();

        let config = Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(default_bind_addr),
            rate_limit: RateLimitConfig {
                max_requests: parse_var(&lookup, "MAX_REQUESTS", defaults.max_requests)?,
                window_ms: parse_var(&lookup, "WINDOW_MS", defaults.window_ms)?,
                ban_duration_secs: parse_var(
                    &lookup,
                    "BAN_DURATION_SECS",
                    defaults.ban_duration_secs,
                )?,
                data_dir: lookup("DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
                log_dir: lookup("LOG_DIR").map_or(defaults.log_dir, PathBuf::from),
                reaper_interval_secs: parse_var(
                    &lookup,
                    "REAPER_INTERVAL_SECS",
                    defaults.reaper_interval_secs,
                )?,
                audit_queue_capacity: parse_var(
                    &lookup,
                    "AUDIT_QUEUE_CAPACITY",
                    defaults.audit_queue_capacity,
                )?,
            },
            admin: AdminConfig {
                secret: lookup("ADMIN_KEY").filter(|s| !s.is_empty()),
            },
            ..Default::default()
        };

        config.rate_limit.validate()?;
        Ok(config)
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidVar { var, value }),
    }
}
