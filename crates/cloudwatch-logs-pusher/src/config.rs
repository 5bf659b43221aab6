//! Configuration for the pusher agent.
//!
//! Configuration comes from hard-coded defaults overridden by `CWL_*`
//! environment variables. Parsing is lenient: an invalid value is logged and
//! replaced by its default rather than failing startup, so a typo in one
//! variable cannot take the agent down.
//!
//! # Environment variables
//!
//! - `CWL_ENDPOINT` — sink endpoint URL
//! - `CWL_LOG_GROUP_NAME` / `CWL_LOG_STREAM_NAME` — default delivery target
//! - `CWL_FLUSH_TIMEOUT` — flush timeout in seconds
//! - `CWL_LOG_LEVEL` — agent log verbosity

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::error;

/// Default flush timeout in seconds when none is configured.
const DEFAULT_FLUSH_TIMEOUT: u64 = 5;

const DEFAULT_ENDPOINT: &str = "https://logs.us-east-1.amazonaws.com";

/// Agent configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sink endpoint URL.
    pub endpoint: String,
    /// Default log group to deliver to.
    pub log_group_name: String,
    /// Default log stream to deliver to.
    pub log_stream_name: String,
    /// Seconds the oldest buffered event may wait before a timer flush.
    pub flush_timeout: u64,
    /// Static headers attached to every sink request (auth material is
    /// supplied by the deployment, not resolved here).
    pub headers: HashMap<String, String>,
    /// Agent log verbosity.
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            log_group_name: String::new(),
            log_stream_name: String::new(),
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
            headers: HashMap::new(),
            log_level: LogLevel::default(),
        }
    }
}

impl Config {
    /// Builds a configuration from defaults and `CWL_*` environment
    /// variables.
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(endpoint) = std::env::var("CWL_ENDPOINT") {
            let endpoint = endpoint.trim();
            if !endpoint.is_empty() {
                config.endpoint = endpoint.to_string();
            }
        }
        if let Ok(group) = std::env::var("CWL_LOG_GROUP_NAME") {
            config.log_group_name = group.trim().to_string();
        }
        if let Ok(stream) = std::env::var("CWL_LOG_STREAM_NAME") {
            config.log_stream_name = stream.trim().to_string();
        }
        if let Ok(timeout) = std::env::var("CWL_FLUSH_TIMEOUT") {
            match timeout.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.flush_timeout = secs,
                _ => error!(
                    "Invalid CWL_FLUSH_TIMEOUT {:?}, using default of {}s",
                    timeout, DEFAULT_FLUSH_TIMEOUT
                ),
            }
        }
        if let Ok(level) = std::env::var("CWL_LOG_LEVEL") {
            match LogLevel::from_str(&level) {
                Ok(level) => config.log_level = level,
                Err(e) => error!("{}", e),
            }
        }

        config
    }

    /// The flush timeout as a [`Duration`].
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_secs(self.flush_timeout)
    }
}

/// Agent log level controlling verbosity of logging output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Converts this level to a `tracing` level filter.
    pub fn as_level_filter(self) -> tracing::level_filters::LevelFilter {
        match self {
            LogLevel::Error => tracing::level_filters::LevelFilter::ERROR,
            LogLevel::Warn => tracing::level_filters::LevelFilter::WARN,
            LogLevel::Info => tracing::level_filters::LevelFilter::INFO,
            LogLevel::Debug => tracing::level_filters::LevelFilter::DEBUG,
            LogLevel::Trace => tracing::level_filters::LevelFilter::TRACE,
        }
    }
}

impl AsRef<str> for LogLevel {
    fn as_ref(&self) -> &str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!(
                "Invalid log level: '{s}'. Valid levels are: error, warn, info, debug, trace",
            )),
        }
    }
}

/// Lenient deserialization: an invalid or non-string value is logged and
/// falls back to the default so the agent can still start.
impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        if let Value::String(s) = value {
            match LogLevel::from_str(&s) {
                Ok(level) => Ok(level),
                Err(e) => {
                    error!("{}", e);
                    Ok(LogLevel::default())
                }
            }
        } else {
            error!("Expected a string for log level, got {:?}", value);
            Ok(LogLevel::default())
        }
    }
}
