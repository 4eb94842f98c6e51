//! Client configuration.
//!
//! Everything the client needs is carried in explicit values built once
//! at startup and passed in at construction. Polling code never reads
//! the environment.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default Replicate REST base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.replicate.com/v1";

/// Errors raised while reading configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    /// A variable is set but cannot be parsed.
    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Transport settings for the Replicate API.
#[derive(Clone)]
pub struct ReplicateConfig {
    /// Bearer token sent with every API call.
    pub api_token: String,
    /// REST base URL without a trailing slash.
    pub base_url: String,
    /// Bound on a single HTTP request (creation, one poll, one download).
    pub request_timeout: Duration,
    /// Bound on establishing a connection.
    pub connect_timeout: Duration,
    /// Send `Prefer: wait` so fast predictions finish within the
    /// creation call.
    pub prefer_wait: bool,
}

impl fmt::Debug for ReplicateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicateConfig")
            .field("api_token", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("prefer_wait", &self.prefer_wait)
            .finish()
    }
}

impl ReplicateConfig {
    /// Configuration with default endpoints and timeouts.
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            prefer_wait: false,
        }
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default                        |
    /// |----------------------------------|--------------------------------|
    /// | `REPLICATE_API_TOKEN`            | required                       |
    /// | `REPLICATE_BASE_URL`             | `https://api.replicate.com/v1` |
    /// | `REPLICATE_REQUEST_TIMEOUT_SECS` | `60`                           |
    /// | `REPLICATE_CONNECT_TIMEOUT_SECS` | `10`                           |
    /// | `REPLICATE_PREFER_WAIT`          | `false`                        |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_token = lookup("REPLICATE_API_TOKEN")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::Missing("REPLICATE_API_TOKEN"))?;

        let base_url = lookup("REPLICATE_BASE_URL")
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            api_token,
            base_url,
            request_timeout: Duration::from_secs(parse_var(
                &lookup,
                "REPLICATE_REQUEST_TIMEOUT_SECS",
                60u64,
            )?),
            connect_timeout: Duration::from_secs(parse_var(
                &lookup,
                "REPLICATE_CONNECT_TIMEOUT_SECS",
                10u64,
            )?),
            prefer_wait: parse_flag(&lookup, "REPLICATE_PREFER_WAIT", false)?,
        })
    }
}

/// Deadline and cadence settings for the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Longest time to wait for a terminal state.
    pub deadline: Duration,
    /// Pause between status calls.
    pub poll_interval: Duration,
    /// Minimum spacing between progress callbacks.
    pub progress_interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(300),
            poll_interval: Duration::from_millis(1500),
            progress_interval: Duration::from_secs(5),
        }
    }
}

impl PollConfig {
    /// Load polling settings from environment variables with defaults.
    ///
    /// | Env Var                       | Default |
    /// |-------------------------------|---------|
    /// | `MUSE_MAX_WAIT_SECS`          | `300`   |
    /// | `MUSE_POLL_INTERVAL_MS`       | `1500`  |
    /// | `MUSE_PROGRESS_INTERVAL_SECS` | `5`     |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let poll_ms: u64 = parse_var(&lookup, "MUSE_POLL_INTERVAL_MS", 1500)?;
        if poll_ms == 0 {
            return Err(ConfigError::Invalid {
                var: "MUSE_POLL_INTERVAL_MS",
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            deadline: Duration::from_secs(parse_var(&lookup, "MUSE_MAX_WAIT_SECS", 300)?),
            poll_interval: Duration::from_millis(poll_ms),
            progress_interval: Duration::from_secs(parse_var(
                &lookup,
                "MUSE_PROGRESS_INTERVAL_SECS",
                5,
            )?),
        })
    }
}

/// Parse an optional variable, falling back to `default` when unset.
pub fn parse_var<T, F>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                var,
                value: raw.clone(),
                reason: e.to_string(),
            })
        }
        _ => Ok(default),
    }
}

/// Parse a boolean flag (`true/false`, `1/0`, `yes/no`, `on/off`).
pub fn parse_flag<F>(lookup: &F, var: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(raw) if !raw.trim().is_empty() => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                var,
                value: raw.clone(),
                reason: "expected a boolean".to_string(),
            }),
        },
        _ => Ok(default),
    }
}
