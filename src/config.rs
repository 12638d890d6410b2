//! Environment-driven configuration.

use std::str::FromStr;
use std::time::Duration;

use crate::policy::{DEFAULT_MAX_INITIAL_REVIEWERS, MAX_INITIAL_REVIEWERS};

/// Read `key` from the environment, parsed as `T`.
///
/// Missing variables yield `default` silently; unparsable ones yield
/// `default` with a warning.
pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key = key, value = %raw, "Unparsable configuration value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Human-readable, for local development.
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Bind host (default: 0.0.0.0).
    pub host: String,
    /// Bind port (default: 8080).
    pub port: u16,
    /// Log output format (default: json).
    pub log_format: LogFormat,
    /// Reviewers assigned when a pull request is created (default and maximum: 2).
    pub max_initial_reviewers: usize,
    /// Per-operation deadline; `None` disables it (default: 5000 ms).
    pub operation_timeout: Option<Duration>,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let timeout_ms: u64 = env_or("OPERATION_TIMEOUT_MS", 5000);
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("PORT", 8080),
            log_format: env_or("LOG_FORMAT", LogFormat::Json),
            max_initial_reviewers: initial_reviewer_limit(),
            operation_timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
        }
    }

    /// `host:port`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn initial_reviewer_limit() -> usize {
    let limit = env_or("MAX_INITIAL_REVIEWERS", DEFAULT_MAX_INITIAL_REVIEWERS);
    if limit > MAX_INITIAL_REVIEWERS {
        tracing::warn!(
            value = limit,
            max = MAX_INITIAL_REVIEWERS,
            "MAX_INITIAL_REVIEWERS above the maximum, using default"
        );
        return DEFAULT_MAX_INITIAL_REVIEWERS;
    }
    limit
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_format: LogFormat::Json,
            max_initial_reviewers: DEFAULT_MAX_INITIAL_REVIEWERS,
            operation_timeout: Some(Duration::from_millis(5000)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_parses_and_falls_back() {
        std::env::set_var("PR_REVIEWER_TEST_PORT", "9090");
        std::env::set_var("PR_REVIEWER_TEST_BAD", "ninety");

        assert_eq!(env_or("PR_REVIEWER_TEST_PORT", 8080u16), 9090);
        assert_eq!(env_or("PR_REVIEWER_TEST_BAD", 8080u16), 8080);
        assert_eq!(env_or("PR_REVIEWER_TEST_MISSING", 7u32), 7);

        std::env::remove_var("PR_REVIEWER_TEST_PORT");
        std::env::remove_var("PR_REVIEWER_TEST_BAD");
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_reviewer_limit_above_maximum_falls_back() {
        std::env::set_var("MAX_INITIAL_REVIEWERS", "4");
        assert_eq!(ServiceConfig::from_env().max_initial_reviewers, 2);

        std::env::set_var("MAX_INITIAL_REVIEWERS", "1");
        assert_eq!(ServiceConfig::from_env().max_initial_reviewers, 1);

        std::env::remove_var("MAX_INITIAL_REVIEWERS");
    }

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.max_initial_reviewers, 2);
        assert_eq!(config.operation_timeout, Some(Duration::from_millis(5000)));
    }
}
