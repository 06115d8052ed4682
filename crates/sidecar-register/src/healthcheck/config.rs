//! Health check configuration
//!
//! Zero or empty fields select the per-type defaults when the check is built.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::HealthCheckError;

// Health check types
pub const HTTP_HEALTH_CHECK: &str = "http";
pub const HTTPS_HEALTH_CHECK: &str = "https";
pub const TCP_HEALTH_CHECK: &str = "tcp";
pub const COMMAND_HEALTH_CHECK: &str = "file";

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration of one health check
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// One of `http`, `https`, `tcp` or `file`
    #[serde(rename = "type")]
    pub check_type: String,
    /// URL for network checks, command path for `file`
    pub value: String,
    /// Interval between executions in milliseconds
    pub interval_ms: u64,
    /// Per-execution timeout in milliseconds
    pub timeout_ms: u64,
    /// HTTP method
    pub method: String,
    /// Expected HTTP status, or expected exit code for commands
    pub code: i32,
    /// Command arguments
    pub args: Vec<String>,
    /// PEM bundle trusted for `https` checks
    pub ca_cert_path: String,
}

impl HealthCheckConfig {
    pub fn new(check_type: &str, value: &str) -> Self {
        Self {
            check_type: check_type.to_string(),
            value: value.to_string(),
            ..Default::default()
        }
    }

    /// Parses a command-line value such as `http://localhost:8080/health`,
    /// `tcp://localhost:9080` or `file:///usr/bin/check`.
    ///
    /// The check type comes from the URL scheme; only default settings are
    /// available in this form.
    pub fn from_flag(value: &str) -> Result<Self, HealthCheckError> {
        let parsed = url::Url::parse(value).map_err(|e| HealthCheckError::InvalidUrl {
            url: value.to_string(),
            reason: e.to_string(),
        })?;

        match parsed.scheme() {
            HTTP_HEALTH_CHECK | HTTPS_HEALTH_CHECK | TCP_HEALTH_CHECK => {
                Ok(Self::new(parsed.scheme(), value))
            }
            COMMAND_HEALTH_CHECK => Ok(Self::new(COMMAND_HEALTH_CHECK, parsed.path())),
            other => Err(HealthCheckError::UnsupportedType(other.to_string())),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_code(mut self, code: i32) -> Self {
        self.code = code;
        self
    }

    pub fn interval(&self) -> Duration {
        if self.interval_ms == 0 {
            DEFAULT_INTERVAL
        } else {
            Duration::from_millis(self.interval_ms)
        }
    }

    pub fn timeout(&self) -> Duration {
        if self.timeout_ms == 0 {
            DEFAULT_TIMEOUT
        } else {
            Duration::from_millis(self.timeout_ms)
        }
    }
}
