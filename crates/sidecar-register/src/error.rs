//! Health check error types

use std::time::Duration;

/// Invalid health check configuration, reported when a check is built
#[derive(Debug, thiserror::Error)]
pub enum HealthCheckError {
    #[error("Healthcheck type not supported: {0}")]
    UnsupportedType(String),

    #[error("{check} health check requires a value")]
    EmptyValue { check: &'static str },

    #[error("invalid health check URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP method not supported: {0}")]
    InvalidMethod(String),

    #[error("HTTP status code {0} out of range [100, 599]")]
    InvalidStatusCode(i32),

    #[error("failed to load CA certificate {path}: {reason}")]
    CaCertificate { path: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("at least one health check is required")]
    NoHealthChecks,
}

/// Failure of a single health check execution
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("HTTP/HTTPS health check request failed: {0}")]
    Request(String),

    #[error("HTTP/HTTPS health check expected {expected}, got {actual}")]
    UnexpectedStatus { expected: u16, actual: u16 },

    #[error("TCP health check failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("{command} could not be started: {reason}")]
    Spawn { command: String, reason: String },

    #[error("{command} returned {actual}, expected {expected}")]
    ExitCode {
        command: String,
        expected: i32,
        actual: i32,
    },

    #[error("{command} terminated by signal")]
    Terminated { command: String },

    #[error("{target} timed out after {timeout:?}")]
    Timeout { target: String, timeout: Duration },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HealthCheckError::UnsupportedType("grpc".to_string());
        assert_eq!(err.to_string(), "Healthcheck type not supported: grpc");

        let err = CheckError::UnexpectedStatus {
            expected: 200,
            actual: 503,
        };
        assert_eq!(
            err.to_string(),
            "HTTP/HTTPS health check expected 200, got 503"
        );

        let err = CheckError::ExitCode {
            command: "/bin/check".to_string(),
            expected: 0,
            actual: 2,
        };
        assert_eq!(err.to_string(), "/bin/check returned 2, expected 0");
    }
}
