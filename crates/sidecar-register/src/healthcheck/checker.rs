//! Health check capability and result types

use crate::error::CheckError;

/// A single health probe
#[async_trait::async_trait]
pub trait Check: Send + Sync {
    /// Human-readable description used in logs, e.g. `http GET http://localhost:8080/health`
    fn name(&self) -> &str;

    /// Performs one probe; `Ok` means healthy
    async fn execute(&self) -> Result<(), CheckError>;
}

/// Outcome of one check execution
#[derive(Debug)]
pub struct HealthStatus {
    /// Name of the check that produced this status
    pub check: String,
    /// Failure reason, `None` when healthy
    pub error: Option<CheckError>,
}

impl HealthStatus {
    pub fn healthy(check: impl Into<String>) -> Self {
        Self {
            check: check.into(),
            error: None,
        }
    }

    pub fn unhealthy(check: impl Into<String>, error: CheckError) -> Self {
        Self {
            check: check.into(),
            error: Some(error),
        }
    }

    pub fn from_result(check: impl Into<String>, result: Result<(), CheckError>) -> Self {
        match result {
            Ok(()) => Self::healthy(check),
            Err(e) => Self::unhealthy(check, e),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.error.is_none()
    }
}
