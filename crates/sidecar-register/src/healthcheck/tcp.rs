//! TCP connect health check

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::checker::Check;
use super::config::{HealthCheckConfig, TCP_HEALTH_CHECK};
use crate::error::{CheckError, HealthCheckError};

/// Healthy iff a TCP connection to the target can be established in time
#[derive(Debug)]
pub struct TcpCheck {
    name: String,
    address: String,
    timeout: Duration,
}

impl TcpCheck {
    /// Builds a check from a `tcp://host:port` value
    pub fn new(config: &HealthCheckConfig) -> Result<Self, HealthCheckError> {
        if config.check_type != TCP_HEALTH_CHECK {
            return Err(HealthCheckError::UnsupportedType(config.check_type.clone()));
        }
        if config.value.is_empty() {
            return Err(HealthCheckError::EmptyValue { check: "TCP" });
        }

        let invalid = |reason: &str| HealthCheckError::InvalidUrl {
            url: config.value.clone(),
            reason: reason.to_string(),
        };

        let url = url::Url::parse(&config.value).map_err(|e| invalid(&e.to_string()))?;
        if url.scheme() != TCP_HEALTH_CHECK {
            return Err(invalid("expected tcp scheme"));
        }
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing host"))?;
        let port = url.port().ok_or_else(|| invalid("missing port"))?;

        let address = format!("{}:{}", host, port);
        Ok(Self {
            name: format!("tcp {}", address),
            address,
            timeout: config.timeout(),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait::async_trait]
impl Check for TcpCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self) -> Result<(), CheckError> {
        match timeout(self.timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => {
                debug!("TCP health check failed for {}: {}", self.address, e);
                Err(CheckError::Connect {
                    address: self.address.clone(),
                    reason: e.to_string(),
                })
            }
            Err(_) => Err(CheckError::Timeout {
                target: self.address.clone(),
                timeout: self.timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_address_from_url() {
        let check = TcpCheck::new(&HealthCheckConfig::new("tcp", "tcp://localhost:9080")).unwrap();
        assert_eq!(check.address(), "localhost:9080");
        assert_eq!(check.name(), "tcp localhost:9080");
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(matches!(
            TcpCheck::new(&HealthCheckConfig::new("http", "tcp://localhost:9080")),
            Err(HealthCheckError::UnsupportedType(_))
        ));
        assert!(matches!(
            TcpCheck::new(&HealthCheckConfig::new("tcp", "")),
            Err(HealthCheckError::EmptyValue { .. })
        ));
        assert!(matches!(
            TcpCheck::new(&HealthCheckConfig::new("tcp", "tcp://localhost")),
            Err(HealthCheckError::InvalidUrl { .. })
        ));
        assert!(matches!(
            TcpCheck::new(&HealthCheckConfig::new("tcp", "http://localhost:80")),
            Err(HealthCheckError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_connect_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let config = HealthCheckConfig::new("tcp", &format!("tcp://127.0.0.1:{}", port));
        let check = TcpCheck::new(&config).unwrap();
        assert!(check.execute().await.is_ok());
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = HealthCheckConfig::new("tcp", &format!("tcp://127.0.0.1:{}", port));
        let check = TcpCheck::new(&config).unwrap();
        assert!(matches!(
            check.execute().await,
            Err(CheckError::Connect { .. })
        ));
    }
}
