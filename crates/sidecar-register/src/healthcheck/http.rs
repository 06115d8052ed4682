//! HTTP and HTTPS health check

use std::time::Duration;

use reqwest::{Certificate, Client, Method};
use tracing::debug;

use super::checker::Check;
use super::config::{HTTP_HEALTH_CHECK, HTTPS_HEALTH_CHECK, HealthCheckConfig};
use crate::error::{CheckError, HealthCheckError};

const DEFAULT_METHOD: &str = "GET";
const DEFAULT_STATUS_CODE: u16 = 200;

const SUPPORTED_METHODS: [&str; 9] = [
    "GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "CONNECT", "OPTIONS", "TRACE",
];

/// Sends one request per execution and expects a fixed status code
#[derive(Debug)]
pub struct HttpCheck {
    name: String,
    client: Client,
    url: String,
    method: Method,
    expected: u16,
    timeout: Duration,
}

impl HttpCheck {
    pub fn new(config: &HealthCheckConfig) -> Result<Self, HealthCheckError> {
        match config.check_type.as_str() {
            "" | HTTP_HEALTH_CHECK | HTTPS_HEALTH_CHECK => {}
            other => return Err(HealthCheckError::UnsupportedType(other.to_string())),
        }

        if config.value.is_empty() {
            return Err(HealthCheckError::EmptyValue { check: "HTTP" });
        }

        let url = url::Url::parse(&config.value).map_err(|e| HealthCheckError::InvalidUrl {
            url: config.value.clone(),
            reason: e.to_string(),
        })?;
        if url.scheme() != HTTP_HEALTH_CHECK && url.scheme() != HTTPS_HEALTH_CHECK {
            return Err(HealthCheckError::InvalidUrl {
                url: config.value.clone(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(HealthCheckError::InvalidUrl {
                url: config.value.clone(),
                reason: "missing host".to_string(),
            });
        }

        let method_name = if config.method.is_empty() {
            DEFAULT_METHOD.to_string()
        } else {
            config.method.to_uppercase()
        };
        if !SUPPORTED_METHODS.contains(&method_name.as_str()) {
            return Err(HealthCheckError::InvalidMethod(config.method.clone()));
        }
        let method = Method::from_bytes(method_name.as_bytes())
            .map_err(|_| HealthCheckError::InvalidMethod(config.method.clone()))?;

        let expected = match config.code {
            0 => DEFAULT_STATUS_CODE,
            code @ 100..=599 => code as u16,
            code => return Err(HealthCheckError::InvalidStatusCode(code)),
        };

        let timeout = config.timeout();
        let mut builder = Client::builder().timeout(timeout);
        if !config.ca_cert_path.is_empty() {
            let pem = std::fs::read(&config.ca_cert_path).map_err(|e| {
                HealthCheckError::CaCertificate {
                    path: config.ca_cert_path.clone(),
                    reason: e.to_string(),
                }
            })?;
            let cert = Certificate::from_pem(&pem).map_err(|e| HealthCheckError::CaCertificate {
                path: config.ca_cert_path.clone(),
                reason: e.to_string(),
            })?;
            builder = builder.add_root_certificate(cert);
        }
        let client = builder
            .build()
            .map_err(|e| HealthCheckError::HttpClient(e.to_string()))?;

        Ok(Self {
            name: format!("{} {} {}", url.scheme(), method, config.value),
            client,
            url: config.value.clone(),
            method,
            expected,
            timeout,
        })
    }

    pub fn expected_status(&self) -> u16 {
        self.expected
    }

    pub fn method(&self) -> &Method {
        &self.method
    }
}

#[async_trait::async_trait]
impl Check for HttpCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self) -> Result<(), CheckError> {
        let response = self
            .client
            .request(self.method.clone(), &self.url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CheckError::Timeout {
                        target: self.url.clone(),
                        timeout: self.timeout,
                    }
                } else {
                    CheckError::Request(e.to_string())
                }
            })?;

        let actual = response.status().as_u16();
        if actual != self.expected {
            debug!(url = %self.url, expected = self.expected, actual, "HTTP health check failed");
            return Err(CheckError::UnexpectedStatus {
                expected: self.expected,
                actual,
            });
        }

        Ok(())
    }
}
