//! Command health check
//!
//! Runs a local executable; the check is healthy when it exits with the
//! expected code before the timeout. Output is discarded.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::warn;

use super::checker::Check;
use super::config::{COMMAND_HEALTH_CHECK, HealthCheckConfig};
use crate::error::{CheckError, HealthCheckError};

#[derive(Debug)]
pub struct CommandCheck {
    name: String,
    command: String,
    args: Vec<String>,
    expected: i32,
    timeout: Duration,
}

impl CommandCheck {
    pub fn new(config: &HealthCheckConfig) -> Result<Self, HealthCheckError> {
        if config.check_type != COMMAND_HEALTH_CHECK {
            return Err(HealthCheckError::UnsupportedType(config.check_type.clone()));
        }
        if config.value.is_empty() {
            return Err(HealthCheckError::EmptyValue { check: "command" });
        }

        let name = std::iter::once(config.value.as_str())
            .chain(config.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");

        Ok(Self {
            name,
            command: config.value.clone(),
            args: config.args.clone(),
            expected: config.code,
            timeout: config.timeout(),
        })
    }
}

#[async_trait::async_trait]
impl Check for CommandCheck {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self) -> Result<(), CheckError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CheckError::Spawn {
                command: self.command.clone(),
                reason: e.to_string(),
            })?;

        match timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => match status.code() {
                Some(code) if code == self.expected => Ok(()),
                Some(code) => Err(CheckError::ExitCode {
                    command: self.command.clone(),
                    expected: self.expected,
                    actual: code,
                }),
                None => Err(CheckError::Terminated {
                    command: self.command.clone(),
                }),
            },
            Ok(Err(e)) => Err(CheckError::Spawn {
                command: self.command.clone(),
                reason: e.to_string(),
            }),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill timed out health check {}: {}", self.command, e);
                }
                Err(CheckError::Timeout {
                    target: self.command.clone(),
                    timeout: self.timeout,
                })
            }
        }
    }
}
