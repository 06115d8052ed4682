//! Builds health checks and agents from configuration

use std::sync::Arc;

use tracing::debug;

use super::agent::{Agent, HealthCheckAgent};
use super::checker::Check;
use super::command::CommandCheck;
use super::config::{
    COMMAND_HEALTH_CHECK, HTTP_HEALTH_CHECK, HTTPS_HEALTH_CHECK, HealthCheckConfig,
    TCP_HEALTH_CHECK,
};
use super::http::HttpCheck;
use super::tcp::TcpCheck;
use crate::error::HealthCheckError;

/// Builds the check implementation selected by the configured type
pub fn build_check(config: &HealthCheckConfig) -> Result<Arc<dyn Check>, HealthCheckError> {
    let check: Arc<dyn Check> = match config.check_type.as_str() {
        HTTP_HEALTH_CHECK | HTTPS_HEALTH_CHECK => Arc::new(HttpCheck::new(config)?),
        TCP_HEALTH_CHECK => Arc::new(TcpCheck::new(config)?),
        COMMAND_HEALTH_CHECK => Arc::new(CommandCheck::new(config)?),
        other => return Err(HealthCheckError::UnsupportedType(other.to_string())),
    };

    debug!(check = check.name(), "Built health check");
    Ok(check)
}

/// Builds an agent running the configured check on its configured interval
pub fn build_agent(config: &HealthCheckConfig) -> Result<Agent, HealthCheckError> {
    let check = build_check(config)?;
    Ok(Agent::new(check, config.interval()))
}

/// Builds one agent per configuration, failing on the first invalid entry
pub fn build_agents(
    configs: &[HealthCheckConfig],
) -> Result<Vec<Arc<dyn HealthCheckAgent>>, HealthCheckError> {
    configs
        .iter()
        .map(|config| build_agent(config).map(|agent| Arc::new(agent) as Arc<dyn HealthCheckAgent>))
        .collect()
}
