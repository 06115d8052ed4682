//! Sidecar self-registration
//!
//! This crate provides:
//! - Health checks (HTTP/HTTPS, TCP, command) and the periodic agents that
//!   run them
//! - `HealthChecker`: aggregates agent results and drives registration on
//!   all-healthy / any-unhealthy boundaries
//! - `RegistrationAgent`: register, heartbeat, re-register and deregister
//!   against a `ServiceRegistry`
//! - Identity providers describing the local instance

pub mod error;
pub mod health_checker;
pub mod healthcheck;
pub mod identity;
pub mod registration;

pub use error::{CheckError, HealthCheckError};
pub use health_checker::{HealthChecker, Lifecycle};
pub use healthcheck::{
    Agent, Check, HealthCheckAgent, HealthCheckConfig, HealthStatus, build_agent, build_agents,
};
pub use identity::{IdentityProvider, StaticIdentity};
pub use registration::{RegistrationAgent, RegistrationConfig};
