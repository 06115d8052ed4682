//! Local health checks
//!
//! A `Check` performs one probe. An `Agent` runs a check on a ticker and
//! reports every result as a `HealthStatus`. The factory builds checks from
//! configuration, keyed on the check type string.

pub mod agent;
pub mod checker;
pub mod command;
pub mod config;
pub mod factory;
pub mod http;
pub mod tcp;

// Re-export common types
pub use agent::{Agent, HealthCheckAgent};
pub use checker::{Check, HealthStatus};
pub use command::CommandCheck;
pub use config::HealthCheckConfig;
pub use factory::{build_agent, build_agents, build_check};
pub use http::HttpCheck;
pub use tcp::TcpCheck;
