//! Mesh sidecar agent
//!
//! Wires the registration, health check and monitor crates into one process
//! driven by [`config::SidecarConfig`].

pub mod config;
pub mod proxy;
pub mod sidecar;
pub mod startup;

pub use config::{Cli, SidecarConfig};
pub use sidecar::Sidecar;
