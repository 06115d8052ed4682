//! Mesh state synchronization
//!
//! Monitors keep the local proxy in line with the control plane:
//!
//! - [`ConfigPoller`] periodically fetches rendered proxy configuration
//! - [`EventListener`] applies configuration when a change event arrives
//! - [`DiscoveryMonitor`] detects changes to the registry catalog
//! - [`RulesMonitor`] detects new revisions of the routing rules
//!
//! Every monitor implements [`Monitor`]: `start` blocks until `stop` is
//! called, and failures inside a cycle are logged without ending the loop.

pub mod catalog;
pub mod discovery;
pub mod error;
pub mod listener;
pub mod poller;
pub mod rules;
mod ticker;

use async_trait::async_trait;

pub use catalog::build_catalog;
pub use discovery::{CatalogListener, DiscoveryMonitor};
pub use error::MonitorError;
pub use listener::EventListener;
pub use poller::ConfigPoller;
pub use rules::{RulesListener, RulesMonitor};

/// A long-running synchronization loop
#[async_trait]
pub trait Monitor: Send + Sync {
    /// Runs until `stop` is called
    async fn start(&self) -> Result<(), MonitorError>;

    /// Signals the running loop to exit; a no-op when idle
    fn stop(&self) -> Result<(), MonitorError>;
}
