//! Collaborator contracts
//!
//! Every remote system the sidecar talks to sits behind one of these traits,
//! so that the lifecycle engines and monitors can run against caches, wire
//! clients or test doubles interchangeably.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{Event, InstanceFilter, ProxyConfig, ServiceInstance};
use crate::rules::{RuleFilter, RuleSet};

/// Registration side of the service registry
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Registers an instance and returns it with the registry-assigned ID and TTL
    async fn register(&self, instance: ServiceInstance) -> Result<ServiceInstance>;

    /// Sends a heartbeat for a registered instance
    async fn renew(&self, id: &str) -> Result<()>;

    async fn deregister(&self, id: &str) -> Result<()>;
}

/// Lookup side of the service registry
#[async_trait]
pub trait ServiceDiscovery: Send + Sync {
    async fn list_services(&self) -> Result<Vec<String>>;

    async fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<ServiceInstance>>;

    async fn list_service_instances(&self, service_name: &str) -> Result<Vec<ServiceInstance>> {
        self.list_instances(&InstanceFilter::for_service(service_name))
            .await
    }
}

/// Source of rendered proxy configuration
#[async_trait]
pub trait ControllerClient: Send + Sync {
    /// Fetches the configuration if it changed after `since`.
    ///
    /// `None` means nothing changed; passing `None` as `since` requests the
    /// full configuration unconditionally.
    async fn get_config(&self, since: Option<DateTime<Utc>>) -> Result<Option<ProxyConfig>>;
}

/// Source of routing rules
#[async_trait]
pub trait RulesService: Send + Sync {
    async fn list_rules(&self, filter: &RuleFilter) -> Result<RuleSet>;
}

/// Consumer of the change-notification bus
#[async_trait]
pub trait EventConsumer: Send + Sync {
    /// Blocks until the next event is available
    async fn receive_event(&self) -> Result<Event>;
}

/// Applies configuration to the local proxy data plane
#[async_trait]
pub trait ProxyUpdater: Send + Sync {
    async fn update(&self, config: &ProxyConfig) -> anyhow::Result<()>;
}
