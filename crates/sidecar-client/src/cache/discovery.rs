//! Caching wrapper around a `ServiceDiscovery` client

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sidecar_api::{InstanceFilter, Result, ServiceDiscovery, ServiceInstance};
use tracing::debug;

use super::{Refresh, Snapshot, spawn_refresh_loop};

/// service name -> instances
type ServiceIndex = HashMap<String, Vec<ServiceInstance>>;

/// Registry view refreshed in the background on a fixed interval.
///
/// Reads are answered from the last successful refresh; before the first
/// refresh completes they return empty results.
pub struct DiscoveryCache {
    discovery: Arc<dyn ServiceDiscovery>,
    snapshot: Snapshot<ServiceIndex>,
}

impl DiscoveryCache {
    /// Creates the cache and starts its refresh task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(discovery: Arc<dyn ServiceDiscovery>, poll_interval: Duration) -> Arc<Self> {
        let cache = Arc::new(Self {
            discovery,
            snapshot: Snapshot::new(HashMap::new()),
        });
        spawn_refresh_loop(&cache, poll_interval);
        cache
    }

    /// Fetches every instance and swaps in the rebuilt index
    pub async fn refresh(&self) -> Result<()> {
        let instances = self
            .discovery
            .list_instances(&InstanceFilter::default())
            .await?;

        let mut index: ServiceIndex = HashMap::new();
        for instance in instances {
            index
                .entry(instance.service_name.clone())
                .or_default()
                .push(instance);
        }

        debug!(services = index.len(), "Discovery cache refreshed");
        self.snapshot.store(index);
        Ok(())
    }

    /// Number of successful refreshes so far
    pub fn refresh_count(&self) -> u64 {
        self.snapshot.refreshes()
    }
}

#[async_trait]
impl Refresh for DiscoveryCache {
    fn name(&self) -> &'static str {
        "discovery"
    }

    async fn refresh(&self) -> Result<()> {
        DiscoveryCache::refresh(self).await
    }
}

#[async_trait]
impl ServiceDiscovery for DiscoveryCache {
    async fn list_services(&self) -> Result<Vec<String>> {
        let index = self.snapshot.load();
        let mut services: Vec<String> = index.keys().cloned().collect();
        services.sort();
        Ok(services)
    }

    async fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<ServiceInstance>> {
        let index = self.snapshot.load();

        let instances = if filter.service_name.is_empty() {
            index.values().flatten().filter(|i| filter.matches(i)).cloned().collect()
        } else {
            index
                .get(&filter.service_name)
                .map(|list| list.iter().filter(|i| filter.matches(i)).cloned().collect())
                .unwrap_or_default()
        };

        Ok(instances)
    }

    async fn list_service_instances(&self, service_name: &str) -> Result<Vec<ServiceInstance>> {
        let index = self.snapshot.load();
        Ok(index.get(service_name).cloned().unwrap_or_default())
    }
}
