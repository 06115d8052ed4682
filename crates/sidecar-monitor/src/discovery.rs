//! Registry change detection
//!
//! Each cycle rebuilds the catalog from a full instance listing and compares
//! it with the last one seen. Listeners are only notified when the catalog
//! actually differs; the comparison, the cache swap and the notifications
//! all run in order on the monitor's own task.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use sidecar_api::{InstanceFilter, ServiceCatalog, ServiceDiscovery};
use tracing::{debug, info, warn};

use crate::Monitor;
use crate::catalog::build_catalog;
use crate::error::MonitorError;
use crate::ticker::Ticker;

/// Receives the new catalog after every detected change
#[async_trait]
pub trait CatalogListener: Send + Sync {
    async fn catalog_change(&self, catalog: &ServiceCatalog) -> anyhow::Result<()>;
}

pub struct DiscoveryMonitor {
    discovery: Arc<dyn ServiceDiscovery>,
    listeners: RwLock<Vec<Arc<dyn CatalogListener>>>,
    catalog: RwLock<Arc<ServiceCatalog>>,
    ticker: Ticker,
}

impl DiscoveryMonitor {
    pub fn new(discovery: Arc<dyn ServiceDiscovery>, poll_interval: Duration) -> Self {
        Self {
            discovery,
            listeners: RwLock::new(Vec::new()),
            catalog: RwLock::new(Arc::new(ServiceCatalog::default())),
            ticker: Ticker::new(poll_interval),
        }
    }

    /// Registers a listener; it is notified from the next detected change on
    pub fn add_listener(&self, listener: Arc<dyn CatalogListener>) {
        self.listeners.write().push(listener);
    }

    /// Last catalog seen, empty before the first change
    pub fn catalog(&self) -> Arc<ServiceCatalog> {
        self.catalog.read().clone()
    }

    /// Runs one detection cycle, returning whether the catalog changed
    pub async fn check(&self) -> Result<bool, MonitorError> {
        let instances = self
            .discovery
            .list_instances(&InstanceFilter::default())
            .await?;
        let catalog = build_catalog(&instances);

        if *self.catalog.read().as_ref() == catalog {
            debug!("Service catalog unchanged");
            return Ok(false);
        }

        let catalog = Arc::new(catalog);
        *self.catalog.write() = catalog.clone();
        info!(services = catalog.services.len(), "Service catalog changed");

        let listeners = self.listeners.read().clone();
        for listener in listeners {
            if let Err(e) = listener.catalog_change(&catalog).await {
                warn!(error = %e, "Catalog listener failed");
            }
        }

        Ok(true)
    }
}

#[async_trait]
impl Monitor for DiscoveryMonitor {
    async fn start(&self) -> Result<(), MonitorError> {
        info!(interval = ?self.ticker.interval(), "Starting registry change detection");
        self.ticker
            .run(|| async move {
                if let Err(e) = self.check().await {
                    warn!(error = %e, "Could not get latest catalog from registry");
                }
            })
            .await
    }

    fn stop(&self) -> Result<(), MonitorError> {
        self.ticker.stop();
        Ok(())
    }
}
