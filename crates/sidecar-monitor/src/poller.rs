//! Periodic controller polling

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sidecar_api::{ControllerClient, ProxyUpdater};
use tracing::{debug, info, warn};

use crate::Monitor;
use crate::error::MonitorError;
use crate::ticker::Ticker;

/// Polls the controller for proxy configuration and applies what changed.
///
/// Requests are conditional on the time of the last applied update, so an
/// unchanged configuration costs one empty response per interval.
pub struct ConfigPoller {
    controller: Arc<dyn ControllerClient>,
    updater: Arc<dyn ProxyUpdater>,
    version: Mutex<Option<DateTime<Utc>>>,
    ticker: Ticker,
}

impl ConfigPoller {
    pub fn new(
        controller: Arc<dyn ControllerClient>,
        updater: Arc<dyn ProxyUpdater>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            controller,
            updater,
            version: Mutex::new(None),
            ticker: Ticker::new(poll_interval),
        }
    }

    /// Time of the last successfully applied configuration
    pub fn version(&self) -> Option<DateTime<Utc>> {
        *self.version.lock()
    }

    /// Runs one poll cycle
    pub async fn poll(&self) -> Result<(), MonitorError> {
        let since = self.version();
        let Some(config) = self.controller.get_config(since).await? else {
            debug!("Proxy configuration unchanged");
            return Ok(());
        };
        if config.is_empty() {
            debug!("Controller returned an empty proxy configuration");
            return Ok(());
        }

        self.updater
            .update(&config)
            .await
            .map_err(MonitorError::Update)?;

        let now = Utc::now();
        *self.version.lock() = Some(now);
        info!(version = %now.to_rfc3339(), "Applied proxy configuration from controller");
        Ok(())
    }
}

#[async_trait]
impl Monitor for ConfigPoller {
    async fn start(&self) -> Result<(), MonitorError> {
        info!(interval = ?self.ticker.interval(), "Starting controller poller");
        self.ticker
            .run(|| async move {
                if let Err(e) = self.poll().await {
                    warn!(error = %e, "Controller poll failed");
                }
            })
            .await
    }

    fn stop(&self) -> Result<(), MonitorError> {
        self.ticker.stop();
        Ok(())
    }
}
