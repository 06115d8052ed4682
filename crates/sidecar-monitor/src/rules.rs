//! Routing rule revision tracking

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use sidecar_api::{Rule, RuleFilter, RulesService};
use tracing::{debug, info, warn};

use crate::Monitor;
use crate::error::MonitorError;
use crate::ticker::Ticker;

/// Receives the full rule list whenever a newer revision is seen
#[async_trait]
pub trait RulesListener: Send + Sync {
    async fn rule_change(&self, rules: &[Rule]) -> anyhow::Result<()>;
}

pub struct RulesMonitor {
    rules: Arc<dyn RulesService>,
    listeners: RwLock<Vec<Arc<dyn RulesListener>>>,
    revision: AtomicI64,
    ticker: Ticker,
}

impl RulesMonitor {
    pub fn new(rules: Arc<dyn RulesService>, poll_interval: Duration) -> Self {
        Self {
            rules,
            listeners: RwLock::new(Vec::new()),
            revision: AtomicI64::new(-1),
            ticker: Ticker::new(poll_interval),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn RulesListener>) {
        self.listeners.write().push(listener);
    }

    /// Last revision handed to listeners, -1 before the first
    pub fn revision(&self) -> i64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Runs one cycle, returning whether listeners were notified
    pub async fn check(&self) -> Result<bool, MonitorError> {
        let rule_set = self.rules.list_rules(&RuleFilter::default()).await?;

        let previous = self.revision();
        if rule_set.revision <= previous {
            debug!(revision = rule_set.revision, "Rules unchanged");
            return Ok(false);
        }

        self.revision.store(rule_set.revision, Ordering::SeqCst);
        info!(
            revision = rule_set.revision,
            previous,
            rules = rule_set.rules.len(),
            "Rules changed"
        );

        let listeners = self.listeners.read().clone();
        for listener in listeners {
            if let Err(e) = listener.rule_change(&rule_set.rules).await {
                warn!(error = %e, "Rules listener failed");
            }
        }

        Ok(true)
    }
}

#[async_trait]
impl Monitor for RulesMonitor {
    async fn start(&self) -> Result<(), MonitorError> {
        info!(interval = ?self.ticker.interval(), "Starting rules monitor");
        self.ticker
            .run(|| async move {
                if let Err(e) = self.check().await {
                    warn!(error = %e, "Could not get latest rules");
                }
            })
            .await
    }

    fn stop(&self) -> Result<(), MonitorError> {
        self.ticker.stop();
        Ok(())
    }
}
