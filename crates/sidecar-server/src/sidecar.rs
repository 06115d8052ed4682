//! Component wiring

use std::sync::Arc;

use anyhow::bail;
use sidecar_api::{ControllerClient, EventConsumer, ProxyUpdater};
use sidecar_client::{ControllerHttpClient, DiscoveryCache, HttpClientConfig, RegistryClient, RulesCache};
use sidecar_monitor::{ConfigPoller, DiscoveryMonitor, EventListener, Monitor, RulesMonitor};
use sidecar_register::{
    HealthChecker, RegistrationAgent, RegistrationConfig, StaticIdentity, build_agents,
};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::{ProxyMode, SidecarConfig};
use crate::proxy::{FileProxyUpdater, ProxyConfigBuilder};

/// The running set of sidecar components
pub struct Sidecar {
    registration: Option<Arc<RegistrationAgent>>,
    health_checker: Option<HealthChecker>,
    monitors: Vec<Arc<dyn Monitor>>,
    /// Controller and updater of controller mode, for event-driven updates
    controller_feed: Option<(Arc<dyn ControllerClient>, Arc<dyn ProxyUpdater>)>,
}

impl Sidecar {
    /// Builds every component the configuration enables.
    ///
    /// Must be called from within a tokio runtime, since caches start
    /// refreshing as soon as they are created.
    pub fn build(config: &SidecarConfig) -> anyhow::Result<Self> {
        let registry = Arc::new(RegistryClient::new(
            HttpClientConfig::new(&config.registry.url).with_token(&config.registry.token),
        )?);

        let mut registration = None;
        let mut health_checker = None;
        if config.register {
            let identity = StaticIdentity::new(
                &config.service.name,
                &config.endpoint.endpoint_type,
                &config.endpoint.host,
                config.endpoint.port,
            )
            .with_tags(config.service.tags.clone());

            let agent = Arc::new(RegistrationAgent::new(
                registry.clone(),
                Arc::new(identity),
                RegistrationConfig::default(),
            ));

            if !config.healthchecks.is_empty() {
                let agents = build_agents(&config.healthchecks)?;
                health_checker = Some(HealthChecker::new(agent.clone(), agents)?);
            }
            registration = Some(agent);
        }

        let mut monitors: Vec<Arc<dyn Monitor>> = Vec::new();
        let mut controller_feed = None;
        if config.proxy {
            let updater: Arc<dyn ProxyUpdater> =
                Arc::new(FileProxyUpdater::new(&config.proxy_config.output_path));
            let controller = Arc::new(ControllerHttpClient::new(
                HttpClientConfig::new(&config.controller.url).with_token(&config.controller.token),
            )?);

            match config.proxy_config.mode {
                ProxyMode::Controller => {
                    monitors.push(Arc::new(ConfigPoller::new(
                        controller.clone(),
                        updater.clone(),
                        config.controller.poll_interval(),
                    )));
                    controller_feed = Some((controller as Arc<dyn ControllerClient>, updater));
                }
                ProxyMode::Local => {
                    let builder = Arc::new(ProxyConfigBuilder::new(updater));

                    let discovery = DiscoveryCache::new(registry, config.registry.poll_interval());
                    let discovery_monitor =
                        DiscoveryMonitor::new(discovery, config.registry.poll_interval());
                    discovery_monitor.add_listener(builder.clone());

                    let rules = RulesCache::new(controller, config.controller.poll_interval());
                    let rules_monitor = RulesMonitor::new(rules, config.controller.poll_interval());
                    rules_monitor.add_listener(builder);

                    monitors.push(Arc::new(discovery_monitor));
                    monitors.push(Arc::new(rules_monitor));
                }
            }
        }

        Ok(Self {
            registration,
            health_checker,
            monitors,
            controller_feed,
        })
    }

    /// Adds an event-driven trigger next to the controller poller.
    ///
    /// Every event keyed `correlation_key` that `consumer` delivers applies
    /// the latest controller configuration. Requires controller proxy mode.
    pub fn with_event_consumer(
        mut self,
        consumer: Arc<dyn EventConsumer>,
        correlation_key: &str,
    ) -> anyhow::Result<Self> {
        let Some((controller, updater)) = self.controller_feed.clone() else {
            bail!("event-driven updates require the controller proxy mode");
        };

        self.monitors.push(Arc::new(EventListener::new(
            consumer,
            controller,
            updater,
            correlation_key,
        )));
        Ok(self)
    }

    pub fn monitor_count(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_registering(&self) -> bool {
        self.registration.is_some()
    }

    pub fn is_health_checked(&self) -> bool {
        self.health_checker.is_some()
    }

    /// Runs until a shutdown notification arrives, then stops everything.
    ///
    /// Monitors stop first, then health checks, then registration, so the
    /// instance is deregistered last.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        match (&self.health_checker, &self.registration) {
            (Some(checker), _) => checker.start().await,
            // Without health checks the service is assumed healthy
            (None, Some(registration)) => registration.start().await,
            (None, None) => {}
        }

        let handles: Vec<_> = self
            .monitors
            .iter()
            .map(|monitor| {
                let monitor = monitor.clone();
                tokio::spawn(async move { monitor.start().await })
            })
            .collect();

        info!(monitors = handles.len(), "Sidecar started");
        let _ = shutdown_rx.recv().await;
        info!("Stopping sidecar");

        for monitor in &self.monitors {
            if let Err(e) = monitor.stop() {
                warn!(error = %e, "Failed to stop monitor");
            }
        }
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "Monitor exited with error"),
                Err(e) => error!("Monitor task failed: {}", e),
            }
        }

        if let Some(checker) = &self.health_checker {
            checker.stop().await;
        }
        if let Some(registration) = &self.registration {
            registration.stop().await;
        }

        info!("Sidecar stopped");
        Ok(())
    }
}
