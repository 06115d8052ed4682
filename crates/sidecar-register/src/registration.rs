//! Service registration lifecycle
//!
//! The registration agent runs a small state machine in the background:
//!
//! 1. Registering: resolve the identity and register it, retrying after
//!    a fixed delay until it succeeds or the agent is stopped.
//! 2. Renewing: heartbeat `heartbeats_per_ttl` times per TTL. If the
//!    registry no longer knows the instance, go back to Registering. Other
//!    renew failures are logged and retried on the next tick.
//! 3. On stop while Renewing, deregister best-effort.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use sidecar_api::{ServiceInstance, ServiceRegistry};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::health_checker::Lifecycle;
use crate::identity::IdentityProvider;

pub const DEFAULT_HEARTBEATS_PER_TTL: u32 = 3;
pub const DEFAULT_REREGISTRATION_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Shortest heartbeat period, for registries returning a tiny TTL
const MIN_HEARTBEAT_PERIOD: Duration = Duration::from_millis(100);

#[derive(Clone, Debug)]
pub struct RegistrationConfig {
    pub heartbeats_per_ttl: u32,
    /// Pause between failed registration attempts
    pub reregistration_delay: Duration,
    /// TTL requested when the identity carries none
    pub default_ttl: Duration,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            heartbeats_per_ttl: DEFAULT_HEARTBEATS_PER_TTL,
            reregistration_delay: DEFAULT_REREGISTRATION_DELAY,
            default_ttl: DEFAULT_TTL,
        }
    }
}

enum RenewOutcome {
    Stopped,
    InstanceLost,
}

struct Inner {
    registry: Arc<dyn ServiceRegistry>,
    identity: Arc<dyn IdentityProvider>,
    config: RegistrationConfig,
    registered: RwLock<Option<ServiceInstance>>,
}

struct Running {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Keeps the local instance registered while active
pub struct RegistrationAgent {
    inner: Arc<Inner>,
    running: Mutex<Option<Running>>,
}

impl RegistrationAgent {
    pub fn new(
        registry: Arc<dyn ServiceRegistry>,
        identity: Arc<dyn IdentityProvider>,
        config: RegistrationConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                identity,
                config,
                registered: RwLock::new(None),
            }),
            running: Mutex::new(None),
        }
    }

    /// Starts registering in the background; a no-op while active
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return;
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(self.inner.clone().run(stop_rx));
        *running = Some(Running { stop_tx, handle });
    }

    /// Stops the background task, deregistering if registered.
    ///
    /// Returns once the task has exited; a no-op while stopped.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        let Some(Running { stop_tx, handle }) = running.take() else {
            return;
        };

        let _ = stop_tx.send(());
        if let Err(e) = handle.await {
            error!("Registration task failed: {}", e);
        }
    }

    pub async fn is_active(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Local copy of the currently registered instance
    pub fn registered_instance(&self) -> Option<ServiceInstance> {
        self.inner.registered.read().clone()
    }
}

#[async_trait]
impl Lifecycle for RegistrationAgent {
    async fn start(&self) {
        RegistrationAgent::start(self).await
    }

    async fn stop(&self) {
        RegistrationAgent::stop(self).await
    }
}

impl Inner {
    async fn run(self: Arc<Self>, mut stop_rx: oneshot::Receiver<()>) {
        loop {
            let Some(instance) = self.register_until_success(&mut stop_rx).await else {
                return;
            };

            match self.renew_until_lost(&instance, &mut stop_rx).await {
                RenewOutcome::Stopped => {
                    self.deregister(&instance).await;
                    return;
                }
                RenewOutcome::InstanceLost => continue,
            }
        }
    }

    async fn register_until_success(
        &self,
        stop_rx: &mut oneshot::Receiver<()>,
    ) -> Option<ServiceInstance> {
        loop {
            match self.try_register().await {
                Ok(instance) => {
                    info!(
                        service_name = %instance.service_name,
                        instance_id = %instance.id,
                        ttl = instance.ttl,
                        "Service registered"
                    );
                    *self.registered.write() = Some(instance.clone());
                    return Some(instance);
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        retry_in = ?self.config.reregistration_delay,
                        "Service registration failed"
                    );
                }
            }

            tokio::select! {
                _ = &mut *stop_rx => return None,
                _ = tokio::time::sleep(self.config.reregistration_delay) => {}
            }
        }
    }

    async fn try_register(&self) -> anyhow::Result<ServiceInstance> {
        let mut instance = self.identity.get_identity().await?;
        if instance.ttl == 0 {
            instance.ttl = self.config.default_ttl.as_secs() as u32;
        }
        let requested_ttl = instance.ttl;

        let mut registered = self.registry.register(instance).await?;
        if registered.ttl == 0 {
            registered.ttl = requested_ttl;
        }
        Ok(registered)
    }

    fn heartbeat_period(&self, instance: &ServiceInstance) -> Duration {
        let per_ttl = self.config.heartbeats_per_ttl.max(1);
        (instance.ttl_duration() / per_ttl).max(MIN_HEARTBEAT_PERIOD)
    }

    async fn renew_until_lost(
        &self,
        instance: &ServiceInstance,
        stop_rx: &mut oneshot::Receiver<()>,
    ) -> RenewOutcome {
        let period = self.heartbeat_period(instance);
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut *stop_rx => return RenewOutcome::Stopped,
                _ = ticker.tick() => {}
            }

            match self.registry.renew(&instance.id).await {
                Ok(()) => debug!(instance_id = %instance.id, "Heartbeat sent"),
                Err(e) if e.is_unknown_instance() => {
                    warn!(
                        instance_id = %instance.id,
                        "Registry no longer knows this instance, registering again"
                    );
                    *self.registered.write() = None;
                    return RenewOutcome::InstanceLost;
                }
                Err(e) => warn!(instance_id = %instance.id, error = %e, "Heartbeat failed"),
            }
        }
    }

    async fn deregister(&self, instance: &ServiceInstance) {
        match self.registry.deregister(&instance.id).await {
            Ok(()) => info!(
                service_name = %instance.service_name,
                instance_id = %instance.id,
                "Service deregistered"
            ),
            Err(e) => warn!(instance_id = %instance.id, error = %e, "Deregistration failed"),
        }
        *self.registered.write() = None;
    }
}
