//! Health-driven registration
//!
//! `HealthChecker` runs every configured agent, tracks how many of them are
//! currently healthy, and drives a `Lifecycle` (normally the registration
//! agent) on the two boundary crossings only:
//!
//! - healthy count reaches N: `Lifecycle::start`
//! - healthy count drops from N to N-1: `Lifecycle::stop`
//!
//! Each agent gets a monitor task that forwards a transition only when that
//! agent's own state flips, so repeated identical results never reach the
//! aggregator.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::HealthCheckError;
use crate::healthcheck::{HealthCheckAgent, HealthStatus};

const STATUS_BUFFER: usize = 8;

/// Something that can be started and stopped, such as service registration
#[async_trait]
pub trait Lifecycle: Send + Sync {
    async fn start(&self);

    async fn stop(&self);
}

struct Running {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct HealthChecker {
    agents: Vec<Arc<dyn HealthCheckAgent>>,
    registration: Arc<dyn Lifecycle>,
    running: Mutex<Option<Running>>,
}

impl HealthChecker {
    /// Creates a checker; at least one agent is required
    pub fn new(
        registration: Arc<dyn Lifecycle>,
        agents: Vec<Arc<dyn HealthCheckAgent>>,
    ) -> Result<Self, HealthCheckError> {
        if agents.is_empty() {
            return Err(HealthCheckError::NoHealthChecks);
        }

        Ok(Self {
            agents,
            registration,
            running: Mutex::new(None),
        })
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Starts all agents; a no-op while already running
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return;
        }

        info!(checks = self.agents.len(), "Starting health checker");

        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(supervise(
            self.agents.clone(),
            self.registration.clone(),
            stop_rx,
        ));
        *running = Some(Running { stop_tx, handle });
    }

    /// Stops all agents and monitors, returning once teardown completes
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        let Some(Running { stop_tx, handle }) = running.take() else {
            return;
        };

        let _ = stop_tx.send(());
        if let Err(e) = handle.await {
            error!("Health checker task failed: {}", e);
        }
        info!("Health checker stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }
}

async fn supervise(
    agents: Vec<Arc<dyn HealthCheckAgent>>,
    registration: Arc<dyn Lifecycle>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let total = agents.len();
    let (transition_tx, mut transition_rx) = mpsc::unbounded_channel::<bool>();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut monitors = Vec::with_capacity(total);
    for agent in &agents {
        let (status_tx, status_rx) = mpsc::channel(STATUS_BUFFER);
        agent.start(status_tx).await;
        monitors.push(tokio::spawn(monitor(
            status_rx,
            transition_tx.clone(),
            shutdown_rx.clone(),
        )));
    }
    drop(transition_tx);

    let mut healthy = 0usize;
    loop {
        tokio::select! {
            _ = &mut stop_rx => break,
            transition = transition_rx.recv() => match transition {
                Some(true) => {
                    healthy = (healthy + 1).min(total);
                    debug!(healthy, total, "Health check recovered");
                    if healthy == total {
                        info!("All health checks passing, starting registration");
                        registration.start().await;
                    }
                }
                Some(false) => {
                    let was_healthy = healthy == total;
                    healthy = healthy.saturating_sub(1);
                    debug!(healthy, total, "Health check failed");
                    if was_healthy {
                        warn!("Health check failing, stopping registration");
                        registration.stop().await;
                    }
                }
                None => break,
            }
        }
    }

    for agent in &agents {
        agent.stop().await;
    }
    let _ = shutdown_tx.send(true);
    for handle in monitors {
        if let Err(e) = handle.await {
            error!("Health check monitor failed: {}", e);
        }
    }
}

/// Forwards a transition each time this agent flips between healthy and unhealthy
async fn monitor(
    mut status_rx: mpsc::Receiver<HealthStatus>,
    transition_tx: mpsc::UnboundedSender<bool>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    // Agents start out unhealthy until their first passing result
    let mut healthy = false;

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            status = status_rx.recv() => {
                let Some(status) = status else {
                    break;
                };

                if status.is_healthy() == healthy {
                    continue;
                }
                healthy = status.is_healthy();

                match &status.error {
                    None => info!(check = %status.check, "Health check passing"),
                    Some(e) => warn!(check = %status.check, error = %e, "Health check failing"),
                }

                if transition_tx.send(healthy).is_err() {
                    break;
                }
            }
        }
    }
}
