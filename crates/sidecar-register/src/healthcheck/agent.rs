//! Periodic health check agent
//!
//! An agent executes its check once immediately on start and then once per
//! interval, pushing each result onto the status channel supplied by the
//! caller. Stopping cancels an in-flight execution and waits for the
//! background task to exit.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

use super::checker::{Check, HealthStatus};
use super::config::DEFAULT_INTERVAL;

/// Runs a health check in the background and reports its results
#[async_trait]
pub trait HealthCheckAgent: Send + Sync {
    fn name(&self) -> &str;

    /// Starts reporting to `status_tx`; a no-op while already active
    async fn start(&self, status_tx: mpsc::Sender<HealthStatus>);

    /// Stops reporting and returns once the background task has exited
    async fn stop(&self);
}

struct Running {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Default `HealthCheckAgent` driving one `Check` on a fixed interval
pub struct Agent {
    check: Arc<dyn Check>,
    interval: Duration,
    running: Mutex<Option<Running>>,
}

impl Agent {
    /// Creates an agent; a zero interval selects the 30 second default
    pub fn new(check: Arc<dyn Check>, interval: Duration) -> Self {
        Self {
            check,
            interval: if interval.is_zero() {
                DEFAULT_INTERVAL
            } else {
                interval
            },
            running: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn is_active(&self) -> bool {
        self.running.lock().await.is_some()
    }
}

#[async_trait]
impl HealthCheckAgent for Agent {
    fn name(&self) -> &str {
        self.check.name()
    }

    async fn start(&self, status_tx: mpsc::Sender<HealthStatus>) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return;
        }

        debug!(check = self.check.name(), interval = ?self.interval, "Starting health check agent");

        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(run_checks(
            self.check.clone(),
            self.interval,
            status_tx,
            stop_rx,
        ));
        *running = Some(Running { stop_tx, handle });
    }

    async fn stop(&self) {
        let mut running = self.running.lock().await;
        let Some(Running { stop_tx, handle }) = running.take() else {
            return;
        };

        let _ = stop_tx.send(());
        if let Err(e) = handle.await {
            error!(check = self.check.name(), "Health check task failed: {}", e);
        }
        debug!(check = self.check.name(), "Health check agent stopped");
    }
}

async fn run_checks(
    check: Arc<dyn Check>,
    interval: Duration,
    status_tx: mpsc::Sender<HealthStatus>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    // First tick completes immediately
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut stop_rx => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = &mut stop_rx => break,
            result = check.execute() => result,
        };

        let status = HealthStatus::from_result(check.name(), result);
        tokio::select! {
            _ = &mut stop_rx => break,
            sent = status_tx.send(status) => {
                if sent.is_err() {
                    debug!(check = check.name(), "Status receiver closed, agent exiting");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CheckError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FlagCheck {
        healthy: AtomicBool,
        executions: AtomicUsize,
    }

    impl FlagCheck {
        fn new(healthy: bool) -> Arc<Self> {
            Arc::new(Self {
                healthy: AtomicBool::new(healthy),
                executions: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Check for FlagCheck {
        fn name(&self) -> &str {
            "flag"
        }

        async fn execute(&self) -> Result<(), CheckError> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            if self.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(CheckError::Request("flag down".to_string()))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_check_then_interval() {
        let check = FlagCheck::new(true);
        let agent = Agent::new(check.clone(), Duration::from_secs(30));
        let (tx, mut rx) = mpsc::channel(8);

        agent.start(tx).await;
        let first = rx.recv().await.unwrap();
        assert!(first.is_healthy());
        assert_eq!(first.check, "flag");
        assert_eq!(check.executions.load(Ordering::SeqCst), 1);

        check.healthy.store(false, Ordering::SeqCst);
        let second = rx.recv().await.unwrap();
        assert!(!second.is_healthy());
        assert_eq!(check.executions.load(Ordering::SeqCst), 2);

        agent.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent_and_stop_is_rendezvous() {
        let check = FlagCheck::new(true);
        let agent = Agent::new(check.clone(), Duration::from_secs(30));
        let (tx, mut rx) = mpsc::channel(8);

        agent.start(tx.clone()).await;
        agent.start(tx).await;
        assert!(agent.is_active().await);
        rx.recv().await.unwrap();

        agent.stop().await;
        agent.stop().await;
        assert!(!agent.is_active().await);

        // The background task has exited, so every sender is gone
        assert!(rx.recv().await.is_none());
        assert_eq!(check.executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop() {
        let check = FlagCheck::new(true);
        let agent = Agent::new(check.clone(), Duration::ZERO);
        assert_eq!(agent.interval(), DEFAULT_INTERVAL);

        let (tx, mut rx) = mpsc::channel(8);
        agent.start(tx).await;
        rx.recv().await.unwrap();
        agent.stop().await;

        let (tx, mut rx) = mpsc::channel(8);
        agent.start(tx).await;
        assert!(rx.recv().await.unwrap().is_healthy());
        agent.stop().await;
        assert_eq!(check.executions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_agent_exits_when_receiver_dropped() {
        let agent = Agent::new(FlagCheck::new(true), Duration::from_secs(1));
        let (tx, rx) = mpsc::channel(8);
        drop(rx);

        agent.start(tx).await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        // Still registered as active until stopped, but stop must not hang
        agent.stop().await;
        assert!(!agent.is_active().await);
    }
}
