use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::error::MonitorError;

#[derive(Default)]
enum StopState {
    #[default]
    Idle,
    Armed(oneshot::Sender<()>),
    /// `stop()` arrived before the loop armed
    Requested,
    Stopped,
}

/// Stop signal shared between a running loop and its owner
#[derive(Default)]
pub(crate) struct StopHandle {
    state: Mutex<StopState>,
}

impl StopHandle {
    /// Installs a fresh stop channel, stopping the loop it replaces.
    ///
    /// Returns `None` when a stop was requested before the loop armed; the
    /// loop must then exit without running.
    pub(crate) fn arm(&self) -> Option<oneshot::Receiver<()>> {
        let mut state = self.state.lock();
        match std::mem::take(&mut *state) {
            StopState::Requested => {
                debug!("Stop requested before start, not running");
                *state = StopState::Stopped;
                return None;
            }
            StopState::Armed(previous) => {
                debug!("Stopping previous loop");
                let _ = previous.send(());
            }
            StopState::Idle | StopState::Stopped => {}
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        *state = StopState::Armed(stop_tx);
        Some(stop_rx)
    }

    /// Stops the armed loop, or the next one to arm if none is armed yet.
    ///
    /// Repeated stops after a loop was stopped are no-ops.
    pub(crate) fn stop(&self) {
        let mut state = self.state.lock();
        *state = match std::mem::take(&mut *state) {
            StopState::Armed(stop_tx) => {
                let _ = stop_tx.send(());
                StopState::Stopped
            }
            StopState::Idle | StopState::Requested => StopState::Requested,
            StopState::Stopped => StopState::Stopped,
        };
    }
}

/// Runs a cycle once immediately and then once per interval until stopped
pub(crate) struct Ticker {
    interval: Duration,
    stop: StopHandle,
}

impl Ticker {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            stop: StopHandle::default(),
        }
    }

    pub(crate) fn interval(&self) -> Duration {
        self.interval
    }

    pub(crate) async fn run<F, Fut>(&self, mut cycle: F) -> Result<(), MonitorError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = ()> + Send,
    {
        if self.interval.is_zero() {
            return Err(MonitorError::Ticker(
                "poll interval must be greater than zero".to_string(),
            ));
        }

        let Some(mut stop_rx) = self.stop.arm() else {
            return Ok(());
        };
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {}
            }
            cycle().await;
        }

        Ok(())
    }

    pub(crate) fn stop(&self) {
        self.stop.stop();
    }
}
