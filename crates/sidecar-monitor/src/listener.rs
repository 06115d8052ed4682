//! Event-driven configuration updates

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sidecar_api::{ControllerClient, EventConsumer, ProxyUpdater};
use tracing::{debug, info, warn};

use crate::Monitor;
use crate::error::MonitorError;
use crate::ticker::StopHandle;

/// Pause after a failed receive before trying again
pub const RECEIVE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Applies the full proxy configuration whenever a change event for this
/// sidecar arrives on the notification bus
pub struct EventListener {
    consumer: Arc<dyn EventConsumer>,
    controller: Arc<dyn ControllerClient>,
    updater: Arc<dyn ProxyUpdater>,
    correlation_key: String,
    stop: StopHandle,
}

impl EventListener {
    pub fn new(
        consumer: Arc<dyn EventConsumer>,
        controller: Arc<dyn ControllerClient>,
        updater: Arc<dyn ProxyUpdater>,
        correlation_key: impl Into<String>,
    ) -> Self {
        Self {
            consumer,
            controller,
            updater,
            correlation_key: correlation_key.into(),
            stop: StopHandle::default(),
        }
    }

    /// Fetches the complete configuration and applies it.
    ///
    /// Returns whether a configuration was applied.
    pub async fn apply_latest(&self) -> Result<bool, MonitorError> {
        let Some(config) = self.controller.get_config(None).await? else {
            return Ok(false);
        };
        if config.is_empty() {
            return Ok(false);
        }

        self.updater
            .update(&config)
            .await
            .map_err(MonitorError::Update)?;
        Ok(true)
    }
}

#[async_trait]
impl Monitor for EventListener {
    async fn start(&self) -> Result<(), MonitorError> {
        let Some(mut stop_rx) = self.stop.arm() else {
            return Ok(());
        };
        info!(key = %self.correlation_key, "Listening for configuration events");

        loop {
            let received = tokio::select! {
                biased;
                _ = &mut stop_rx => break,
                received = self.consumer.receive_event() => received,
            };

            match received {
                Ok(event) if event.key != self.correlation_key => {
                    debug!(key = %event.key, "Ignoring event for another sidecar");
                }
                Ok(event) => match self.apply_latest().await {
                    Ok(true) => info!(key = %event.key, "Applied proxy configuration after event"),
                    Ok(false) => debug!(key = %event.key, "Event carried no configuration change"),
                    Err(e) => warn!(key = %event.key, error = %e, "Failed to apply configuration"),
                },
                Err(e) => {
                    warn!(error = %e, "Failed to receive event");
                    tokio::select! {
                        _ = &mut stop_rx => break,
                        _ = tokio::time::sleep(RECEIVE_RETRY_DELAY) => {}
                    }
                }
            }
        }

        info!("Event listener stopped");
        Ok(())
    }

    fn stop(&self) -> Result<(), MonitorError> {
        self.stop.stop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use parking_lot::Mutex;
    use serde_json::json;
    use sidecar_api::{ClientError, Event, ProxyConfig, Result};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves scripted events, then blocks forever
    #[derive(Default)]
    struct ScriptedConsumer {
        events: Mutex<VecDeque<Result<Event>>>,
        receives: AtomicUsize,
    }

    impl ScriptedConsumer {
        fn push(&self, event: Result<Event>) {
            self.events.lock().push_back(event);
        }
    }

    #[async_trait]
    impl EventConsumer for ScriptedConsumer {
        async fn receive_event(&self) -> Result<Event> {
            self.receives.fetch_add(1, Ordering::SeqCst);
            let next = self.events.lock().pop_front();
            match next {
                Some(event) => event,
                None => std::future::pending().await,
            }
        }
    }

    #[derive(Default)]
    struct MockController {
        calls: AtomicUsize,
        saw_since: Mutex<Vec<Option<DateTime<Utc>>>>,
    }

    #[async_trait]
    impl ControllerClient for MockController {
        async fn get_config(&self, since: Option<DateTime<Utc>>) -> Result<Option<ProxyConfig>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.saw_since.lock().push(since);
            Ok(Some(ProxyConfig::new(json!({"services": []}))))
        }
    }

    #[derive(Default)]
    struct CountingUpdater {
        updates: AtomicUsize,
    }

    #[async_trait]
    impl ProxyUpdater for CountingUpdater {
        async fn update(&self, _config: &ProxyConfig) -> anyhow::Result<()> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn event(key: &str) -> Result<Event> {
        Ok(Event {
            key: key.to_string(),
            value: String::new(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_applies_only_matching_events() {
        let consumer = Arc::new(ScriptedConsumer::default());
        consumer.push(event("other-tenant"));
        consumer.push(event("tenant-a"));
        consumer.push(event("other-tenant"));
        let controller = Arc::new(MockController::default());
        let updater = Arc::new(CountingUpdater::default());

        let listener = Arc::new(EventListener::new(
            consumer.clone(),
            controller.clone(),
            updater.clone(),
            "tenant-a",
        ));
        let handle = {
            let listener = listener.clone();
            tokio::spawn(async move { listener.start().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(consumer.receives.load(Ordering::SeqCst), 4);
        assert_eq!(controller.calls.load(Ordering::SeqCst), 1);
        assert_eq!(updater.updates.load(Ordering::SeqCst), 1);
        assert_eq!(*controller.saw_since.lock(), vec![None]);

        listener.stop().unwrap();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_error_backs_off() {
        let consumer = Arc::new(ScriptedConsumer::default());
        consumer.push(Err(ClientError::Connection("bus unavailable".to_string())));
        consumer.push(event("tenant-a"));
        let controller = Arc::new(MockController::default());
        let updater = Arc::new(CountingUpdater::default());

        let listener = Arc::new(EventListener::new(
            consumer.clone(),
            controller,
            updater.clone(),
            "tenant-a",
        ));
        let handle = {
            let listener = listener.clone();
            tokio::spawn(async move { listener.start().await })
        };

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(consumer.receives.load(Ordering::SeqCst), 1);
        assert_eq!(updater.updates.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(updater.updates.load(Ordering::SeqCst), 1);

        listener.stop().unwrap();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_stop_before_start_runs_is_honored() {
        let consumer = Arc::new(ScriptedConsumer::default());
        consumer.push(event("tenant-a"));
        let updater = Arc::new(CountingUpdater::default());

        let listener = Arc::new(EventListener::new(
            consumer.clone(),
            Arc::new(MockController::default()),
            updater.clone(),
            "tenant-a",
        ));
        let handle = {
            let listener = listener.clone();
            tokio::spawn(async move { listener.start().await })
        };
        listener.stop().unwrap();

        let joined = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(joined.unwrap().unwrap().is_ok());
        assert_eq!(consumer.receives.load(Ordering::SeqCst), 0);
        assert_eq!(updater.updates.load(Ordering::SeqCst), 0);
    }
}
