//! Background-refreshed caches
//!
//! Each cache owns a snapshot that is replaced whole on every successful
//! refresh. Readers clone the snapshot handle under a short read lock and
//! work on their copy, so a refresh in flight never blocks a read and a
//! read never observes a half-built index.

mod discovery;
mod rules;

pub use discovery::DiscoveryCache;
pub use rules::RulesCache;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use sidecar_api::Result;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(10);

/// Atomically swappable snapshot
pub(crate) struct Snapshot<T> {
    current: RwLock<Arc<T>>,
    refreshes: AtomicU64,
}

impl<T> Snapshot<T> {
    pub(crate) fn new(initial: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            refreshes: AtomicU64::new(0),
        }
    }

    pub(crate) fn load(&self) -> Arc<T> {
        self.current.read().clone()
    }

    pub(crate) fn store(&self, value: T) {
        let value = Arc::new(value);
        *self.current.write() = value;
        self.refreshes.fetch_add(1, Ordering::Release);
    }

    pub(crate) fn refreshes(&self) -> u64 {
        self.refreshes.load(Ordering::Acquire)
    }
}

#[async_trait]
pub(crate) trait Refresh: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn refresh(&self) -> Result<()>;
}

/// Refreshes immediately, then once per interval, until the cache is dropped
pub(crate) fn spawn_refresh_loop<C: Refresh>(cache: &Arc<C>, interval: Duration) -> JoinHandle<()> {
    let weak: Weak<C> = Arc::downgrade(cache);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(MIN_REFRESH_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let Some(cache) = weak.upgrade() else {
                debug!("Cache dropped, refresh loop exiting");
                break;
            };

            if let Err(e) = cache.refresh().await {
                warn!(
                    cache = cache.name(),
                    error = %e,
                    "Cache refresh failed, keeping previous snapshot"
                );
            }
        }
    })
}
