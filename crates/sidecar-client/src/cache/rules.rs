//! Caching wrapper around a `RulesService` client

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sidecar_api::{Result, RuleFilter, RuleSet, RulesService};
use tracing::debug;

use super::{Refresh, Snapshot, spawn_refresh_loop};

/// Full rule set refreshed in the background; filters are applied to the
/// cached copy with the same semantics as the controller.
pub struct RulesCache {
    rules: Arc<dyn RulesService>,
    snapshot: Snapshot<RuleSet>,
}

impl RulesCache {
    /// Creates the cache and starts its refresh task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(rules: Arc<dyn RulesService>, poll_interval: Duration) -> Arc<Self> {
        let cache = Arc::new(Self {
            rules,
            snapshot: Snapshot::new(RuleSet::default()),
        });
        spawn_refresh_loop(&cache, poll_interval);
        cache
    }

    pub async fn refresh(&self) -> Result<()> {
        let rules = self.rules.list_rules(&RuleFilter::default()).await?;
        debug!(
            rules = rules.rules.len(),
            revision = rules.revision,
            "Rules cache refreshed"
        );
        self.snapshot.store(rules);
        Ok(())
    }

    pub fn refresh_count(&self) -> u64 {
        self.snapshot.refreshes()
    }

    /// Revision of the cached rule set, -1 before the first refresh
    pub fn revision(&self) -> i64 {
        self.snapshot.load().revision
    }
}

#[async_trait]
impl Refresh for RulesCache {
    fn name(&self) -> &'static str {
        "rules"
    }

    async fn refresh(&self) -> Result<()> {
        RulesCache::refresh(self).await
    }
}

#[async_trait]
impl RulesService for RulesCache {
    async fn list_rules(&self, filter: &RuleFilter) -> Result<RuleSet> {
        let current = self.snapshot.load();
        Ok(RuleSet {
            rules: filter.apply(&current.rules),
            revision: current.revision,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidecar_api::{ClientError, Route, Rule, RuleType};
    use std::sync::atomic::{AtomicI64, Ordering};

    struct CountingRules {
        revision: AtomicI64,
        fail: bool,
    }

    #[async_trait]
    impl RulesService for CountingRules {
        async fn list_rules(&self, _filter: &RuleFilter) -> Result<RuleSet> {
            if self.fail {
                return Err(ClientError::Connection("refused".to_string()));
            }
            let revision = self.revision.fetch_add(1, Ordering::SeqCst);
            Ok(RuleSet {
                rules: vec![
                    Rule {
                        id: "route".to_string(),
                        destination: "reviews".to_string(),
                        route: Some(Route::default()),
                        ..Default::default()
                    },
                    Rule {
                        id: "other".to_string(),
                        destination: "ratings".to_string(),
                        ..Default::default()
                    },
                ],
                revision,
            })
        }
    }

    async fn wait_for_refresh(cache: &RulesCache, count: u64) {
        for _ in 0..200 {
            if cache.refresh_count() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("cache never reached {} refreshes", count);
    }

    #[tokio::test]
    async fn test_filters_apply_to_cached_rules() {
        let service = Arc::new(CountingRules {
            revision: AtomicI64::new(7),
            fail: false,
        });
        let cache = RulesCache::new(service, Duration::from_secs(3600));
        wait_for_refresh(&cache, 1).await;

        let all = cache.list_rules(&RuleFilter::default()).await.unwrap();
        assert_eq!(all.rules.len(), 2);
        assert_eq!(all.revision, 7);

        let routes = cache
            .list_rules(&RuleFilter::default().with_type(RuleType::Route))
            .await
            .unwrap();
        assert_eq!(routes.rules.len(), 1);
        assert_eq!(routes.rules[0].id, "route");

        let ratings = cache
            .list_rules(&RuleFilter::for_destination("ratings"))
            .await
            .unwrap();
        assert_eq!(ratings.rules[0].id, "other");

        cache.refresh().await.unwrap();
        assert_eq!(cache.revision(), 8);
    }

    #[tokio::test]
    async fn test_empty_until_first_successful_refresh() {
        let service = Arc::new(CountingRules {
            revision: AtomicI64::new(0),
            fail: true,
        });
        let cache = RulesCache::new(service, Duration::from_secs(3600));

        assert!(cache.refresh().await.is_err());
        let rules = cache.list_rules(&RuleFilter::default()).await.unwrap();
        assert!(rules.rules.is_empty());
        assert_eq!(rules.revision, -1);
        assert_eq!(cache.refresh_count(), 0);
    }
}
