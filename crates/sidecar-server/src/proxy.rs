//! Local proxy configuration
//!
//! In local mode the proxy document is rendered on this side from the
//! registry catalog and the routing rules. Both monitors notify the same
//! builder, which re-renders the whole document on every change.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;
use sidecar_api::{ProxyConfig, ProxyUpdater, Rule, ServiceCatalog};
use sidecar_monitor::{CatalogListener, RulesListener};
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Default)]
struct ProxyState {
    catalog: ServiceCatalog,
    rules: Vec<Rule>,
}

/// Renders `{services, rules}` documents and hands them to an updater
pub struct ProxyConfigBuilder {
    updater: Arc<dyn ProxyUpdater>,
    state: Mutex<ProxyState>,
}

impl ProxyConfigBuilder {
    pub fn new(updater: Arc<dyn ProxyUpdater>) -> Self {
        Self {
            updater,
            state: Mutex::new(ProxyState::default()),
        }
    }

    fn render(state: &ProxyState) -> ProxyConfig {
        ProxyConfig::new(json!({
            "services": state.catalog.services,
            "rules": state.rules,
        }))
    }
}

#[async_trait]
impl CatalogListener for ProxyConfigBuilder {
    async fn catalog_change(&self, catalog: &ServiceCatalog) -> anyhow::Result<()> {
        // Held through the update so documents are applied in order
        let mut state = self.state.lock().await;
        state.catalog = catalog.clone();
        self.updater.update(&Self::render(&state)).await
    }
}

#[async_trait]
impl RulesListener for ProxyConfigBuilder {
    async fn rule_change(&self, rules: &[Rule]) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        state.rules = rules.to_vec();
        self.updater.update(&Self::render(&state)).await
    }
}

/// Writes each configuration to a file, replacing it atomically
pub struct FileProxyUpdater {
    path: PathBuf,
}

impl FileProxyUpdater {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl ProxyUpdater for FileProxyUpdater {
    async fn update(&self, config: &ProxyConfig) -> anyhow::Result<()> {
        let contents = serde_json::to_vec_pretty(config.as_value())?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, &contents)
            .await
            .with_context(|| format!("failed to write {}", temp.display()))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;

        debug!(bytes = contents.len(), "Wrote proxy configuration");
        info!(path = %self.path.display(), "Proxy configuration updated");
        Ok(())
    }
}
