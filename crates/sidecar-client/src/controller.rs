//! Controller REST client
//!
//! Serves rendered proxy configuration (`/v1/nginx`) with conditional
//! polling on a version timestamp, and the routing rules (`/v1/rules`).

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Method, StatusCode};
use sidecar_api::{ControllerClient, ProxyConfig, Result, RuleFilter, RuleSet, RuleType, RulesService};
use tracing::debug;

use crate::http::{HttpClientConfig, RestClient, map_transport_error};

const CONFIG_PATH: &str = "/v1/nginx";
const RULES_PATH: &str = "/v1/rules";
const ROUTES_PATH: &str = "/v1/rules/routes";
const ACTIONS_PATH: &str = "/v1/rules/actions";

/// Non-caching controller client
#[derive(Clone, Debug)]
pub struct ControllerHttpClient {
    rest: RestClient,
}

impl ControllerHttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        Ok(Self {
            rest: RestClient::new(config)?,
        })
    }

    pub fn url(&self) -> &str {
        self.rest.base_url()
    }
}

fn rules_query(filter: &RuleFilter) -> Vec<(&'static str, String)> {
    let ids = filter.ids.iter().map(|id| ("id", id.clone()));
    let tags = filter.tags.iter().map(|tag| ("tag", tag.clone()));
    let destinations = filter
        .destinations
        .iter()
        .map(|d| ("destination", d.clone()));

    ids.chain(tags).chain(destinations).collect()
}

#[async_trait]
impl ControllerClient for ControllerHttpClient {
    async fn get_config(&self, since: Option<DateTime<Utc>>) -> Result<Option<ProxyConfig>> {
        let mut request = self.rest.request(Method::GET, CONFIG_PATH);
        if let Some(version) = since {
            request = request.query(&[(
                "version",
                version.to_rfc3339_opts(SecondsFormat::Secs, true),
            )]);
        }

        let response = self
            .rest
            .send(request, &[StatusCode::OK, StatusCode::NO_CONTENT])
            .await?;

        if response.status() == StatusCode::NO_CONTENT {
            debug!("Controller reports no configuration change");
            return Ok(None);
        }

        let body: serde_json::Value = response.json().await.map_err(map_transport_error)?;
        let config = ProxyConfig::new(body);
        if config.is_empty() {
            return Ok(None);
        }

        Ok(Some(config))
    }
}

#[async_trait]
impl RulesService for ControllerHttpClient {
    async fn list_rules(&self, filter: &RuleFilter) -> Result<RuleSet> {
        let path = match filter.rule_type {
            RuleType::Any => RULES_PATH,
            RuleType::Route => ROUTES_PATH,
            RuleType::Action => ACTIONS_PATH,
        };

        let query = rules_query(filter);
        let mut request = self.rest.request(Method::GET, path);
        if !query.is_empty() {
            request = request.query(&query);
        }

        let response = self.rest.send(request, &[StatusCode::OK]).await?;
        let rules: RuleSet = response.json().await.map_err(map_transport_error)?;
        Ok(rules)
    }
}
