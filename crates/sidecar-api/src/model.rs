//! Service discovery models
//!
//! Instances are exchanged with the registry as JSON using the registry's
//! snake_case field names. The catalog types are the normalized, ordered
//! view the change detector compares between polls.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Endpoint type constants
pub const ENDPOINT_TYPE_HTTP: &str = "http";
pub const ENDPOINT_TYPE_HTTPS: &str = "https";
pub const ENDPOINT_TYPE_TCP: &str = "tcp";
pub const ENDPOINT_TYPE_UDP: &str = "udp";
pub const ENDPOINT_TYPE_USER: &str = "user";

/// All endpoint types accepted by the registry
pub const ENDPOINT_TYPES: [&str; 5] = [
    ENDPOINT_TYPE_HTTP,
    ENDPOINT_TYPE_HTTPS,
    ENDPOINT_TYPE_TCP,
    ENDPOINT_TYPE_UDP,
    ENDPOINT_TYPE_USER,
];

// Instance status constants
pub const INSTANCE_STATUS_UP: &str = "UP";
pub const INSTANCE_STATUS_STARTING: &str = "STARTING";
pub const INSTANCE_STATUS_OUT_OF_SERVICE: &str = "OUT_OF_SERVICE";

/// Metadata key holding the instance version
pub const METADATA_VERSION_KEY: &str = "version";

/// Network endpoint of a service instance
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceEndpoint {
    #[serde(rename = "type")]
    pub endpoint_type: String,
    pub value: String,
}

impl ServiceEndpoint {
    pub fn new(endpoint_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            endpoint_type: endpoint_type.into(),
            value: value.into(),
        }
    }

    /// HTTP endpoint pointing at a URL or `host:port`
    pub fn http(value: impl Into<String>) -> Self {
        Self::new(ENDPOINT_TYPE_HTTP, value)
    }

    /// TCP endpoint in `host:port` form
    pub fn tcp(host: &str, port: u16) -> Self {
        Self::new(ENDPOINT_TYPE_TCP, format!("{}:{}", host, port))
    }

    /// Endpoint with an application-defined value
    pub fn user(value: impl Into<String>) -> Self {
        Self::new(ENDPOINT_TYPE_USER, value)
    }
}

/// An instance of a service as known to the registry
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceInstance {
    /// Registry-assigned ID, empty until the first successful registration
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub service_name: String,
    pub endpoint: ServiceEndpoint,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Arbitrary JSON value attached by the instance owner
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Time-to-live in seconds
    #[serde(skip_serializing_if = "is_zero")]
    pub ttl: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

impl ServiceInstance {
    pub fn new(service_name: impl Into<String>, endpoint: ServiceEndpoint) -> Self {
        Self {
            service_name: service_name.into(),
            endpoint,
            ..Default::default()
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_ttl(mut self, ttl_secs: u32) -> Self {
        self.ttl = ttl_secs;
        self
    }

    pub fn ttl_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.ttl))
    }

    /// Whether traffic may be sent to the instance: `UP`, or no status reported
    pub fn is_routable(&self) -> bool {
        self.status.is_empty() || self.status == INSTANCE_STATUS_UP
    }

    /// Version of the instance.
    ///
    /// Taken from the `version` metadata key when the metadata is an object
    /// carrying a string there, otherwise from the sorted, comma-joined tags.
    pub fn version(&self) -> String {
        if let Some(version) = self
            .metadata
            .as_ref()
            .and_then(|m| m.get(METADATA_VERSION_KEY))
            .and_then(|v| v.as_str())
        {
            return version.to_string();
        }

        let mut tags = self.tags.clone();
        tags.sort();
        tags.join(",")
    }

    /// Whether the instance carries every one of the given tags
    pub fn has_tags(&self, tags: &[String]) -> bool {
        tags.iter().all(|t| self.tags.contains(t))
    }
}

/// Criteria for selecting instances; empty fields are ignored
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstanceFilter {
    pub service_name: String,
    pub status: String,
    /// Tags an instance must all carry
    pub tags: Vec<String>,
}

impl InstanceFilter {
    pub fn for_service(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.service_name.is_empty() && self.status.is_empty() && self.tags.is_empty()
    }

    pub fn matches(&self, instance: &ServiceInstance) -> bool {
        if !self.service_name.is_empty() && instance.service_name != self.service_name {
            return false;
        }
        if !self.status.is_empty() && instance.status != self.status {
            return false;
        }
        instance.has_tags(&self.tags)
    }

    /// Query parameters understood by the registry's instance listing
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if !self.service_name.is_empty() {
            query.push(("service_name", self.service_name.clone()));
        }
        if !self.status.is_empty() {
            query.push(("status", self.status.clone()));
        }
        if !self.tags.is_empty() {
            query.push(("tags", self.tags.join(",")));
        }
        query
    }
}

/// Metadata carried by a catalog endpoint
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EndpointMetadata {
    pub version: String,
}

/// A single addressable endpoint of a catalog service
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(rename = "type")]
    pub endpoint_type: String,
    pub value: String,
    pub metadata: EndpointMetadata,
}

/// A service and its endpoints ordered by (type, value, version)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub endpoints: Vec<Endpoint>,
}

/// Normalized snapshot of every service known to the registry, ordered by name
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCatalog {
    pub services: Vec<Service>,
}

impl ServiceCatalog {
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Full proxy configuration document as produced by the controller
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProxyConfig(pub serde_json::Value);

impl ProxyConfig {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// A config without content means "no change" and is never applied
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            serde_json::Value::Null => true,
            serde_json::Value::Object(map) => map.is_empty(),
            serde_json::Value::Array(items) => items.is_empty(),
            serde_json::Value::String(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// A message received from the notification bus
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Event {
    pub key: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_endpoint_constructors() {
        let ep = ServiceEndpoint::tcp("10.0.0.1", 9080);
        assert_eq!(ep.endpoint_type, "tcp");
        assert_eq!(ep.value, "10.0.0.1:9080");

        let ep = ServiceEndpoint::http("http://reviews:9080");
        assert_eq!(ep.endpoint_type, "http");

        let ep = ServiceEndpoint::user("custom");
        assert_eq!(ep.endpoint_type, "user");
    }

    #[test]
    fn test_instance_json_field_names() {
        let data = json!({
            "id": "a1b2",
            "service_name": "reviews",
            "endpoint": {"type": "http", "value": "10.0.0.1:9080"},
            "status": "UP",
            "tags": ["v1"],
            "metadata": {"version": "v1"},
            "ttl": 45,
            "last_heartbeat": "2016-11-01T10:00:00Z"
        });

        let instance: ServiceInstance = serde_json::from_value(data).unwrap();
        assert_eq!(instance.id, "a1b2");
        assert_eq!(instance.service_name, "reviews");
        assert_eq!(instance.endpoint.endpoint_type, "http");
        assert_eq!(instance.ttl, 45);
        assert!(instance.last_heartbeat.is_some());

        let out = serde_json::to_value(&instance).unwrap();
        assert_eq!(out["endpoint"]["type"], "http");
        assert_eq!(out["ttl"], 45);
    }

    #[test]
    fn test_unregistered_instance_omits_empty_fields() {
        let instance = ServiceInstance::new("reviews", ServiceEndpoint::tcp("127.0.0.1", 80));
        let out = serde_json::to_value(&instance).unwrap();

        assert!(out.get("id").is_none());
        assert!(out.get("ttl").is_none());
        assert!(out.get("last_heartbeat").is_none());
        assert_eq!(out["service_name"], "reviews");
    }

    #[test]
    fn test_instance_version() {
        let mut instance = ServiceInstance::new("reviews", ServiceEndpoint::default())
            .with_tags(vec!["v2".to_string(), "canary".to_string()]);
        assert_eq!(instance.version(), "canary,v2");

        instance.metadata = Some(json!({"version": "v3"}));
        assert_eq!(instance.version(), "v3");

        instance.metadata = Some(json!("opaque"));
        assert_eq!(instance.version(), "canary,v2");
    }

    #[test]
    fn test_instance_routable_status() {
        let mut instance = ServiceInstance::new("reviews", ServiceEndpoint::http("10.0.0.1:9080"));
        assert!(instance.is_routable());

        instance.status = INSTANCE_STATUS_UP.to_string();
        assert!(instance.is_routable());

        instance.status = INSTANCE_STATUS_OUT_OF_SERVICE.to_string();
        assert!(!instance.is_routable());
    }

    #[test]
    fn test_instance_filter_matches() {
        let instance = ServiceInstance {
            service_name: "reviews".to_string(),
            status: INSTANCE_STATUS_UP.to_string(),
            tags: vec!["v1".to_string(), "eu".to_string()],
            ..Default::default()
        };

        assert!(InstanceFilter::default().matches(&instance));
        assert!(InstanceFilter::for_service("reviews").matches(&instance));
        assert!(!InstanceFilter::for_service("ratings").matches(&instance));
        assert!(
            InstanceFilter::for_service("reviews")
                .with_status("UP")
                .with_tags(vec!["eu".to_string()])
                .matches(&instance)
        );
        assert!(
            !InstanceFilter::default()
                .with_tags(vec!["v1".to_string(), "us".to_string()])
                .matches(&instance)
        );
        assert!(
            !InstanceFilter::default()
                .with_status(INSTANCE_STATUS_STARTING)
                .matches(&instance)
        );
    }

    #[test]
    fn test_instance_filter_query() {
        assert!(InstanceFilter::default().to_query().is_empty());

        let query = InstanceFilter::for_service("reviews")
            .with_tags(vec!["v1".to_string(), "eu".to_string()])
            .to_query();
        assert_eq!(
            query,
            vec![
                ("service_name", "reviews".to_string()),
                ("tags", "v1,eu".to_string())
            ]
        );
    }

    #[test]
    fn test_proxy_config_emptiness() {
        assert!(ProxyConfig::default().is_empty());
        assert!(ProxyConfig::new(json!({})).is_empty());
        assert!(ProxyConfig::new(json!("")).is_empty());
        assert!(!ProxyConfig::new(json!({"upstreams": {}})).is_empty());
        assert!(!ProxyConfig::new(json!("non-empty-config")).is_empty());
    }
}
