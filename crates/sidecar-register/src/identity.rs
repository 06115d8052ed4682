//! Identity of the local service instance

use std::net::IpAddr;

use async_trait::async_trait;
use sidecar_api::{ServiceEndpoint, ServiceInstance};
use tracing::info;

/// Describes the instance to register
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn get_identity(&self) -> anyhow::Result<ServiceInstance>;
}

/// Identity built from static configuration
#[derive(Clone, Debug, Default)]
pub struct StaticIdentity {
    pub service_name: String,
    pub tags: Vec<String>,
    pub endpoint_type: String,
    /// Advertised host; the first private IPv4 address is used when empty
    pub host: String,
    pub port: u16,
}

impl StaticIdentity {
    pub fn new(service_name: &str, endpoint_type: &str, host: &str, port: u16) -> Self {
        Self {
            service_name: service_name.to_string(),
            endpoint_type: endpoint_type.to_string(),
            host: host.to_string(),
            port,
            ..Default::default()
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    fn address(&self, host: &str) -> String {
        if self.port == 0 {
            host.to_string()
        } else {
            format!("{}:{}", host, self.port)
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn get_identity(&self) -> anyhow::Result<ServiceInstance> {
        let host = if self.host.is_empty() {
            let ip = local_ip()?;
            info!("No hostname is configured, using local IP {}", ip);
            ip.to_string()
        } else {
            self.host.clone()
        };

        Ok(ServiceInstance::new(
            self.service_name.clone(),
            ServiceEndpoint::new(self.endpoint_type.clone(), self.address(&host)),
        )
        .with_tags(self.tags.clone()))
    }
}

/// First non-loopback IPv4 address of this host
pub fn local_ip() -> anyhow::Result<IpAddr> {
    if_addrs::get_if_addrs()?
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .map(|iface| iface.ip())
        .find(IpAddr::is_ipv4)
        .ok_or_else(|| anyhow::anyhow!("could not detect a local IPv4 address"))
}
