//! Registry REST client
//!
//! Implements both `ServiceRegistry` and `ServiceDiscovery` against the
//! registry's `/api/v1` endpoints.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use sidecar_api::{
    ClientError, InstanceFilter, Result, ServiceDiscovery, ServiceInstance, ServiceRegistry,
};
use tracing::debug;

use crate::http::{HttpClientConfig, RestClient, map_transport_error};

const INSTANCES_PATH: &str = "/api/v1/instances";
const SERVICES_PATH: &str = "/api/v1/services";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RegistrationResponse {
    id: String,
    ttl: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServiceList {
    services: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InstanceList {
    instances: Vec<ServiceInstance>,
}

fn instance_path(id: &str) -> String {
    format!("{}/{}", INSTANCES_PATH, id)
}

fn heartbeat_path(id: &str) -> String {
    format!("{}/{}/heartbeat", INSTANCES_PATH, id)
}

/// Non-caching registry client
#[derive(Clone, Debug)]
pub struct RegistryClient {
    rest: RestClient,
}

impl RegistryClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        Ok(Self {
            rest: RestClient::new(config)?,
        })
    }

    pub fn url(&self) -> &str {
        self.rest.base_url()
    }
}

#[async_trait]
impl ServiceRegistry for RegistryClient {
    async fn register(&self, instance: ServiceInstance) -> Result<ServiceInstance> {
        // Pessimistic heartbeat time, taken before the request is sent
        let last_heartbeat = Utc::now();

        let request = self
            .rest
            .request(Method::POST, INSTANCES_PATH)
            .json(&instance);
        let response = self.rest.send(request, &[StatusCode::CREATED]).await?;
        let body: RegistrationResponse = response.json().await.map_err(map_transport_error)?;

        if body.id.is_empty() {
            return Err(ClientError::Decode(
                "registration response carries no instance id".to_string(),
            ));
        }

        debug!(
            service_name = %instance.service_name,
            instance_id = %body.id,
            ttl = body.ttl,
            "Registered instance"
        );

        Ok(ServiceInstance {
            id: body.id,
            ttl: if body.ttl > 0 { body.ttl } else { instance.ttl },
            last_heartbeat: Some(last_heartbeat),
            ..instance
        })
    }

    async fn renew(&self, id: &str) -> Result<()> {
        let request = self.rest.request(Method::PUT, &heartbeat_path(id));
        self.rest.send(request, &[StatusCode::OK]).await?;
        Ok(())
    }

    async fn deregister(&self, id: &str) -> Result<()> {
        let request = self.rest.request(Method::DELETE, &instance_path(id));
        self.rest.send(request, &[StatusCode::OK]).await?;
        Ok(())
    }
}

#[async_trait]
impl ServiceDiscovery for RegistryClient {
    async fn list_services(&self) -> Result<Vec<String>> {
        let request = self.rest.request(Method::GET, SERVICES_PATH);
        let response = self.rest.send(request, &[StatusCode::OK]).await?;
        let body: ServiceList = response.json().await.map_err(map_transport_error)?;
        Ok(body.services)
    }

    async fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<ServiceInstance>> {
        let query = filter.to_query();
        let mut request = self.rest.request(Method::GET, INSTANCES_PATH);
        if !query.is_empty() {
            request = request.query(&query);
        }

        let response = self.rest.send(request, &[StatusCode::OK]).await?;
        let body: InstanceList = response.json().await.map_err(map_transport_error)?;
        Ok(body.instances)
    }
}
