//! Catalog normalization

use std::collections::BTreeMap;

use sidecar_api::{Endpoint, EndpointMetadata, Service, ServiceCatalog, ServiceInstance};

/// Groups instances into a catalog ordered by service name, with each
/// service's endpoints ordered by type, value and version.
///
/// Instances that are not routable (`STARTING`, `OUT_OF_SERVICE`) are left
/// out. Only the endpoint address and version of the rest make it into the
/// catalog, so heartbeats and TTL changes leave the result unchanged.
pub fn build_catalog(instances: &[ServiceInstance]) -> ServiceCatalog {
    let mut by_service: BTreeMap<&str, Vec<Endpoint>> = BTreeMap::new();

    for instance in instances.iter().filter(|i| i.is_routable()) {
        by_service
            .entry(instance.service_name.as_str())
            .or_default()
            .push(Endpoint {
                endpoint_type: instance.endpoint.endpoint_type.clone(),
                value: instance.endpoint.value.clone(),
                metadata: EndpointMetadata {
                    version: instance.version(),
                },
            });
    }

    let services = by_service
        .into_iter()
        .map(|(name, mut endpoints)| {
            endpoints.sort();
            Service {
                name: name.to_string(),
                endpoints,
            }
        })
        .collect();

    ServiceCatalog { services }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use sidecar_api::{
        INSTANCE_STATUS_OUT_OF_SERVICE, INSTANCE_STATUS_STARTING, INSTANCE_STATUS_UP,
        ServiceEndpoint,
    };

    fn instance(id: &str, service: &str, address: &str, version: &str) -> ServiceInstance {
        let mut instance = ServiceInstance::new(service, ServiceEndpoint::http(address));
        instance.id = id.to_string();
        instance.metadata = Some(json!({"version": version}));
        instance
    }

    #[test]
    fn test_catalog_ignores_heartbeat_and_ttl() {
        let mut a = instance("1", "reviews", "10.0.0.1:9080", "v1");
        a.ttl = 30;
        a.last_heartbeat = Some(Utc::now());

        let mut b = a.clone();
        b.ttl = 90;
        b.last_heartbeat = Some(Utc::now() + Duration::seconds(45));

        assert_eq!(build_catalog(&[a]), build_catalog(&[b]));
    }

    #[test]
    fn test_versions_of_one_service_become_sorted_endpoints() {
        let instances = vec![
            instance("2", "reviews", "10.0.0.1:9080", "v2"),
            instance("1", "reviews", "10.0.0.1:9080", "v1"),
        ];

        let catalog = build_catalog(&instances);
        assert_eq!(catalog.services.len(), 1);

        let reviews = catalog.service("reviews").unwrap();
        let versions: Vec<&str> = reviews
            .endpoints
            .iter()
            .map(|e| e.metadata.version.as_str())
            .collect();
        assert_eq!(versions, vec!["v1", "v2"]);

        // Input order does not matter
        let reversed: Vec<_> = instances.into_iter().rev().collect();
        assert_eq!(build_catalog(&reversed), catalog);
    }

    #[test]
    fn test_services_sorted_by_name() {
        let catalog = build_catalog(&[
            instance("1", "ratings", "10.0.0.3:9080", "v1"),
            instance("2", "details", "10.0.0.2:9080", "v1"),
            instance("3", "reviews", "10.0.0.1:9080", "v1"),
        ]);

        let names: Vec<&str> = catalog.services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["details", "ratings", "reviews"]);
    }

    #[test]
    fn test_version_falls_back_to_tags() {
        let instance = ServiceInstance::new("reviews", ServiceEndpoint::http("10.0.0.1:9080"))
            .with_tags(vec!["canary".to_string(), "beta".to_string()]);

        let catalog = build_catalog(&[instance]);
        assert_eq!(
            catalog.services[0].endpoints[0].metadata.version,
            "beta,canary"
        );
    }

    #[test]
    fn test_empty_input_builds_empty_catalog() {
        assert!(build_catalog(&[]).is_empty());
    }

    #[test]
    fn test_status_change_changes_catalog() {
        let mut up = instance("1", "reviews", "10.0.0.1:9080", "v1");
        up.status = INSTANCE_STATUS_UP.to_string();
        let other = instance("2", "reviews", "10.0.0.2:9080", "v1");

        let mut drained = up.clone();
        drained.status = INSTANCE_STATUS_OUT_OF_SERVICE.to_string();

        let before = build_catalog(&[up, other.clone()]);
        let after = build_catalog(&[drained, other]);
        assert_ne!(before, after);

        let endpoints = &after.service("reviews").unwrap().endpoints;
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].value, "10.0.0.2:9080");
    }

    #[test]
    fn test_service_without_routable_instances_is_dropped() {
        let mut starting = instance("1", "ratings", "10.0.0.3:9080", "v1");
        starting.status = INSTANCE_STATUS_STARTING.to_string();

        let catalog = build_catalog(&[starting, instance("2", "reviews", "10.0.0.1:9080", "v1")]);
        assert!(catalog.service("ratings").is_none());
        assert_eq!(catalog.services.len(), 1);
    }
}
