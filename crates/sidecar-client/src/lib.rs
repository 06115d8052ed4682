//! Sidecar client - remote adapters and caching wrappers
//!
//! Provides:
//! - `RegistryClient`: registry REST client implementing registration and
//!   discovery
//! - `ControllerHttpClient`: controller REST client serving proxy
//!   configuration and routing rules
//! - `DiscoveryCache` / `RulesCache`: background-refreshed snapshots that
//!   answer reads without touching the network
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use sidecar_client::{DiscoveryCache, HttpClientConfig, RegistryClient};
//!
//! let registry = Arc::new(RegistryClient::new(HttpClientConfig::new("http://registry:8080"))?);
//! let cache = DiscoveryCache::new(registry, Duration::from_secs(15));
//! let instances = cache.list_service_instances("reviews").await?;
//! ```

pub mod cache;
pub mod controller;
pub mod http;
pub mod registry;

pub use cache::{DiscoveryCache, RulesCache};
pub use controller::ControllerHttpClient;
pub use http::HttpClientConfig;
pub use registry::RegistryClient;
