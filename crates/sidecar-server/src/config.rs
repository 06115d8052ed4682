//! Sidecar configuration
//!
//! Sources are layered, later ones overriding earlier ones:
//!
//! 1. built-in defaults
//! 2. the YAML file given with `--config`
//! 3. `SIDECAR__*` environment variables, `__` separating nested keys
//!    (for example `SIDECAR__REGISTRY__URL`)
//! 4. command-line flags

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use sidecar_api::ENDPOINT_TYPES;
use sidecar_register::HealthCheckConfig;

pub const ENV_PREFIX: &str = "SIDECAR";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 15_000;
pub const MIN_CONTROLLER_POLL: Duration = Duration::from_secs(5);
pub const MAX_CONTROLLER_POLL: Duration = Duration::from_secs(60 * 60);

/// Command line arguments
#[derive(Debug, Default, Parser)]
#[command(name = "sidecar", version, about = "Mesh sidecar agent")]
pub struct Cli {
    /// Load configuration from a YAML file
    #[arg(long, env = "SIDECAR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable automatic service registration and heartbeat
    #[arg(long)]
    pub register: bool,

    /// Keep the proxy configuration in sync with the control plane
    #[arg(long)]
    pub proxy: bool,

    /// Service to register as, in the form `name:tag1,tag2`
    #[arg(long)]
    pub service: Option<String>,

    /// Service endpoint host (local IP is used if none specified)
    #[arg(long)]
    pub endpoint_host: Option<String>,

    #[arg(long)]
    pub endpoint_port: Option<u16>,

    /// Service endpoint type (http, https, tcp, udp, user)
    #[arg(long)]
    pub endpoint_type: Option<String>,

    #[arg(long)]
    pub registry_url: Option<String>,

    #[arg(long)]
    pub registry_token: Option<String>,

    /// Interval for refreshing registry data, in milliseconds
    #[arg(long)]
    pub registry_poll_ms: Option<u64>,

    #[arg(long)]
    pub controller_url: Option<String>,

    #[arg(long)]
    pub controller_token: Option<String>,

    /// Interval for polling the controller, in milliseconds
    #[arg(long)]
    pub controller_poll_ms: Option<u64>,

    /// Where proxy configuration comes from
    #[arg(long, value_enum)]
    pub proxy_mode: Option<ProxyMode>,

    /// File the rendered proxy configuration is written to
    #[arg(long)]
    pub proxy_output: Option<PathBuf>,

    /// Health check URL (http://, https://, tcp:// or file://), repeatable
    #[arg(long = "healthcheck")]
    pub healthchecks: Vec<String>,

    #[arg(long)]
    pub log_level: Option<String>,

    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    pub print_config: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub host: String,
    pub port: u16,
    #[serde(rename = "type")]
    pub endpoint_type: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 0,
            endpoint_type: sidecar_api::ENDPOINT_TYPE_HTTP.to_string(),
        }
    }
}

/// Connection settings for a control-plane service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub url: String,
    pub token: String,
    pub poll_interval_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl RemoteConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    /// Render the configuration locally from registry and rules data
    #[default]
    Local,
    /// Apply configuration rendered by the controller
    Controller,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub mode: ProxyMode,
    pub output_path: PathBuf,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            mode: ProxyMode::Local,
            output_path: PathBuf::from("/etc/sidecar/proxy.json"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    /// Directory for rolling log files; file logging is off when empty
    pub dir: Option<PathBuf>,
    pub console: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
            console: true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SidecarConfig {
    pub register: bool,
    pub proxy: bool,
    pub service: ServiceConfig,
    pub endpoint: EndpointConfig,
    pub registry: RemoteConfig,
    pub controller: RemoteConfig,
    pub proxy_config: ProxySettings,
    pub healthchecks: Vec<HealthCheckConfig>,
    pub log: LogSettings,
}

impl SidecarConfig {
    /// Loads and validates the configuration for the given arguments
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let mut builder =
            Config::builder().add_source(Config::try_from(&SidecarConfig::default())?);

        if let Some(path) = &cli.config {
            builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Yaml));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: SidecarConfig = builder
            .build()
            .context("failed to load configuration")?
            .try_deserialize()
            .context("invalid configuration")?;

        config.apply_cli(cli)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_cli(&mut self, cli: &Cli) -> anyhow::Result<()> {
        if cli.register {
            self.register = true;
        }
        if cli.proxy {
            self.proxy = true;
        }
        if let Some(service) = &cli.service {
            self.service = parse_service_flag(service);
        }
        if let Some(host) = &cli.endpoint_host {
            self.endpoint.host = host.clone();
        }
        if let Some(port) = cli.endpoint_port {
            self.endpoint.port = port;
        }
        if let Some(endpoint_type) = &cli.endpoint_type {
            self.endpoint.endpoint_type = endpoint_type.clone();
        }
        if let Some(url) = &cli.registry_url {
            self.registry.url = url.clone();
        }
        if let Some(token) = &cli.registry_token {
            self.registry.token = token.clone();
        }
        if let Some(poll) = cli.registry_poll_ms {
            self.registry.poll_interval_ms = poll;
        }
        if let Some(url) = &cli.controller_url {
            self.controller.url = url.clone();
        }
        if let Some(token) = &cli.controller_token {
            self.controller.token = token.clone();
        }
        if let Some(poll) = cli.controller_poll_ms {
            self.controller.poll_interval_ms = poll;
        }
        if let Some(mode) = cli.proxy_mode {
            self.proxy_config.mode = mode;
        }
        if let Some(path) = &cli.proxy_output {
            self.proxy_config.output_path = path.clone();
        }
        if !cli.healthchecks.is_empty() {
            self.healthchecks = cli
                .healthchecks
                .iter()
                .map(|value| HealthCheckConfig::from_flag(value))
                .collect::<Result<Vec<_>, _>>()
                .context("invalid --healthcheck value")?;
        }
        if let Some(level) = &cli.log_level {
            self.log.level = level.clone();
        }
        if let Some(dir) = &cli.log_dir {
            self.log.dir = Some(dir.clone());
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.register && !self.proxy {
            bail!("at least one of register or proxy must be enabled");
        }

        validate_url("Registry URL", &self.registry.url)?;
        if self.registry.poll_interval_ms == 0 {
            bail!("Registry polling interval must be greater than zero");
        }

        if self.register {
            if self.service.name.trim().is_empty() {
                bail!("Service name must not be empty");
            }
            if self.endpoint.port == 0 {
                bail!("Service endpoint port must be between 1 and 65535");
            }
            if !ENDPOINT_TYPES.contains(&self.endpoint.endpoint_type.as_str()) {
                bail!(
                    "Service endpoint type must be one of {}, got {:?}",
                    ENDPOINT_TYPES.join(", "),
                    self.endpoint.endpoint_type
                );
            }
        }

        if self.proxy {
            validate_url("Controller URL", &self.controller.url)?;
            let poll = self.controller.poll_interval();
            if !(MIN_CONTROLLER_POLL..=MAX_CONTROLLER_POLL).contains(&poll) {
                bail!(
                    "Controller polling interval must be between {:?} and {:?}, got {:?}",
                    MIN_CONTROLLER_POLL,
                    MAX_CONTROLLER_POLL,
                    poll
                );
            }
        }

        Ok(())
    }

    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Parses `name:tag1,tag2`; the tag list is optional
pub fn parse_service_flag(value: &str) -> ServiceConfig {
    match value.split_once(':') {
        Some((name, tags)) => ServiceConfig {
            name: name.trim().to_string(),
            tags: tags
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
        },
        None => ServiceConfig {
            name: value.trim().to_string(),
            tags: Vec::new(),
        },
    }
}

fn validate_url(name: &str, value: &str) -> anyhow::Result<()> {
    if value.is_empty() {
        bail!("{} must not be empty", name);
    }
    let url = url::Url::parse(value).with_context(|| format!("{} is not a valid URL", name))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        bail!("{} must be an absolute http(s) URL, got {:?}", name, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid() -> SidecarConfig {
        SidecarConfig {
            register: true,
            proxy: true,
            service: parse_service_flag("reviews:v1"),
            endpoint: EndpointConfig {
                host: "10.0.0.1".to_string(),
                port: 9080,
                endpoint_type: "http".to_string(),
            },
            registry: RemoteConfig {
                url: "http://registry:8080".to_string(),
                ..Default::default()
            },
            controller: RemoteConfig {
                url: "http://controller:8080".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_service_flag() {
        let service = parse_service_flag("reviews:v1,canary");
        assert_eq!(service.name, "reviews");
        assert_eq!(service.tags, vec!["v1".to_string(), "canary".to_string()]);

        let service = parse_service_flag("reviews");
        assert_eq!(service.name, "reviews");
        assert!(service.tags.is_empty());

        let service = parse_service_flag("reviews:");
        assert!(service.tags.is_empty());
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_validate_requires_a_mode() {
        let config = SidecarConfig {
            register: false,
            proxy: false,
            ..valid()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_registration_fields() {
        let mut config = valid();
        config.service.name.clear();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.endpoint.port = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.endpoint.endpoint_type = "grpc".to_string();
        assert!(config.validate().is_err());

        // Registration fields are not checked when only proxying
        let mut config = valid();
        config.register = false;
        config.service.name.clear();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_urls_and_controller_poll() {
        let mut config = valid();
        config.registry.url = "registry:8080".to_string();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.controller.poll_interval_ms = 1_000;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.controller.poll_interval_ms = 2 * 60 * 60 * 1_000;
        assert!(config.validate().is_err());

        // Controller settings only matter when proxying
        let mut config = valid();
        config.proxy = false;
        config.controller.url.clear();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_layers_file_and_cli() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            r#"
register: true
service:
  name: ratings
  tags: [v2]
endpoint:
  host: 10.0.0.2
  port: 9080
registry:
  url: http://registry:8080
  poll_interval_ms: 30000
healthchecks:
  - type: tcp
    value: tcp://localhost:9080
    interval_ms: 10000
"#
        )
        .unwrap();

        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            endpoint_port: Some(9443),
            endpoint_type: Some("https".to_string()),
            ..Default::default()
        };

        let config = SidecarConfig::load(&cli).unwrap();
        assert!(config.register);
        assert!(!config.proxy);
        assert_eq!(config.service.name, "ratings");
        assert_eq!(config.service.tags, vec!["v2".to_string()]);
        assert_eq!(config.endpoint.host, "10.0.0.2");
        assert_eq!(config.endpoint.port, 9443);
        assert_eq!(config.endpoint.endpoint_type, "https");
        assert_eq!(config.registry.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.controller.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(config.healthchecks.len(), 1);
        assert_eq!(config.healthchecks[0].interval_ms, 10_000);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_cli_healthchecks_replace_file_entries() {
        let cli = Cli {
            register: true,
            service: Some("reviews:v1".to_string()),
            endpoint_port: Some(9080),
            registry_url: Some("http://registry:8080".to_string()),
            healthchecks: vec![
                "http://localhost:9080/health".to_string(),
                "tcp://localhost:9080".to_string(),
            ],
            ..Default::default()
        };

        let config = SidecarConfig::load(&cli).unwrap();
        let types: Vec<&str> = config
            .healthchecks
            .iter()
            .map(|h| h.check_type.as_str())
            .collect();
        assert_eq!(types, vec!["http", "tcp"]);
    }

    #[test]
    fn test_invalid_healthcheck_flag() {
        let cli = Cli {
            register: true,
            healthchecks: vec!["grpc://localhost:9000".to_string()],
            ..Default::default()
        };
        assert!(SidecarConfig::load(&cli).is_err());
    }

    #[test]
    fn test_yaml_output() {
        let yaml = valid().to_yaml().unwrap();
        assert!(yaml.contains("registry:"));
        assert!(yaml.contains("mode: local"));
    }
}
