//! Entry point for the `sidecar` binary.

use clap::Parser;
use sidecar_server::startup::{self, LoggingConfig, ShutdownSignal};
use sidecar_server::{Cli, Sidecar, SidecarConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = SidecarConfig::load(&cli)?;

    if cli.print_config {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    let _logging_guard = startup::init_logging(&LoggingConfig::from_settings(&config.log))?;
    info!(
        register = config.register,
        proxy = config.proxy,
        service_name = %config.service.name,
        registry_url = %config.registry.url,
        "Starting sidecar"
    );

    let sidecar = Sidecar::build(&config)?;

    let shutdown = ShutdownSignal::new();
    let shutdown_rx = shutdown.subscribe();
    startup::spawn_signal_handler(shutdown);

    sidecar.run(shutdown_rx).await
}
