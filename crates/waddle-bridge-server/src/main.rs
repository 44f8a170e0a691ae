use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use waddle_github_bridge::{load_config_from, MatrixTransport, ServiceContext, ServiceRegistry};

mod server;
mod telemetry;

/// Waddle GitHub bridge - repository webhooks and issue expansions for chat rooms
#[derive(Parser)]
#[command(name = "waddle-bridge-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the bridge configuration file
    #[arg(short, long, default_value = "waddle-bridge.toml")]
    config: PathBuf,

    /// Listen address, overriding the configuration file
    #[arg(short, long)]
    listen: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    telemetry::init(cli.json).map_err(|e| anyhow::anyhow!(e))?;

    info!("Waddle Bridge Server starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }
    let addr = config.listen_addr()?;

    let transport = Arc::new(MatrixTransport::new(
        &config.homeserver_url,
        config.access_token.clone(),
    )?);
    let registry = Arc::new(ServiceRegistry::new(ServiceContext::new(transport)));
    registry.load(&config)?;
    info!(services = registry.len(), "Services loaded");

    server::start(addr, registry).await?;

    telemetry::shutdown();
    Ok(())
}
