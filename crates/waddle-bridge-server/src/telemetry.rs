//! Logging setup for the bridge server.
//!
//! Environment variables:
//! - `RUST_LOG`: Log filter (default: info, debug for bridge crates)

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info,waddle_github_bridge=debug,waddle_bridge_server=debug";

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize console logging.
///
/// `json` switches the formatter to one JSON object per line for log
/// shippers.
pub fn init(json: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let registry = tracing_subscriber::registry().with(filter());

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()?;
    }

    tracing::info!(json, "Telemetry initialized");
    Ok(())
}

/// Flush and tear down logging before exit.
///
/// The fmt layers write synchronously, so there is nothing buffered to flush.
pub fn shutdown() {
    tracing::info!("Telemetry shutdown complete");
}
