//! mcp-oauth-broker - Delegated OAuth broker for MCP servers
//!
//! Main entry point for the broker binary.

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mcp_oauth_broker::cli::{Cli, Commands};
use mcp_oauth_broker::commands;
use mcp_oauth_broker::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_tracing(cli.verbose);

    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path)?;
    config.validate()?;
    tracing::debug!(path = config_path, servers = config.servers.len(), "Loaded configuration");

    match cli.command {
        Commands::Serve { bind } => {
            tracing::info!(%bind, "Starting OAuth callback server");
            commands::serve::run_serve(config, &bind).await
        }
        Commands::Discover { server } => {
            tracing::info!(server = %server, "Resolving OAuth context");
            commands::discover::run_discover(config, &server).await
        }
        Commands::Verify { token } => commands::verify::run_verify(config, &token).await,
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        "mcp_oauth_broker=debug"
    } else {
        "mcp_oauth_broker=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
