//! `serve` subcommand handler
//!
//! Runs the internal OAuth callback router. The same callback registry is
//! handed to the token manager so flows started in this process are
//! completed by redirects arriving here.

use std::sync::Arc;

use crate::config::Config;
use crate::error::{BrokerError, Result};
use crate::oauth::{OAuthCallbackRegistry, TokenManager};
use crate::server::callback_router;

/// Builds the token manager and callback router sharing one registry.
///
/// # Errors
///
/// Returns an error if the configured token store cannot be created.
pub fn build_broker(config: &Config) -> Result<(Arc<TokenManager>, axum::Router)> {
    let registry = Arc::new(OAuthCallbackRegistry::new());
    let manager = TokenManager::from_settings(config.oauth.clone(), Arc::clone(&registry))?;
    let router = callback_router(registry);
    Ok((Arc::new(manager), router))
}

/// Serve the callback endpoint on `bind` until Ctrl-C.
///
/// # Arguments
///
/// * `config` - Validated broker configuration
/// * `bind` - Socket address to listen on, such as `127.0.0.1:8000`
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
///
/// # Examples
///
/// ```no_run
/// use mcp_oauth_broker::commands::serve::run_serve;
/// use mcp_oauth_broker::Config;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     run_serve(Config::default(), "127.0.0.1:8000").await
/// }
/// ```
pub async fn run_serve(config: Config, bind: &str) -> Result<()> {
    let (manager, router) = build_broker(&config)?;

    if config.oauth.callback_base_url.is_none() {
        tracing::warn!("oauth.callback_base_url is not set; flows will not offer the internal callback");
    }

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| BrokerError::Config(format!("failed to bind {bind}: {e}")))?;
    let local = listener.local_addr()?;
    tracing::info!(addr = %local, servers = config.servers.len(), "OAuth callback server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!(
        pending_flows = manager.registry().pending_count(),
        "OAuth callback server stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
