//! `discover` subcommand handler
//!
//! Resolves the protected resource and authorization server metadata for a
//! configured server and prints the result as JSON.

use std::sync::Arc;

use crate::config::Config;
use crate::error::{BrokerError, Result};
use crate::oauth::{OAuthCallbackRegistry, ResolvedOAuthContext, TokenManager};

/// Resolves the OAuth context of `server_name` from `config`.
///
/// # Errors
///
/// Returns [`BrokerError::Config`] for an unknown server, otherwise any
/// error from [`TokenManager::resolve_oauth_context`].
pub async fn resolve_server(config: &Config, server_name: &str) -> Result<ResolvedOAuthContext> {
    let server = config
        .servers
        .get(server_name)
        .ok_or_else(|| BrokerError::Config(format!("unknown server '{server_name}'")))?;
    let manager = TokenManager::from_settings(
        config.oauth.clone(),
        Arc::new(OAuthCallbackRegistry::new()),
    )?;
    manager.resolve_oauth_context(server_name, server).await
}

/// Print the resolved OAuth context for `server_name`.
///
/// # Examples
///
/// ```no_run
/// use mcp_oauth_broker::commands::discover::run_discover;
/// use mcp_oauth_broker::Config;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = Config::load("config/config.yaml")?;
///     run_discover(config, "github").await
/// }
/// ```
pub async fn run_discover(config: Config, server_name: &str) -> Result<()> {
    let resolved = resolve_server(&config, server_name).await?;
    tracing::debug!(
        resource = %resolved.resource,
        issuer = %resolved.issuer,
        "Resolved OAuth context"
    );
    println!("{}", serde_json::to_string_pretty(&resolved)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_server_is_config_error() {
        let err = resolve_server(&Config::default(), "missing").await.unwrap_err();
        match err.downcast_ref::<BrokerError>() {
            Some(BrokerError::Config(msg)) => assert!(msg.contains("missing")),
            other => panic!("Expected Config error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_without_oauth_is_rejected() {
        let mut config = Config::default();
        config.servers.insert(
            "plain".to_string(),
            crate::config::McpServerConfig {
                url: Some("https://api.example.com/mcp".to_string()),
                auth: None,
            },
        );
        let err = resolve_server(&config, "plain").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BrokerError>(),
            Some(BrokerError::OAuthFlow(_))
        ));
    }
}
