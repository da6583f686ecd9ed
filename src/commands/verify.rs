//! `verify` subcommand handler
//!
//! Introspects a bearer token with the configured verifier and prints the
//! verified token as JSON.

use crate::config::Config;
use crate::error::{BrokerError, Result};
use crate::server::McpTokenVerifier;

/// Verify `token` against the `authorization` settings in `config`.
///
/// # Errors
///
/// Returns [`BrokerError::Config`] if no verifier is configured, and
/// [`BrokerError::InvalidValue`] if the token is rejected.
///
/// # Examples
///
/// ```no_run
/// use mcp_oauth_broker::commands::verify::run_verify;
/// use mcp_oauth_broker::Config;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = Config::load("config/config.yaml")?;
///     run_verify(config, "eyJhbGciOi...").await
/// }
/// ```
pub async fn run_verify(config: Config, token: &str) -> Result<()> {
    let settings = config.authorization.ok_or_else(|| {
        BrokerError::Config("an authorization section is required to verify tokens".into())
    })?;
    let verifier = McpTokenVerifier::new(settings)?;

    match verifier.verify_token(token).await {
        Some(verified) => {
            println!("{}", serde_json::to_string_pretty(&verified)?);
            Ok(())
        }
        None => Err(BrokerError::InvalidValue("token rejected by introspection".into()).into()),
    }
}
