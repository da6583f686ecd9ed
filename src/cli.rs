//! Command-line interface definition for the OAuth broker
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands to serve the callback endpoint, inspect metadata
//! discovery, and verify bearer tokens.

use clap::{Parser, Subcommand};

/// Delegated OAuth broker for MCP servers
///
/// Serves the internal OAuth callback endpoint and offers diagnostics for
/// the configured downstream servers and token verifier.
#[derive(Parser, Debug, Clone)]
#[command(name = "mcp-oauth-broker")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "MCP_OAUTH_BROKER_CONFIG",
        default_value = "config/config.yaml"
    )]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available broker commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Serve the internal OAuth callback endpoint
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8000")]
        bind: String,
    },

    /// Resolve and print the OAuth context for a configured server
    Discover {
        /// Server name as it appears under `servers` in the configuration
        server: String,
    },

    /// Introspect a bearer token with the configured verifier
    Verify {
        /// The bearer token to verify
        token: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
