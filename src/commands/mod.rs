//! Command handlers for the broker CLI
//!
//! Each submodule implements one subcommand from [`crate::cli::Commands`].

pub mod discover;
pub mod serve;
pub mod verify;
