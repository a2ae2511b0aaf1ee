//! Command line interface for device_farm_orchestrator.
//!
//! Argument parsing, command execution and user feedback for orchestrated
//! device-cloud test runs.

pub mod args;
pub mod commands;
mod output;
mod retry_config;

pub use args::{Args, Command, RuntimeConfig};
pub use commands::{EXIT_INVALID_ARGS, execute_command};
pub use output::OutputManager;
pub use retry_config::RetryConfig;

use crate::error::Result;

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    execute_command(args).await
}
