//! Command execution functions.
//!
//! Each command returns its process exit code; errors are reported here
//! together with recovery suggestions.

mod helpers;
mod plan;
mod report;
mod retry;
mod run;
mod status;

use crate::cli::{Args, Command, RuntimeConfig};
use crate::error::Result;

use plan::execute_plan;
use report::execute_report;
use run::execute_run;
use status::execute_status;

pub use retry::retry_with_backoff;

/// Exit code for invalid command line arguments
pub const EXIT_INVALID_ARGS: i32 = 2;

/// Execute the main command based on parsed arguments
pub async fn execute_command(args: Args) -> Result<i32> {
    if let Err(validation_error) = args.validate() {
        // Validation errors are shown even in quiet mode
        let output = super::OutputManager::new(false, false);
        output.error(&format!("Invalid arguments: {}", validation_error));
        return Ok(EXIT_INVALID_ARGS);
    }

    let config = RuntimeConfig::from(&args);

    let result = match &args.command {
        Command::Run(run) => execute_run(run, &config).await,
        Command::Plan(plan) => execute_plan(plan, &config).await,
        Command::Status(status) => execute_status(status, &config).await,
        Command::Report(report) => execute_report(report, &config).await,
    };

    match result {
        Ok(exit_code) => Ok(exit_code),
        Err(e) => {
            config.error_println(&format!("Command '{}' failed: {}", args.command.name(), e));

            let suggestions = e.recovery_suggestions();
            if !suggestions.is_empty() && !config.is_quiet() {
                config.println("\n💡 Recovery suggestions:");
                for suggestion in suggestions {
                    config.println(&format!("  • {}", suggestion));
                }
            }

            Ok(1)
        }
    }
}
