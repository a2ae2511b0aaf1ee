//! Command line argument parsing and validation.

use crate::cli::retry_config::RetryConfig;
use crate::service::browserstack::DEFAULT_API_URL;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Sharded device-cloud test runs with failure-only retries
#[derive(Parser, Debug)]
#[command(
    name = "device_farm_orchestrator",
    version,
    about = "Run Espresso suites on BrowserStack and retry only what failed",
    long_about = "Upload an app and its instrumentation suite, run the tests sharded across a
device matrix, then resubmit only the failing test classes per device until they
pass or the retry budget is spent.

Usage:
  device_farm_orchestrator run --app app.apk --test-suite tests.apk \\
      --device 'Google Pixel 3-9.0' --tests-file test_selection/browserstack_tests.json \\
      --shards 2 --max-retries 1
  device_farm_orchestrator plan --tests-file tests.json --shards 4
  device_farm_orchestrator status <BUILD_ID> --failures
  device_farm_orchestrator report reports/run.json"
)]
pub struct Args {
    /// Command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Show detailed progress
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload artifacts, run the sharded suite and retry failures
    Run(RunArgs),
    /// Print the shard plan for a test list without contacting the service
    Plan(PlanArgs),
    /// Query a submitted build once
    Status(StatusArgs),
    /// Show a saved run report
    Report(ReportArgs),
}

impl Command {
    /// Command name for messages
    pub fn name(&self) -> &'static str {
        match self {
            Command::Run(_) => "run",
            Command::Plan(_) => "plan",
            Command::Status(_) => "status",
            Command::Report(_) => "report",
        }
    }
}

/// Service credentials and endpoint
#[derive(clap::Args, Debug, Clone)]
pub struct CredentialArgs {
    /// BrowserStack user name
    #[arg(long, env = "BROWSERSTACK_USERNAME", hide_env_values = true)]
    pub username: Option<String>,

    /// BrowserStack access key
    #[arg(long, env = "BROWSERSTACK_ACCESS_KEY", hide_env_values = true)]
    pub access_key: Option<String>,

    /// API base URL
    #[arg(long, default_value = DEFAULT_API_URL)]
    pub api_url: String,
}

/// Where the test classes come from
#[derive(clap::Args, Debug, Clone, Default)]
pub struct TestListArgs {
    /// JSON array of test classes, or a test selection summary
    #[arg(long, value_name = "FILE")]
    pub tests_file: Option<PathBuf>,

    /// Test class to run (repeatable)
    #[arg(long = "test", value_name = "CLASS")]
    pub tests: Vec<String>,
}

/// Arguments for `run`
#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Credentials
    #[command(flatten)]
    pub credentials: CredentialArgs,

    /// Tests to run
    #[command(flatten)]
    pub tests: TestListArgs,

    /// Application APK
    #[arg(long, value_name = "APK")]
    pub app: PathBuf,

    /// Instrumentation test APK
    #[arg(long, value_name = "APK")]
    pub test_suite: PathBuf,

    /// Device target as '<model>-<os version>' (repeatable)
    #[arg(long = "device", value_name = "DEVICE", required = true)]
    pub devices: Vec<String>,

    /// Number of shards for the initial run
    #[arg(long, default_value_t = 1)]
    pub shards: usize,

    /// Retry rounds for failing classes
    #[arg(long, default_value_t = 1)]
    pub max_retries: u32,

    /// Seconds between status checks
    #[arg(long, default_value_t = 60)]
    pub poll_interval_secs: u64,

    /// Minutes to wait for one build before giving up (0 waits forever)
    #[arg(long, default_value_t = 120)]
    pub timeout_mins: u64,

    /// Dashboard project name
    #[arg(long)]
    pub project: Option<String>,

    /// Dashboard build tag
    #[arg(long)]
    pub build_tag: Option<String>,

    /// Collect device logs
    #[arg(long)]
    pub device_logs: bool,

    /// Write a JSON run report here
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,
}

/// Arguments for `plan`
#[derive(clap::Args, Debug, Clone)]
pub struct PlanArgs {
    /// Tests to plan
    #[command(flatten)]
    pub tests: TestListArgs,

    /// Number of shards
    #[arg(long, default_value_t = 1)]
    pub shards: usize,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `status`
#[derive(clap::Args, Debug, Clone)]
pub struct StatusArgs {
    /// Credentials
    #[command(flatten)]
    pub credentials: CredentialArgs,

    /// Build id printed by `run`
    #[arg(index = 1, value_name = "BUILD_ID")]
    pub build_id: String,

    /// Also fetch failing classes per session
    #[arg(long)]
    pub failures: bool,
}

/// Arguments for `report`
#[derive(clap::Args, Debug, Clone)]
pub struct ReportArgs {
    /// Report file written by `run --report`
    #[arg(index = 1, value_name = "FILE")]
    pub path: PathBuf,

    /// Print the raw report JSON
    #[arg(long)]
    pub json: bool,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), String> {
        match &self.command {
            Command::Run(run) => {
                validate_tests(&run.tests)?;
                validate_shards(run.shards)?;
                if run.poll_interval_secs == 0 {
                    return Err("--poll-interval-secs must be at least 1".to_string());
                }
                if run.devices.iter().all(|d| d.trim().is_empty()) {
                    return Err("At least one --device is required".to_string());
                }
            }
            Command::Plan(plan) => {
                validate_tests(&plan.tests)?;
                validate_shards(plan.shards)?;
            }
            Command::Status(status) => {
                if status.build_id.trim().is_empty() {
                    return Err("Build id is required".to_string());
                }
            }
            Command::Report(_) => {}
        }
        Ok(())
    }
}

fn validate_tests(tests: &TestListArgs) -> Result<(), String> {
    if tests.tests_file.is_none() && tests.tests.is_empty() {
        return Err("Provide --tests-file or at least one --test".to_string());
    }
    Ok(())
}

fn validate_shards(shards: usize) -> Result<(), String> {
    if shards == 0 {
        return Err("--shards must be at least 1".to_string());
    }
    Ok(())
}

/// Configuration derived from command line arguments
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Output manager for colored terminal output
    output: super::OutputManager,
    /// Retry limits for network operations
    retry: RetryConfig,
}

impl RuntimeConfig {
    /// Create runtime configuration
    pub fn new(verbose: bool, quiet: bool, retry: RetryConfig) -> Self {
        Self {
            output: super::OutputManager::new(verbose, quiet),
            retry,
        }
    }

    /// Get a reference to the output manager
    pub fn output(&self) -> &super::OutputManager {
        &self.output
    }

    /// Retry limits
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }
}

impl From<&Args> for RuntimeConfig {
    fn from(args: &Args) -> Self {
        Self::new(args.verbose, args.quiet, RetryConfig::from_env())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new(false, false, RetryConfig::default())
    }
}

impl RuntimeConfig {
    /// Print message
    pub fn println(&self, message: &str) {
        self.output.println(message);
    }

    /// Print verbose message
    pub fn verbose_println(&self, message: &str) {
        self.output.verbose(message);
    }

    /// Print error message (always shown)
    pub fn error_println(&self, message: &str) {
        self.output.error(message);
    }

    /// Print warning message
    pub fn warning_println(&self, message: &str) {
        self.output.warn(message);
    }

    /// Print success message
    pub fn success_println(&self, message: &str) {
        self.output.success(message);
    }

    /// Print progress message
    pub fn progress_println(&self, message: &str) {
        self.output.progress(message);
    }

    /// Print a section header
    pub fn section(&self, title: &str) {
        self.output.section(title);
    }

    /// Print indented text
    pub fn indent(&self, message: &str) {
        self.output.indent(message);
    }

    /// Check if verbose output is enabled
    pub fn is_verbose(&self) -> bool {
        self.output.is_verbose()
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.output.is_quiet()
    }
}
