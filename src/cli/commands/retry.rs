//! Retry logic with exponential backoff for network operations.

use crate::cli::RuntimeConfig;
use crate::error::{CliError, OrchestratorError, Result};
use tokio::time::{Duration, Instant};

/// Maximum backoff between attempts
const MAX_BACKOFF_SECONDS: u64 = 300;

/// Default ceiling on the whole retry sequence
const DEFAULT_ABSOLUTE_TIMEOUT: Duration = Duration::from_secs(1800);

/// Retry an async operation with exponential backoff
///
/// Recoverable errors are retried after 1s, 2s, 4s, ... (capped); anything
/// else is returned immediately.
///
/// # Arguments
/// * `operation` - Async closure that returns Result<T>
/// * `max_retries` - Maximum number of retry attempts (0 = try once, no retries)
/// * `operation_name` - Human-readable name for messages
/// * `config` - Runtime config for user messaging
/// * `absolute_timeout` - Ceiling for the whole sequence (default: 30 minutes)
pub async fn retry_with_backoff<F, T, Fut>(
    mut operation: F,
    max_retries: u32,
    operation_name: &str,
    config: &RuntimeConfig,
    absolute_timeout: Option<Duration>,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let start_time = Instant::now();
    let deadline = start_time + absolute_timeout.unwrap_or(DEFAULT_ABSOLUTE_TIMEOUT);

    let mut attempts = 0;

    loop {
        if Instant::now() >= deadline {
            return Err(timed_out(operation_name, attempts, start_time));
        }

        match operation().await {
            Ok(result) => {
                if attempts > 0 {
                    config.success_println(&format!(
                        "{} succeeded after {} retry(ies)",
                        operation_name, attempts
                    ));
                }
                return Ok(result);
            }
            Err(e) => {
                if !e.is_recoverable() {
                    log::debug!("{} failed with unrecoverable error: {}", operation_name, e);
                    return Err(e);
                }

                if attempts >= max_retries {
                    config.error_println(&format!(
                        "{} failed after {} attempt(s)",
                        operation_name,
                        attempts + 1
                    ));
                    return Err(e);
                }

                attempts += 1;

                let wait_seconds = 2u64.saturating_pow(attempts - 1).min(MAX_BACKOFF_SECONDS);
                let remaining_time = deadline.saturating_duration_since(Instant::now());
                let actual_wait = Duration::from_secs(wait_seconds).min(remaining_time);

                if actual_wait.is_zero() {
                    return Err(timed_out(operation_name, attempts, start_time));
                }

                config.warning_println(&format!(
                    "{} failed (attempt {}/{}): {}",
                    operation_name,
                    attempts,
                    max_retries + 1,
                    e
                ));
                config.indent(&format!("Retrying in {:.1}s...", actual_wait.as_secs_f64()));

                tokio::time::sleep(actual_wait).await;
            }
        }
    }
}

fn timed_out(operation_name: &str, attempts: u32, start_time: Instant) -> OrchestratorError {
    CliError::ExecutionFailed {
        command: operation_name.to_string(),
        reason: format!(
            "Operation timed out after {} attempt(s) over {:.1}s",
            attempts,
            start_time.elapsed().as_secs_f64()
        ),
    }
    .into()
}
