//! Plan command implementation.
//!
//! Prints how a test list would be split into shards, without touching the
//! device cloud.

use super::helpers::load_tests;
use crate::cli::RuntimeConfig;
use crate::cli::args::PlanArgs;
use crate::error::Result;
use crate::shard;

/// Execute plan command
pub(super) async fn execute_plan(args: &PlanArgs, config: &RuntimeConfig) -> Result<i32> {
    let tests = load_tests(&args.tests).await?;
    let shards = shard::plan(tests.iter().cloned(), args.shards)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&shards)?);
        return Ok(0);
    }

    let unique: usize = shards.iter().map(|s| s.len()).sum();
    if shards.len() < args.shards {
        config.warning_println(&format!(
            "Only {} test class(es); using {} shard(s) instead of {}",
            unique,
            shards.len(),
            args.shards
        ));
    }

    config.section(&format!("{} test class(es) in {} shard(s)", unique, shards.len()));
    for shard in &shards {
        config.println(&format!("{} ({} class(es))", shard.name, shard.len()));
        for test in &shard.tests {
            config.indent(test.as_str());
        }
    }
    Ok(0)
}
