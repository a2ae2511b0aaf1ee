//! Shard planning: split a test set into near-equal named shards.

use crate::error::{ConfigError, Result};
use crate::model::{Shard, TestIdentifier};
use std::collections::BTreeSet;

/// Split `all_tests` into `min(shard_count, |tests|)` shards.
///
/// Tests are deduplicated and sorted first, so shard membership only
/// depends on the set of tests. Shard sizes differ by at most one, larger
/// shards first, and no shard exceeds `ceil(|tests| / shard_count)`.
pub fn plan<I>(all_tests: I, shard_count: usize) -> Result<Vec<Shard>>
where
    I: IntoIterator<Item = TestIdentifier>,
{
    if shard_count == 0 {
        return Err(ConfigError::InvalidShardCount { count: shard_count }.into());
    }

    let sorted: Vec<TestIdentifier> = all_tests
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let shards = shard_count.min(sorted.len());
    if shards == 0 {
        return Ok(Vec::new());
    }

    let base = sorted.len() / shards;
    let extra = sorted.len() % shards;

    let mut remaining = sorted.into_iter();
    let plan = (0..shards)
        .map(|index| {
            let size = base + usize::from(index < extra);
            Shard {
                name: format!("Shard {}", index + 1),
                tests: remaining.by_ref().take(size).collect(),
            }
        })
        .collect();

    log::debug!("planned {} shard(s) of up to {} test(s)", shards, base + usize::from(extra > 0));
    Ok(plan)
}
