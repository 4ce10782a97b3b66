//! Aggregate statistics over ledger entries.
//!
//! Pure functions over a snapshot of entries. Nothing here is cached; callers
//! rescan the bucket on every read.

use crate::models::{ValidationEntry, ValidationStats, VoteEntry, VoteStats, VoteValue};
use std::collections::BTreeMap;

/// Tally one bucket of votes.
pub fn vote_stats(perspective_id: &str, bucket: &[VoteEntry]) -> VoteStats {
    let mut stats = VoteStats::empty(perspective_id);
    for entry in bucket {
        match entry.vote_value {
            VoteValue::Up => stats.upvotes += 1,
            VoteValue::Down => stats.downvotes += 1,
        }
    }
    stats.net_score = stats.upvotes as i64 - stats.downvotes as i64;
    stats
}

/// Tally one bucket of validations.
pub fn validation_stats(perspective_id: &str, bucket: &[ValidationEntry]) -> ValidationStats {
    let total = bucket.len() as u64;
    let positive = bucket.iter().filter(|e| e.is_represented).count() as u64;
    let rate = if total == 0 {
        0.0
    } else {
        positive as f64 / total as f64
    };
    ValidationStats {
        perspective_id: perspective_id.to_string(),
        total,
        positive,
        rate,
    }
}

/// Group a node version's votes by perspective and tally each group.
/// Output is ordered by perspective id.
pub fn vote_stats_by_perspective(entries: &[VoteEntry]) -> Vec<VoteStats> {
    group_by_perspective(entries, |e| &e.perspective_id)
        .into_iter()
        .map(|(perspective_id, bucket)| vote_stats(perspective_id, &bucket))
        .collect()
}

/// Group a node version's validations by perspective and tally each group.
/// Output is ordered by perspective id.
pub fn validation_stats_by_perspective(entries: &[ValidationEntry]) -> Vec<ValidationStats> {
    group_by_perspective(entries, |e| &e.perspective_id)
        .into_iter()
        .map(|(perspective_id, bucket)| validation_stats(perspective_id, &bucket))
        .collect()
}

fn group_by_perspective<'a, T: Clone>(
    entries: &'a [T],
    perspective: impl Fn(&'a T) -> &'a String,
) -> BTreeMap<&'a str, Vec<T>> {
    let mut groups: BTreeMap<&str, Vec<T>> = BTreeMap::new();
    for entry in entries {
        groups
            .entry(perspective(entry).as_str())
            .or_default()
            .push(entry.clone());
    }
    groups
}
