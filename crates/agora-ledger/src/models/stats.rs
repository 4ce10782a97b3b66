//! Derived aggregates. Never stored.

use serde::{Deserialize, Serialize};

/// Vote tally for one (node, version, perspective) bucket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteStats {
    pub perspective_id: String,
    pub upvotes: u64,
    pub downvotes: u64,
    pub net_score: i64,
}

impl VoteStats {
    pub fn empty(perspective_id: impl Into<String>) -> Self {
        Self {
            perspective_id: perspective_id.into(),
            upvotes: 0,
            downvotes: 0,
            net_score: 0,
        }
    }
}

/// Validation tally for one (node, version, perspective) bucket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationStats {
    pub perspective_id: String,

    #[serde(rename = "total_validations")]
    pub total: u64,

    #[serde(rename = "positive_validations")]
    pub positive: u64,

    /// positive / total, 0 when total is 0
    #[serde(rename = "validation_rate")]
    pub rate: f64,
}
