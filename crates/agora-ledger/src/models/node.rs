//! Node registry record.

use serde::{Deserialize, Serialize};

/// Current content version of a node, as published by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeRecord {
    pub node_id: String,

    /// Monotonically increasing, never reused
    pub version: u64,

    /// Unix milliseconds of the last version change
    pub updated_at: u64,
}

impl NodeRecord {
    pub fn new(node_id: String, version: u64) -> Self {
        Self {
            node_id,
            version,
            updated_at: super::now_millis(),
        }
    }
}
