//! Stored feedback entries.

use super::identity::IdentityKey;
use crate::error::Error;
use serde::{Deserialize, Serialize};

/// A single vote: exactly +1 or -1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum VoteValue {
    Up,
    Down,
}

impl VoteValue {
    pub fn as_i64(self) -> i64 {
        match self {
            VoteValue::Up => 1,
            VoteValue::Down => -1,
        }
    }
}

impl TryFrom<i64> for VoteValue {
    type Error = Error;

    fn try_from(v: i64) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(VoteValue::Up),
            -1 => Ok(VoteValue::Down),
            other => Err(Error::InvalidArgument(format!(
                "vote_value must be 1 or -1, got {}",
                other
            ))),
        }
    }
}

impl From<VoteValue> for i64 {
    fn from(v: VoteValue) -> Self {
        v.as_i64()
    }
}

/// A vote stamped with the node version it was cast against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoteEntry {
    pub node_id: String,

    /// Node version at submission time (never caller-supplied)
    pub node_version: u64,

    pub perspective_id: String,

    pub identity: IdentityKey,

    pub vote_value: VoteValue,

    pub reason: Option<String>,

    /// Unix milliseconds
    pub timestamp: u64,
}

/// A "is this viewpoint represented" validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationEntry {
    pub node_id: String,

    /// Node version at submission time (never caller-supplied)
    pub node_version: u64,

    pub perspective_id: String,

    pub identity: IdentityKey,

    pub is_represented: bool,

    pub feedback: Option<String>,

    /// Unix milliseconds
    pub timestamp: u64,
}
