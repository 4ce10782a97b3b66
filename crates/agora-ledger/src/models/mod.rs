//! Ledger models.
//!
//! # Core Types
//!
//! - [`Identity`] - Resolved caller: anonymous or an authenticated user id
//! - [`IdentityKey`] - Identity component of a ledger key
//! - [`VoteEntry`] / [`ValidationEntry`] - Stored feedback, one per key
//! - [`VoteStats`] / [`ValidationStats`] - Derived per-bucket aggregates
//!
//! # Supporting Types
//!
//! - [`VoteValue`] - Exactly +1 or -1
//! - [`NodeRecord`] - Registry record holding a node's current version

mod entry;
mod identity;
mod node;
mod stats;

pub use entry::{ValidationEntry, VoteEntry, VoteValue};
pub use identity::{Identity, IdentityKey};
pub use node::NodeRecord;
pub use stats::{ValidationStats, VoteStats};

use crate::error::{Error, Result};

/// Longest accepted node, perspective or session id, in bytes.
pub const MAX_ID_LEN: usize = 256;

/// Longest accepted reason or feedback text, in bytes.
pub const MAX_TEXT_LEN: usize = 4096;

/// Ids must be non-blank and at most [`MAX_ID_LEN`] bytes.
pub(crate) fn require_id(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidArgument(format!("{} is required", field)));
    }
    if value.len() > MAX_ID_LEN {
        return Err(Error::InvalidArgument(format!(
            "{} exceeds {} bytes",
            field, MAX_ID_LEN
        )));
    }
    Ok(())
}

/// Current Unix time in milliseconds.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
