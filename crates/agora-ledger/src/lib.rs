//! Agora Ledger - Versioned Feedback Ledger
//!
//! Records per-user votes and "is this viewpoint represented" validations
//! against an immutable version of a node, and computes consensus statistics
//! from those records on every read.
//!
//! # Architecture
//!
//! - **Models**: Entries, identities and derived stats
//! - **Identity**: Credential to identity resolution, degrading to anonymous
//! - **Oracle**: Current node version lookup (node registry)
//! - **Storage**: RocksDB-backed ledger with one key per (node, version, perspective, identity)
//! - **Aggregate**: Pure per-bucket statistics
//! - **Service**: Transport-independent orchestration
//! - **API**: HTTP endpoints
//! - **Admin Socket**: Unix socket for publishing node versions (ledger-admin CLI)
//!
//! # Example
//!
//! ```no_run
//! use agora_ledger::{LedgerConfig, LedgerNode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = LedgerConfig::from_env()?;
//!     let node = LedgerNode::new(config).await?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

pub mod models;
pub mod identity;
pub mod oracle;
pub mod storage;
pub mod aggregate;
pub mod service;
pub mod node;
pub mod api;
pub mod admin_socket;
pub mod error;

pub use models::{
    Identity, IdentityKey, NodeRecord, ValidationEntry, ValidationStats, VoteEntry, VoteStats,
    VoteValue,
};
pub use identity::{AnonymousMode, AnonymousOnly, IdentityResolver, JwtIdentityResolver};
pub use oracle::{StaticVersionOracle, StorageVersionOracle, VersionOracle};
pub use storage::{FeedbackStore, Storage};
pub use service::{FeedbackService, ValidationSubmission, VoteReceipt, VoteSubmission};
pub use node::{LedgerConfig, LedgerNode, LedgerState};
pub use error::{Error, Result};
