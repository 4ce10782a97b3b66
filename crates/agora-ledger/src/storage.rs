//! Persistent storage using RocksDB.
//!
//! Every ledger entry lives under its own key, so the uniqueness invariant on
//! (node, version, perspective, identity) is the key itself and an upsert is a
//! single `put`. RocksDB applies each `put` atomically; concurrent writers to
//! the same key are linearized by the engine and the last one wins whole.
//!
//! Key layout (all integers big-endian):
//!
//! ```text
//! vote\0        | u32 len | node_id | u64 version | u32 len | perspective_id | identity slot
//! validation\0  | u32 len | node_id | u64 version | u32 len | perspective_id | identity slot
//! node\0        | node_id
//! ```
//!
//! Identity slots: `0x00` shared anonymous, `0x01 | u32 len | user_id`,
//! `0x02 | u32 len | session digest`.

use crate::error::{Error, Result};
use crate::models::{require_id, IdentityKey, NodeRecord, ValidationEntry, VoteEntry};
use rocksdb::{Options, DB};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Mutex;

const VOTE_TAG: &[u8] = b"vote\0";
const VALIDATION_TAG: &[u8] = b"validation\0";
const NODE_TAG: &[u8] = b"node\0";

/// Ledger storage contract.
///
/// Upserts replace any existing entry under the same key as one atomic unit.
/// Scans observe a single point in time.
pub trait FeedbackStore: Send + Sync {
    fn upsert_vote(&self, entry: &VoteEntry) -> Result<()>;

    fn upsert_validation(&self, entry: &ValidationEntry) -> Result<()>;

    fn get_vote(
        &self,
        node_id: &str,
        version: u64,
        perspective_id: &str,
        identity: &IdentityKey,
    ) -> Result<Option<VoteEntry>>;

    fn get_validation(
        &self,
        node_id: &str,
        version: u64,
        perspective_id: &str,
        identity: &IdentityKey,
    ) -> Result<Option<ValidationEntry>>;

    /// All votes in one (node, version, perspective) bucket.
    fn votes_in_bucket(
        &self,
        node_id: &str,
        version: u64,
        perspective_id: &str,
    ) -> Result<Vec<VoteEntry>>;

    /// All votes for a node version, every perspective.
    fn votes_at(&self, node_id: &str, version: u64) -> Result<Vec<VoteEntry>>;

    /// All validations for a node version, every perspective.
    fn validations_at(&self, node_id: &str, version: u64) -> Result<Vec<ValidationEntry>>;
}

/// Storage backend for ledger data and the node registry.
pub struct Storage {
    db: DB,
    /// Serializes registry read-modify-write. Ledger upserts never take it.
    registry: Mutex<()>,
}

impl Storage {
    /// Open or create storage at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self {
            db,
            registry: Mutex::new(()),
        })
    }

    fn put_json<T: serde::Serialize>(&self, key: &[u8], value: &T) -> Result<()> {
        let value = serde_json::to_vec(value)?;
        self.db.put(key, value)?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>> {
        match self.db.get(key)? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, prefix: &[u8]) -> Result<Vec<T>> {
        let mut items = Vec::new();

        let iter = self.db.prefix_iterator(prefix);
        for item in iter {
            let (key, value) = item?;
            if key.starts_with(prefix) {
                items.push(serde_json::from_slice(&value)?);
            } else {
                break;
            }
        }

        Ok(items)
    }

    // --- Node registry ---

    /// Get a node's registry record.
    pub fn get_node(&self, node_id: &str) -> Result<Option<NodeRecord>> {
        self.get_json(&node_key(node_id))
    }

    /// Register a new node at its initial version.
    pub fn register_node(&self, node_id: &str, version: u64) -> Result<NodeRecord> {
        require_id("node_id", node_id)?;
        let _guard = self.lock_registry()?;
        if self.get_node(node_id)?.is_some() {
            return Err(Error::InvalidArgument(format!(
                "node {} is already registered",
                node_id
            )));
        }
        let record = NodeRecord::new(node_id.to_string(), version);
        self.put_json(&node_key(node_id), &record)?;
        Ok(record)
    }

    /// Advance a node to its next version.
    pub fn bump_version(&self, node_id: &str) -> Result<NodeRecord> {
        require_id("node_id", node_id)?;
        let _guard = self.lock_registry()?;
        let current = self
            .get_node(node_id)?
            .ok_or_else(|| Error::NotFound(format!("node {}", node_id)))?;
        let next = current
            .version
            .checked_add(1)
            .ok_or_else(|| Error::InvalidArgument(format!("node {} version overflow", node_id)))?;
        let record = NodeRecord::new(node_id.to_string(), next);
        self.put_json(&node_key(node_id), &record)?;
        Ok(record)
    }

    /// Move a node to an explicit version. Only strictly greater versions are
    /// accepted so a version number is never reused.
    pub fn set_version(&self, node_id: &str, version: u64) -> Result<NodeRecord> {
        require_id("node_id", node_id)?;
        let _guard = self.lock_registry()?;
        let current = self
            .get_node(node_id)?
            .ok_or_else(|| Error::NotFound(format!("node {}", node_id)))?;
        if version <= current.version {
            return Err(Error::InvalidArgument(format!(
                "node {} is at version {}, refusing to move to {}",
                node_id, current.version, version
            )));
        }
        let record = NodeRecord::new(node_id.to_string(), version);
        self.put_json(&node_key(node_id), &record)?;
        Ok(record)
    }

    /// List all registered nodes.
    pub fn list_nodes(&self) -> Result<Vec<NodeRecord>> {
        self.scan(NODE_TAG)
    }

    fn lock_registry(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.registry
            .lock()
            .map_err(|_| Error::Storage("node registry lock poisoned".into()))
    }
}

impl FeedbackStore for Storage {
    fn upsert_vote(&self, entry: &VoteEntry) -> Result<()> {
        let key = entry_key(
            VOTE_TAG,
            &entry.node_id,
            entry.node_version,
            &entry.perspective_id,
            &entry.identity,
        );
        self.put_json(&key, entry)
    }

    fn upsert_validation(&self, entry: &ValidationEntry) -> Result<()> {
        let key = entry_key(
            VALIDATION_TAG,
            &entry.node_id,
            entry.node_version,
            &entry.perspective_id,
            &entry.identity,
        );
        self.put_json(&key, entry)
    }

    fn get_vote(
        &self,
        node_id: &str,
        version: u64,
        perspective_id: &str,
        identity: &IdentityKey,
    ) -> Result<Option<VoteEntry>> {
        self.get_json(&entry_key(VOTE_TAG, node_id, version, perspective_id, identity))
    }

    fn get_validation(
        &self,
        node_id: &str,
        version: u64,
        perspective_id: &str,
        identity: &IdentityKey,
    ) -> Result<Option<ValidationEntry>> {
        self.get_json(&entry_key(
            VALIDATION_TAG,
            node_id,
            version,
            perspective_id,
            identity,
        ))
    }

    fn votes_in_bucket(
        &self,
        node_id: &str,
        version: u64,
        perspective_id: &str,
    ) -> Result<Vec<VoteEntry>> {
        self.scan(&perspective_prefix(VOTE_TAG, node_id, version, perspective_id))
    }

    fn votes_at(&self, node_id: &str, version: u64) -> Result<Vec<VoteEntry>> {
        self.scan(&version_prefix(VOTE_TAG, node_id, version))
    }

    fn validations_at(&self, node_id: &str, version: u64) -> Result<Vec<ValidationEntry>> {
        self.scan(&version_prefix(VALIDATION_TAG, node_id, version))
    }
}

// --- Key codec ---

fn push_component(buf: &mut Vec<u8>, component: &str) {
    buf.extend_from_slice(&(component.len() as u32).to_be_bytes());
    buf.extend_from_slice(component.as_bytes());
}

fn version_prefix(tag: &[u8], node_id: &str, version: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(tag.len() + node_id.len() + 12);
    key.extend_from_slice(tag);
    push_component(&mut key, node_id);
    key.extend_from_slice(&version.to_be_bytes());
    key
}

fn perspective_prefix(tag: &[u8], node_id: &str, version: u64, perspective_id: &str) -> Vec<u8> {
    let mut key = version_prefix(tag, node_id, version);
    push_component(&mut key, perspective_id);
    key
}

fn entry_key(
    tag: &[u8],
    node_id: &str,
    version: u64,
    perspective_id: &str,
    identity: &IdentityKey,
) -> Vec<u8> {
    let mut key = perspective_prefix(tag, node_id, version, perspective_id);
    match identity {
        IdentityKey::Anonymous => key.push(0x00),
        IdentityKey::Authenticated { user_id } => {
            key.push(0x01);
            push_component(&mut key, user_id);
        }
        IdentityKey::AnonymousSession { session } => {
            key.push(0x02);
            push_component(&mut key, session);
        }
    }
    key
}

fn node_key(node_id: &str) -> Vec<u8> {
    let mut key = NODE_TAG.to_vec();
    key.extend_from_slice(node_id.as_bytes());
    key
}
