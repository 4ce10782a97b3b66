//! Node version lookup.
//!
//! The ledger stamps every write with the version reported here at submission
//! time. Implementations must never report a version number for a node that
//! was already used for different content: versions only move forward.

use crate::error::{Error, Result};
use crate::storage::Storage;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Reports a node's current content version.
pub trait VersionOracle: Send + Sync {
    /// Current version of `node_id`, or [`Error::NotFound`].
    fn current_version(&self, node_id: &str) -> Result<u64>;
}

/// Oracle backed by the node registry in [`Storage`].
pub struct StorageVersionOracle {
    storage: Arc<Storage>,
}

impl StorageVersionOracle {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl VersionOracle for StorageVersionOracle {
    fn current_version(&self, node_id: &str) -> Result<u64> {
        self.storage
            .get_node(node_id)?
            .map(|record| record.version)
            .ok_or_else(|| Error::NotFound(format!("node {}", node_id)))
    }
}

/// In-memory oracle with the same forward-only contract.
#[derive(Debug, Default)]
pub struct StaticVersionOracle {
    versions: RwLock<HashMap<String, u64>>,
}

impl StaticVersionOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration.
    pub fn with_node(mut self, node_id: &str, version: u64) -> Self {
        // Owned, so no other thread can have poisoned the lock.
        let versions = match self.versions.get_mut() {
            Ok(versions) => versions,
            Err(poisoned) => poisoned.into_inner(),
        };
        versions.insert(node_id.to_string(), version);
        self
    }

    /// Advance a node to its next version and return it.
    pub fn bump(&self, node_id: &str) -> Result<u64> {
        let mut versions = self
            .versions
            .write()
            .map_err(|_| Error::Storage("version map lock poisoned".into()))?;
        let version = versions
            .get_mut(node_id)
            .ok_or_else(|| Error::NotFound(format!("node {}", node_id)))?;
        *version = version
            .checked_add(1)
            .ok_or_else(|| Error::InvalidArgument(format!("node {} version overflow", node_id)))?;
        Ok(*version)
    }

    /// Move a node to an explicit, strictly greater version.
    pub fn set(&self, node_id: &str, next: u64) -> Result<()> {
        let mut versions = self
            .versions
            .write()
            .map_err(|_| Error::Storage("version map lock poisoned".into()))?;
        let version = versions
            .get_mut(node_id)
            .ok_or_else(|| Error::NotFound(format!("node {}", node_id)))?;
        if next <= *version {
            return Err(Error::InvalidArgument(format!(
                "node {} is at version {}, refusing to move to {}",
                node_id, version, next
            )));
        }
        *version = next;
        Ok(())
    }
}

impl VersionOracle for StaticVersionOracle {
    fn current_version(&self, node_id: &str) -> Result<u64> {
        let versions = self
            .versions
            .read()
            .map_err(|_| Error::Storage("version map lock poisoned".into()))?;
        versions
            .get(node_id)
            .copied()
            .ok_or_else(|| Error::NotFound(format!("node {}", node_id)))
    }
}
