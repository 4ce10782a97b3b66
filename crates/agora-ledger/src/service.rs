//! Transport-independent feedback operations.
//!
//! `FeedbackService` is the single entry point for submissions and stats. The
//! HTTP layer only decodes requests and calls in here. Each call is stateless:
//! argument checks first, then identity and version resolution, then one
//! atomic upsert, then a fresh aggregation scan.
//!
//! Calls block on storage; async callers run them on the blocking pool.

use crate::aggregate;
use crate::error::{Error, Result};
use crate::identity::{AnonymousMode, IdentityResolver};
use crate::models::{
    now_millis, require_id, Identity, IdentityKey, ValidationEntry, ValidationStats, VoteEntry,
    VoteStats, VoteValue, MAX_ID_LEN, MAX_TEXT_LEN,
};
use crate::oracle::VersionOracle;
use crate::storage::FeedbackStore;
use serde::Serialize;
use std::sync::Arc;

/// A vote as submitted by a caller.
#[derive(Debug, Clone, Default)]
pub struct VoteSubmission {
    pub node_id: String,
    pub perspective_id: String,
    pub vote_value: i64,
    pub reason: Option<String>,
    pub session_token: Option<String>,
}

/// A validation as submitted by a caller.
#[derive(Debug, Clone, Default)]
pub struct ValidationSubmission {
    pub node_id: String,
    pub perspective_id: String,
    pub is_represented: bool,
    pub feedback: Option<String>,
    pub session_token: Option<String>,
}

/// Result of a vote submission.
///
/// The write is reported even when the follow-up aggregation fails; in that
/// case `stats` is `None` and `stats_error` carries the failure.
#[derive(Debug, Clone, Serialize)]
pub struct VoteReceipt {
    pub vote_entry: VoteEntry,
    pub stats: Option<VoteStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats_error: Option<String>,
}

/// Feedback ledger operations.
pub struct FeedbackService {
    store: Arc<dyn FeedbackStore>,
    oracle: Arc<dyn VersionOracle>,
    resolver: Arc<dyn IdentityResolver>,
    anonymous_mode: AnonymousMode,
}

impl FeedbackService {
    pub fn new(
        store: Arc<dyn FeedbackStore>,
        oracle: Arc<dyn VersionOracle>,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            store,
            oracle,
            resolver,
            anonymous_mode: AnonymousMode::default(),
        }
    }

    pub fn with_anonymous_mode(mut self, mode: AnonymousMode) -> Self {
        self.anonymous_mode = mode;
        self
    }

    // --- Writes ---

    /// Record a vote against the node's current version.
    pub fn submit_vote(&self, credential: Option<&str>, sub: VoteSubmission) -> Result<VoteReceipt> {
        require_id("node_id", &sub.node_id)?;
        require_id("perspective_id", &sub.perspective_id)?;
        let vote_value = VoteValue::try_from(sub.vote_value)?;
        check_text("reason", sub.reason.as_deref())?;
        check_session(sub.session_token.as_deref())?;

        let identity = self.identity_key(credential, sub.session_token.as_deref());
        let version = self.oracle.current_version(&sub.node_id)?;

        let entry = VoteEntry {
            node_id: sub.node_id,
            node_version: version,
            perspective_id: sub.perspective_id,
            identity,
            vote_value,
            reason: sub.reason,
            timestamp: now_millis(),
        };
        self.store.upsert_vote(&entry)?;
        tracing::info!(
            node_id = %entry.node_id,
            version,
            perspective_id = %entry.perspective_id,
            anonymous = entry.identity.is_anonymous(),
            vote = vote_value.as_i64(),
            "Vote recorded"
        );

        let (stats, stats_error) =
            match self.bucket_vote_stats(&entry.node_id, version, &entry.perspective_id) {
                Ok(stats) => (Some(stats), None),
                Err(e) => {
                    tracing::error!(
                        node_id = %entry.node_id,
                        version,
                        "Vote stored but stats computation failed: {}",
                        e
                    );
                    (None, Some(e.to_string()))
                }
            };

        Ok(VoteReceipt {
            vote_entry: entry,
            stats,
            stats_error,
        })
    }

    /// Record a validation against the node's current version.
    pub fn submit_validation(
        &self,
        credential: Option<&str>,
        sub: ValidationSubmission,
    ) -> Result<ValidationEntry> {
        require_id("node_id", &sub.node_id)?;
        require_id("perspective_id", &sub.perspective_id)?;
        check_text("feedback", sub.feedback.as_deref())?;
        check_session(sub.session_token.as_deref())?;

        let identity = self.identity_key(credential, sub.session_token.as_deref());
        let version = self.oracle.current_version(&sub.node_id)?;

        let entry = ValidationEntry {
            node_id: sub.node_id,
            node_version: version,
            perspective_id: sub.perspective_id,
            identity,
            is_represented: sub.is_represented,
            feedback: sub.feedback,
            timestamp: now_millis(),
        };
        self.store.upsert_validation(&entry)?;
        tracing::info!(
            node_id = %entry.node_id,
            version,
            perspective_id = %entry.perspective_id,
            anonymous = entry.identity.is_anonymous(),
            represented = entry.is_represented,
            "Validation recorded"
        );

        Ok(entry)
    }

    // --- Reads ---

    /// Validation stats per perspective for the node's current version.
    pub fn validation_stats(&self, node_id: &str) -> Result<Vec<ValidationStats>> {
        require_id("node_id", node_id)?;
        let version = self.oracle.current_version(node_id)?;
        let entries = self.store.validations_at(node_id, version)?;
        Ok(aggregate::validation_stats_by_perspective(&entries))
    }

    /// Validation stats per perspective for an explicit, past or current version.
    pub fn validation_stats_at(&self, node_id: &str, version: u64) -> Result<Vec<ValidationStats>> {
        require_id("node_id", node_id)?;
        self.check_version(node_id, version)?;
        let entries = self.store.validations_at(node_id, version)?;
        Ok(aggregate::validation_stats_by_perspective(&entries))
    }

    /// Vote stats for one explicit (node, version, perspective) bucket.
    pub fn vote_stats(&self, node_id: &str, version: u64, perspective_id: &str) -> Result<VoteStats> {
        require_id("node_id", node_id)?;
        require_id("perspective_id", perspective_id)?;
        self.check_version(node_id, version)?;
        self.bucket_vote_stats(node_id, version, perspective_id)
    }

    /// Vote stats per perspective for the node's current version.
    pub fn current_vote_stats(&self, node_id: &str) -> Result<Vec<VoteStats>> {
        require_id("node_id", node_id)?;
        let version = self.oracle.current_version(node_id)?;
        let entries = self.store.votes_at(node_id, version)?;
        Ok(aggregate::vote_stats_by_perspective(&entries))
    }

    /// The caller's own vote in the current bucket, if any.
    pub fn own_vote(
        &self,
        credential: Option<&str>,
        session_token: Option<&str>,
        node_id: &str,
        perspective_id: &str,
    ) -> Result<Option<VoteEntry>> {
        require_id("node_id", node_id)?;
        require_id("perspective_id", perspective_id)?;
        check_session(session_token)?;
        let identity = self.identity_key(credential, session_token);
        let version = self.oracle.current_version(node_id)?;
        self.store.get_vote(node_id, version, perspective_id, &identity)
    }

    /// The caller's own validation in the current bucket, if any.
    pub fn own_validation(
        &self,
        credential: Option<&str>,
        session_token: Option<&str>,
        node_id: &str,
        perspective_id: &str,
    ) -> Result<Option<ValidationEntry>> {
        require_id("node_id", node_id)?;
        require_id("perspective_id", perspective_id)?;
        check_session(session_token)?;
        let identity = self.identity_key(credential, session_token);
        let version = self.oracle.current_version(node_id)?;
        self.store
            .get_validation(node_id, version, perspective_id, &identity)
    }

    fn bucket_vote_stats(&self, node_id: &str, version: u64, perspective_id: &str) -> Result<VoteStats> {
        let bucket = self.store.votes_in_bucket(node_id, version, perspective_id)?;
        Ok(aggregate::vote_stats(perspective_id, &bucket))
    }

    /// Explicit versions must name a snapshot the node has actually had.
    fn check_version(&self, node_id: &str, version: u64) -> Result<()> {
        let current = self.oracle.current_version(node_id)?;
        if version > current {
            return Err(Error::NotFound(format!(
                "version {} of node {} (current is {})",
                version, node_id, current
            )));
        }
        Ok(())
    }

    fn identity_key(&self, credential: Option<&str>, session_token: Option<&str>) -> IdentityKey {
        let identity = self.resolver.resolve(credential);
        match (&identity, self.anonymous_mode, session_token) {
            (Identity::Anonymous, AnonymousMode::Session, Some(token)) if !token.is_empty() => {
                IdentityKey::for_session(token)
            }
            _ => IdentityKey::for_identity(&identity),
        }
    }
}

fn check_text(field: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(text) if text.len() > MAX_TEXT_LEN => Err(Error::InvalidArgument(format!(
            "{} exceeds {} bytes",
            field, MAX_TEXT_LEN
        ))),
        _ => Ok(()),
    }
}

fn check_session(token: Option<&str>) -> Result<()> {
    match token {
        Some(token) if token.len() > MAX_ID_LEN => Err(Error::InvalidArgument(format!(
            "session_token exceeds {} bytes",
            MAX_ID_LEN
        ))),
        _ => Ok(()),
    }
}
