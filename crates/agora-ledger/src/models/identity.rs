//! Caller identity and its ledger-key form.

use serde::{Deserialize, Serialize};

/// A resolved caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// No stable identifier
    Anonymous,
    /// Verified user id
    Authenticated(String),
}

/// Identity component of a ledger key.
///
/// All anonymous callers share the [`IdentityKey::Anonymous`] slot unless the
/// node runs with per-session anonymous slots, in which case a caller-supplied
/// session token is hashed into [`IdentityKey::AnonymousSession`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdentityKey {
    Anonymous,
    AnonymousSession { session: String },
    Authenticated { user_id: String },
}

impl IdentityKey {
    /// Key slot for an identity with no session widening.
    pub fn for_identity(identity: &Identity) -> Self {
        match identity {
            Identity::Anonymous => IdentityKey::Anonymous,
            Identity::Authenticated(user_id) => IdentityKey::Authenticated {
                user_id: user_id.clone(),
            },
        }
    }

    /// Key slot for an anonymous session token. Only the digest is kept.
    pub fn for_session(token: &str) -> Self {
        let digest = blake3::hash(token.as_bytes());
        IdentityKey::AnonymousSession {
            session: hex::encode(digest.as_bytes()),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        !matches!(self, IdentityKey::Authenticated { .. })
    }
}

impl From<&Identity> for IdentityKey {
    fn from(identity: &Identity) -> Self {
        Self::for_identity(identity)
    }
}
