//! Identity resolution.
//!
//! Turns an optional bearer credential into an [`Identity`]. Resolution never
//! fails: a missing, malformed, expired or wrongly signed credential resolves
//! to [`Identity::Anonymous`].

use crate::error::{Error, Result};
use crate::models::Identity;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::str::FromStr;

/// Resolves a caller credential to an identity.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, credential: Option<&str>) -> Identity;
}

/// Resolver used when no signing secret is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnonymousOnly;

impl IdentityResolver for AnonymousOnly {
    fn resolve(&self, _credential: Option<&str>) -> Identity {
        Identity::Anonymous
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

/// Verifies HS256 tokens issued by the platform's auth service.
pub struct JwtIdentityResolver {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityResolver {
    /// Minimum secret length accepted.
    pub const MIN_SECRET_LEN: usize = 32;

    pub fn new(secret: &str) -> Result<Self> {
        if secret.len() < Self::MIN_SECRET_LEN {
            return Err(Error::Config(format!(
                "JWT secret must be at least {} characters",
                Self::MIN_SECRET_LEN
            )));
        }

        Ok(Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        })
    }
}

impl IdentityResolver for JwtIdentityResolver {
    fn resolve(&self, credential: Option<&str>) -> Identity {
        let Some(token) = credential.map(str::trim).filter(|t| !t.is_empty()) else {
            return Identity::Anonymous;
        };

        match decode::<Claims>(token, &self.key, &self.validation) {
            Ok(data) if !data.claims.sub.is_empty() => Identity::Authenticated(data.claims.sub),
            Ok(_) => {
                tracing::debug!("Credential has empty subject, treating caller as anonymous");
                Identity::Anonymous
            }
            Err(e) => {
                tracing::debug!(error = %e, "Credential rejected, treating caller as anonymous");
                Identity::Anonymous
            }
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        Some(token.trim()).filter(|t| !t.is_empty())
    } else {
        None
    }
}

/// How anonymous callers map onto ledger keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnonymousMode {
    /// All anonymous callers share one slot per bucket and overwrite each other.
    #[default]
    Shared,
    /// A caller-supplied session token gives each anonymous session its own slot.
    Session,
}

impl FromStr for AnonymousMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shared" => Ok(AnonymousMode::Shared),
            "session" => Ok(AnonymousMode::Session),
            other => Err(Error::Config(format!(
                "unknown anonymous mode '{}', expected 'shared' or 'session'",
                other
            ))),
        }
    }
}
