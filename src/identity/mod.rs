//! Identity provider integration
//!
//! Signs users in through the Microsoft identity platform with the
//! authorization-code flow and keeps the resulting ID token claims in a
//! server-side session.

mod client;
mod jwks;
mod session;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use client::IdentityClient;
pub use session::{PENDING_LOGIN_TTL, SessionStore, USER_KEY};

use crate::{Error, Result};

/// Claims of a signed-in user, as issued in the ID token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthenticatedUser {
    claims: Map<String, Value>,
}

impl AuthenticatedUser {
    /// Wrap a claim set
    #[must_use]
    pub fn from_claims(claims: Map<String, Value>) -> Self {
        Self { claims }
    }

    /// Wrap a JSON value, which must be an object
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(claims) => Ok(Self::from_claims(claims)),
            other => Err(Error::Identity(format!(
                "claims must be a JSON object, got {other}"
            ))),
        }
    }

    /// The `preferred_username` claim (the user's email for work accounts)
    #[must_use]
    pub fn preferred_username(&self) -> Option<&str> {
        self.claim_str("preferred_username")
    }

    /// The `name` claim
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.claim_str("name")
    }

    /// A string claim by name
    #[must_use]
    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }

    /// All claims
    #[must_use]
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }
}
