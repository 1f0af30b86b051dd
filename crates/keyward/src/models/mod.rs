//! Data model shared by validators, interaction and issuance

mod client;
mod consent;
mod parameters;
mod scope;
mod subject;
mod token;

pub use client::{
    AccessTokenType, Client, ClientSecret, Flow, SecretType, TokenExpiration, TokenUsage,
};
pub(crate) use client::{hash_sha256, hash_sha512};
pub use consent::{Consent, UserConsent};
pub use parameters::Parameters;
pub use scope::{Scope, ScopeClaim, ScopeType};
pub use subject::{AuthenticatedUser, Subject};
pub use token::{
    AuthorizationCode, RefreshToken, RefreshTokenPolicy, Token, TokenKind, TokenMetadata,
};

use serde::{Deserialize, Serialize};

/// A single claim (`type` → JSON value)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    /// Claim type, e.g. `sub` or `email`
    #[serde(rename = "type")]
    pub claim_type: String,
    /// Claim value
    pub value: serde_json::Value,
}

impl Claim {
    pub fn new(claim_type: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
        }
    }

    /// Value as a string slice, when it is a JSON string
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }
}
