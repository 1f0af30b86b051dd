use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::client::{AccessTokenType, TokenExpiration, TokenUsage};
use super::{AuthenticatedUser, Claim, Scope};
use crate::constants::{ACCESS_TOKEN_TYPE, IDENTITY_TOKEN_TYPE, claim_types};

/// Subject, client and scopes of an issued artifact, whatever its form
///
/// Self-contained tokens, reference tokens, refresh tokens and authorization
/// codes all expose the same view so consumers need not tell them apart.
pub trait TokenMetadata {
    /// Subject the artifact was issued for; `None` for client-only tokens
    fn subject_id(&self) -> Option<&str>;
    /// Client the artifact was issued to
    fn client_id(&self) -> &str;
    /// Granted scope names
    fn scopes(&self) -> Vec<String>;
}

/// Access or identity token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Identity,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => ACCESS_TOKEN_TYPE,
            TokenKind::Identity => IDENTITY_TOKEN_TYPE,
        }
    }
}

/// Unsigned token: a claims bag plus its envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub issuer: String,
    pub audience: String,
    pub creation_time: DateTime<Utc>,
    /// Seconds
    pub lifetime: u32,
    pub client_id: String,
    /// Rendering of access tokens; identity tokens are always JWTs
    pub access_token_type: AccessTokenType,
    pub claims: Vec<Claim>,
}

impl Token {
    pub fn new(
        kind: TokenKind,
        client_id: impl Into<String>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        lifetime: u32,
    ) -> Self {
        Self {
            kind,
            issuer: issuer.into(),
            audience: audience.into(),
            creation_time: Utc::now(),
            lifetime,
            client_id: client_id.into(),
            access_token_type: AccessTokenType::Jwt,
            claims: Vec::new(),
        }
    }

    /// First claim of `claim_type`
    pub fn claim(&self, claim_type: &str) -> Option<&Claim> {
        self.claims.iter().find(|c| c.claim_type == claim_type)
    }

    /// String values of every claim of `claim_type`
    pub fn claim_values<'a>(&'a self, claim_type: &'a str) -> impl Iterator<Item = &'a str> {
        self.claims
            .iter()
            .filter(move |c| c.claim_type == claim_type)
            .filter_map(Claim::as_str)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.creation_time + Duration::seconds(i64::from(self.lifetime))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at() <= now
    }

    /// Rebuild the authenticated user from the standard subject claims
    pub fn subject(&self) -> Option<AuthenticatedUser> {
        let subject_id = self.subject_id()?;
        let identity_provider = self
            .claim(claim_types::IDENTITY_PROVIDER)
            .and_then(Claim::as_str)
            .unwrap_or_default();

        let mut user = AuthenticatedUser::new(subject_id, identity_provider);
        if let Some(method) = self
            .claim(claim_types::AUTHENTICATION_METHOD)
            .and_then(Claim::as_str)
        {
            user = user.with_authentication_method(method);
        }
        if let Some(auth_time) = self
            .claim(claim_types::AUTHENTICATION_TIME)
            .and_then(|c| c.value.as_i64())
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        {
            user = user.with_auth_time(auth_time);
        }
        Some(user)
    }
}

impl TokenMetadata for Token {
    fn subject_id(&self) -> Option<&str> {
        self.claim(claim_types::SUBJECT).and_then(Claim::as_str)
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn scopes(&self) -> Vec<String> {
        self.claim_values(claim_types::SCOPE)
            .map(str::to_string)
            .collect()
    }
}

/// Refresh token policy captured when the refresh token is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenPolicy {
    pub usage: TokenUsage,
    pub expiration: TokenExpiration,
    /// Seconds from original issuance
    pub absolute_lifetime: u32,
    /// Seconds added on each use
    pub sliding_lifetime: u32,
}

/// Server-side refresh token record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshToken {
    /// Access token this refresh token renews
    pub access_token: Token,
    /// Original issuance time; unchanged by sliding renewals
    pub creation_time: DateTime<Utc>,
    /// Seconds from `creation_time`
    pub lifetime: u32,
    pub policy: RefreshTokenPolicy,
    /// Incremented on every use
    pub version: u32,
}

impl RefreshToken {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.creation_time + Duration::seconds(i64::from(self.lifetime))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at() <= now
    }
}

impl TokenMetadata for RefreshToken {
    fn subject_id(&self) -> Option<&str> {
        self.access_token.subject_id()
    }

    fn client_id(&self) -> &str {
        &self.access_token.client_id
    }

    fn scopes(&self) -> Vec<String> {
        self.access_token.scopes()
    }
}

/// Single-use code binding client, subject, redirect URI and scopes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub client_id: String,
    pub subject: AuthenticatedUser,
    /// Redirect URI the code was issued to; must be repeated on redemption
    pub redirect_uri: String,
    /// Scopes granted at the authorize endpoint, resolved at issuance
    pub scopes: Vec<Scope>,
    pub is_open_id: bool,
    pub nonce: Option<String>,
    pub was_consent_shown: bool,
    pub creation_time: DateTime<Utc>,
    /// Seconds
    pub lifetime: u32,
}

impl AuthorizationCode {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.creation_time + Duration::seconds(i64::from(self.lifetime))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at() <= now
    }
}

impl TokenMetadata for AuthorizationCode {
    fn subject_id(&self) -> Option<&str> {
        Some(&self.subject.subject_id)
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn scopes(&self) -> Vec<String> {
        self.scopes.iter().map(|s| s.name.clone()).collect()
    }
}
