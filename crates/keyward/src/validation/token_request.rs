//! Token request state

use std::fmt;

use crate::constants::{OFFLINE_ACCESS_SCOPE, OPENID_SCOPE, grant_types};
use crate::models::{AuthenticatedUser, AuthorizationCode, Client, Parameters, RefreshToken, Scope};

/// `grant_type` of a token request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GrantType {
    AuthorizationCode,
    ClientCredentials,
    Password,
    RefreshToken,
    /// Assertion grant (RFC 7521) identified by its URI
    Assertion(String),
    /// Extension grant restricted per client
    Custom(String),
}

impl GrantType {
    pub fn as_str(&self) -> &str {
        match self {
            GrantType::AuthorizationCode => grant_types::AUTHORIZATION_CODE,
            GrantType::ClientCredentials => grant_types::CLIENT_CREDENTIALS,
            GrantType::Password => grant_types::PASSWORD,
            GrantType::RefreshToken => grant_types::REFRESH_TOKEN,
            GrantType::Assertion(uri) => uri,
            GrantType::Custom(name) => name,
        }
    }

    /// One of the four RFC 6749 grants
    pub fn standard(value: &str) -> Option<Self> {
        match value {
            grant_types::AUTHORIZATION_CODE => Some(GrantType::AuthorizationCode),
            grant_types::CLIENT_CREDENTIALS => Some(GrantType::ClientCredentials),
            grant_types::PASSWORD => Some(GrantType::Password),
            grant_types::REFRESH_TOKEN => Some(GrantType::RefreshToken),
            _ => None,
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token request that passed validation for its grant type
#[derive(Debug, Clone)]
pub struct ValidatedTokenRequest {
    pub raw: Parameters,
    /// The authenticated client
    pub client: Client,
    pub grant_type: GrantType,
    /// The consumed code (authorization code grant)
    pub authorization_code: Option<AuthorizationCode>,
    /// Resource owner; `None` for client credentials
    pub subject: Option<AuthenticatedUser>,
    /// Presented handle (refresh token grant)
    pub refresh_token_handle: Option<String>,
    pub refresh_token: Option<RefreshToken>,
    /// Granted scopes. Empty for the refresh grant, whose access token
    /// carries its own scope claims.
    pub scopes: Vec<Scope>,
}

impl ValidatedTokenRequest {
    pub(crate) fn new(raw: Parameters, client: Client, grant_type: GrantType) -> Self {
        Self {
            raw,
            client,
            grant_type,
            authorization_code: None,
            subject: None,
            refresh_token_handle: None,
            refresh_token: None,
            scopes: Vec::new(),
        }
    }

    pub fn scope_names(&self) -> Vec<String> {
        self.scopes.iter().map(|s| s.name.clone()).collect()
    }

    pub fn is_open_id(&self) -> bool {
        self.scopes.iter().any(|s| s.name == OPENID_SCOPE)
    }

    pub fn contains_offline_access(&self) -> bool {
        self.scopes.iter().any(|s| s.name == OFFLINE_ACCESS_SCOPE)
    }
}
