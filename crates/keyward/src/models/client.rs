use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

use super::Claim;
use super::token::RefreshTokenPolicy;

/// OAuth2 / OIDC grant pattern a client is registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    AuthorizationCode,
    Implicit,
    Hybrid,
    ClientCredentials,
    ResourceOwner,
    Custom,
}

impl Flow {
    /// Whether a refresh token may ever be issued for this flow
    pub fn allows_refresh_tokens(&self) -> bool {
        matches!(
            self,
            Flow::AuthorizationCode | Flow::Hybrid | Flow::ResourceOwner | Flow::Custom
        )
    }
}

/// Refresh token handle reuse policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenUsage {
    /// The same handle is returned on every refresh
    ReUse,
    /// Every refresh issues a new handle and invalidates the old one
    OneTimeOnly,
}

/// Refresh token lifetime policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenExpiration {
    /// Lifetime is extended on every use, capped by the absolute lifetime
    Sliding,
    /// Lifetime is fixed at issuance
    Absolute,
}

/// Form in which access tokens are handed to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessTokenType {
    /// Self-contained signed JWT
    Jwt,
    /// Opaque handle resolved through the token handle store
    Reference,
}

/// How a stored secret value is to be compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretType {
    /// Plain value
    SharedSecret,
    /// Base64 SHA-256 of the plain value
    Sha256,
    /// Base64 SHA-512 of the plain value
    Sha512,
    /// Hex thumbprint of a client certificate
    X509Thumbprint,
}

/// A client credential as stored in the client directory
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientSecret {
    pub value: String,
    pub secret_type: SecretType,
    pub description: Option<String>,
    pub expiration: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecret")
            .field("value", &"[REDACTED]")
            .field("secret_type", &self.secret_type)
            .field("description", &self.description)
            .field("expiration", &self.expiration)
            .finish()
    }
}

impl ClientSecret {
    /// Plain shared secret
    pub fn shared(value: impl Into<String>) -> Self {
        Self::with_type(value.into(), SecretType::SharedSecret)
    }

    /// Hash `plain` with SHA-256 and store the base64 digest
    pub fn sha256(plain: &str) -> Self {
        Self::with_type(hash_sha256(plain), SecretType::Sha256)
    }

    /// Hash `plain` with SHA-512 and store the base64 digest
    pub fn sha512(plain: &str) -> Self {
        Self::with_type(hash_sha512(plain), SecretType::Sha512)
    }

    /// Certificate thumbprint (hex, case-insensitive)
    pub fn x509_thumbprint(thumbprint: impl Into<String>) -> Self {
        Self::with_type(thumbprint.into(), SecretType::X509Thumbprint)
    }

    fn with_type(value: String, secret_type: SecretType) -> Self {
        Self {
            value,
            secret_type,
            description: None,
            expiration: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn expires_at(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_some_and(|expiration| expiration <= now)
    }
}

pub(crate) fn hash_sha256(value: &str) -> String {
    STANDARD.encode(Sha256::digest(value.as_bytes()))
}

pub(crate) fn hash_sha512(value: &str) -> String {
    STANDARD.encode(Sha512::digest(value.as_bytes()))
}

/// A registered client application
///
/// Read-only to the pipeline; owned by the client store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub enabled: bool,
    pub client_id: String,
    pub client_name: String,
    pub client_secrets: Vec<ClientSecret>,
    pub flow: Flow,
    pub redirect_uris: Vec<String>,
    pub post_logout_redirect_uris: Vec<String>,
    /// Empty means every scope is allowed
    pub allowed_scopes: Vec<String>,
    pub require_consent: bool,
    pub allow_remember_consent: bool,
    pub access_token_type: AccessTokenType,
    /// Seconds
    pub identity_token_lifetime: u32,
    /// Seconds
    pub access_token_lifetime: u32,
    /// Seconds
    pub authorization_code_lifetime: u32,
    /// Seconds
    pub absolute_refresh_token_lifetime: u32,
    /// Seconds
    pub sliding_refresh_token_lifetime: u32,
    pub refresh_token_usage: TokenUsage,
    pub refresh_token_expiration: TokenExpiration,
    /// Empty means every identity provider is allowed
    pub identity_provider_restrictions: Vec<String>,
    pub enable_local_login: bool,
    /// Claims added to access tokens for this client
    pub claims: Vec<Claim>,
    /// Also send client claims for user-bound tokens
    pub always_send_client_claims: bool,
    /// Custom grant types the client may use; empty means all
    pub custom_grant_type_restrictions: Vec<String>,
}

impl Client {
    /// Client with the stock lifetimes and policies
    pub fn new(client_id: impl Into<String>, flow: Flow) -> Self {
        let client_id = client_id.into();
        Self {
            enabled: true,
            client_name: client_id.clone(),
            client_id,
            client_secrets: Vec::new(),
            flow,
            redirect_uris: Vec::new(),
            post_logout_redirect_uris: Vec::new(),
            allowed_scopes: Vec::new(),
            require_consent: true,
            allow_remember_consent: true,
            access_token_type: AccessTokenType::Jwt,
            identity_token_lifetime: 300,
            access_token_lifetime: 3600,
            authorization_code_lifetime: 60,
            absolute_refresh_token_lifetime: 2_592_000,
            sliding_refresh_token_lifetime: 1_296_000,
            refresh_token_usage: TokenUsage::OneTimeOnly,
            refresh_token_expiration: TokenExpiration::Absolute,
            identity_provider_restrictions: Vec::new(),
            enable_local_login: true,
            claims: Vec::new(),
            always_send_client_claims: false,
            custom_grant_type_restrictions: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_secret(mut self, secret: ClientSecret) -> Self {
        self.client_secrets.push(secret);
        self
    }

    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uris.push(uri.into());
        self
    }

    pub fn with_allowed_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_refresh_policy(mut self, usage: TokenUsage, expiration: TokenExpiration) -> Self {
        self.refresh_token_usage = usage;
        self.refresh_token_expiration = expiration;
        self
    }

    #[must_use]
    pub fn with_access_token_type(mut self, token_type: AccessTokenType) -> Self {
        self.access_token_type = token_type;
        self
    }

    #[must_use]
    pub fn without_consent(mut self) -> Self {
        self.require_consent = false;
        self
    }

    /// Whether `scope` passes the client's allow-list
    pub fn allows_scope(&self, scope: &str) -> bool {
        self.allowed_scopes.is_empty() || self.allowed_scopes.iter().any(|s| s == scope)
    }

    /// Exact (ordinal) match against the registered redirect URIs
    pub fn has_redirect_uri(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|registered| registered == uri)
    }

    /// Whether `idp` passes the client's identity provider allow-list
    pub fn allows_identity_provider(&self, idp: &str) -> bool {
        self.identity_provider_restrictions.is_empty()
            || self.identity_provider_restrictions.iter().any(|r| r == idp)
    }

    /// Whether the client may use the custom grant `grant_type`
    pub fn allows_custom_grant_type(&self, grant_type: &str) -> bool {
        self.custom_grant_type_restrictions.is_empty()
            || self
                .custom_grant_type_restrictions
                .iter()
                .any(|g| g == grant_type)
    }

    /// Snapshot of the refresh token policy, taken at issuance
    pub fn refresh_token_policy(&self) -> RefreshTokenPolicy {
        RefreshTokenPolicy {
            usage: self.refresh_token_usage,
            expiration: self.refresh_token_expiration,
            absolute_lifetime: self.absolute_refresh_token_lifetime,
            sliding_lifetime: self.sliding_refresh_token_lifetime,
        }
    }
}
