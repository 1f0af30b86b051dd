//! In-memory store and user service implementations
//!
//! Backed by [`DashMap`]. Suitable for tests, demos and single-node hosts;
//! nothing survives a restart.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use subtle::ConstantTimeEq;

use crate::error::Result;
use crate::models::{
    AuthenticatedUser, AuthorizationCode, Claim, Client, Consent, Parameters, RefreshToken,
    Scope, Token, TokenMetadata,
};
use crate::services::UserService;
use crate::stores::{
    AuthorizationCodeStore, ClientStore, ConsentStore, RefreshTokenStore, ScopeStore,
    TokenHandleStore,
};

/// Clients keyed by `client_id`
#[derive(Debug, Default)]
pub struct InMemoryClientStore {
    clients: DashMap<String, Client>,
}

impl InMemoryClientStore {
    pub fn new(clients: impl IntoIterator<Item = Client>) -> Self {
        Self {
            clients: clients
                .into_iter()
                .map(|c| (c.client_id.clone(), c))
                .collect(),
        }
    }
}

#[async_trait]
impl ClientStore for InMemoryClientStore {
    async fn find_client_by_id(&self, client_id: &str) -> Result<Option<Client>> {
        Ok(self.clients.get(client_id).map(|entry| entry.value().clone()))
    }
}

/// Fixed scope catalog, in insertion order
#[derive(Debug, Default)]
pub struct InMemoryScopeStore {
    scopes: Vec<Scope>,
}

impl InMemoryScopeStore {
    pub fn new(scopes: impl IntoIterator<Item = Scope>) -> Self {
        Self {
            scopes: scopes.into_iter().collect(),
        }
    }
}

#[async_trait]
impl ScopeStore for InMemoryScopeStore {
    async fn get_scopes(&self, public_only: bool) -> Result<Vec<Scope>> {
        Ok(self
            .scopes
            .iter()
            .filter(|s| !public_only || s.show_in_discovery_document)
            .cloned()
            .collect())
    }
}

/// Authorization codes keyed by code value
///
/// `get_and_remove` is a single `DashMap::remove`, so concurrent
/// redemptions of one code yield it exactly once.
#[derive(Debug, Default)]
pub struct InMemoryAuthorizationCodeStore {
    codes: DashMap<String, AuthorizationCode>,
}

impl InMemoryAuthorizationCodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

#[async_trait]
impl AuthorizationCodeStore for InMemoryAuthorizationCodeStore {
    async fn store(&self, key: &str, code: AuthorizationCode) -> Result<()> {
        self.codes.insert(key.to_string(), code);
        Ok(())
    }

    async fn get_and_remove(&self, key: &str) -> Result<Option<AuthorizationCode>> {
        Ok(self.codes.remove(key).map(|(_, code)| code))
    }
}

/// Reference tokens keyed by handle
#[derive(Debug, Default)]
pub struct InMemoryTokenHandleStore {
    tokens: DashMap<String, Token>,
}

impl InMemoryTokenHandleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenHandleStore for InMemoryTokenHandleStore {
    async fn store(&self, handle: &str, token: Token) -> Result<()> {
        self.tokens.insert(handle.to_string(), token);
        Ok(())
    }

    async fn get(&self, handle: &str) -> Result<Option<Token>> {
        Ok(self.tokens.get(handle).map(|entry| entry.value().clone()))
    }

    async fn remove(&self, handle: &str) -> Result<()> {
        self.tokens.remove(handle);
        Ok(())
    }
}

/// Refresh tokens keyed by handle
#[derive(Debug, Default)]
pub struct InMemoryRefreshTokenStore {
    tokens: DashMap<String, RefreshToken>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn store(&self, handle: &str, token: RefreshToken) -> Result<()> {
        self.tokens.insert(handle.to_string(), token);
        Ok(())
    }

    async fn get(&self, handle: &str) -> Result<Option<RefreshToken>> {
        Ok(self.tokens.get(handle).map(|entry| entry.value().clone()))
    }

    async fn remove(&self, handle: &str) -> Result<Option<RefreshToken>> {
        Ok(self.tokens.remove(handle).map(|(_, token)| token))
    }

    async fn revoke_all(&self, subject: &str, client_id: &str) -> Result<usize> {
        let before = self.tokens.len();
        self.tokens.retain(|_, token| {
            !(token.subject_id() == Some(subject) && token.client_id() == client_id)
        });
        Ok(before.saturating_sub(self.tokens.len()))
    }
}

/// Remembered consents keyed by (subject, client)
#[derive(Debug, Default)]
pub struct InMemoryConsentStore {
    consents: DashMap<(String, String), Consent>,
}

impl InMemoryConsentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConsentStore for InMemoryConsentStore {
    async fn load(&self, subject: &str, client_id: &str) -> Result<Option<Consent>> {
        let key = (subject.to_string(), client_id.to_string());
        Ok(self.consents.get(&key).map(|entry| entry.value().clone()))
    }

    async fn update(&self, consent: Consent) -> Result<()> {
        let key = (consent.subject.clone(), consent.client_id.clone());
        if consent.scopes.is_empty() {
            self.consents.remove(&key);
        } else {
            self.consents.insert(key, consent);
        }
        Ok(())
    }

    async fn revoke(&self, subject: &str, client_id: &str) -> Result<()> {
        self.consents
            .remove(&(subject.to_string(), client_id.to_string()));
        Ok(())
    }
}

/// A user record for [`InMemoryUserService`]
#[derive(Debug, Clone)]
pub struct TestUser {
    pub subject: String,
    pub username: String,
    pub password: String,
    pub enabled: bool,
    pub claims: Vec<Claim>,
}

impl TestUser {
    pub fn new(
        subject: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            username: username.into(),
            password: password.into(),
            enabled: true,
            claims: Vec::new(),
        }
    }

    pub fn with_claim(
        mut self,
        claim_type: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.claims.push(Claim::new(claim_type, value));
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Username/password directory over a fixed user list
#[derive(Debug, Clone)]
pub struct InMemoryUserService {
    users: Arc<Vec<TestUser>>,
    identity_provider: String,
}

impl InMemoryUserService {
    pub fn new(users: Vec<TestUser>) -> Self {
        Self {
            users: Arc::new(users),
            identity_provider: "idsrv".to_string(),
        }
    }

    /// Identity provider name stamped on authenticated users
    pub fn with_identity_provider(mut self, idp: impl Into<String>) -> Self {
        self.identity_provider = idp.into();
        self
    }

    fn find(&self, subject: &str) -> Option<&TestUser> {
        self.users.iter().find(|u| u.subject == subject)
    }
}

#[async_trait]
impl UserService for InMemoryUserService {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
        _parameters: &Parameters,
    ) -> Result<Option<AuthenticatedUser>> {
        let user = self.users.iter().find(|u| {
            u.enabled
                && u.username == username
                && bool::from(u.password.as_bytes().ct_eq(password.as_bytes()))
        });

        Ok(user.map(|u| {
            let name = u
                .claims
                .iter()
                .find(|c| c.claim_type == "name")
                .and_then(Claim::as_str)
                .unwrap_or(u.username.as_str())
                .to_string();
            AuthenticatedUser::new(u.subject.clone(), self.identity_provider.clone())
                .with_name(name)
                .with_authentication_method("password")
        }))
    }

    async fn get_profile_claims(
        &self,
        subject: &AuthenticatedUser,
        claim_types: &[String],
    ) -> Result<Vec<Claim>> {
        let Some(user) = self.find(&subject.subject_id) else {
            return Ok(Vec::new());
        };
        Ok(user
            .claims
            .iter()
            .filter(|c| claim_types.is_empty() || claim_types.contains(&c.claim_type))
            .cloned()
            .collect())
    }

    async fn is_active(&self, subject: &AuthenticatedUser) -> Result<bool> {
        Ok(self.find(&subject.subject_id).is_some_and(|u| u.enabled))
    }
}
