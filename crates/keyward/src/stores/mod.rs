//! Persistence contracts
//!
//! The pipeline only ever talks to these traits. Implementations decide
//! the storage engine; `crate::memory` provides `DashMap` backed ones.
//! Infrastructure faults are reported as [`crate::Error::Store`].

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{AuthorizationCode, Client, Consent, RefreshToken, Scope, Token};

/// Client directory
#[async_trait]
pub trait ClientStore: Send + Sync + std::fmt::Debug {
    /// Resolve a client by identifier
    async fn find_client_by_id(&self, client_id: &str) -> Result<Option<Client>>;
}

/// Scope catalog
#[async_trait]
pub trait ScopeStore: Send + Sync + std::fmt::Debug {
    /// Every scope; with `public_only`, only those shown in discovery
    async fn get_scopes(&self, public_only: bool) -> Result<Vec<Scope>>;

    /// Scopes with the given names, in catalog order; unknown names are skipped
    async fn find_scopes(&self, names: &[String]) -> Result<Vec<Scope>> {
        let scopes = self.get_scopes(false).await?;
        Ok(scopes
            .into_iter()
            .filter(|scope| names.iter().any(|name| *name == scope.name))
            .collect())
    }
}

/// Authorization code storage
///
/// `get_and_remove` must be atomic: of any number of concurrent calls for
/// the same key, at most one returns the code.
#[async_trait]
pub trait AuthorizationCodeStore: Send + Sync + std::fmt::Debug {
    async fn store(&self, key: &str, code: AuthorizationCode) -> Result<()>;

    /// Fetch and invalidate in one step
    async fn get_and_remove(&self, key: &str) -> Result<Option<AuthorizationCode>>;
}

/// Reference access token storage
#[async_trait]
pub trait TokenHandleStore: Send + Sync + std::fmt::Debug {
    async fn store(&self, handle: &str, token: Token) -> Result<()>;

    async fn get(&self, handle: &str) -> Result<Option<Token>>;

    async fn remove(&self, handle: &str) -> Result<()>;
}

/// Refresh token storage
///
/// A `store` for an existing handle replaces the record and must be
/// visible to subsequent `get` calls before it returns.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync + std::fmt::Debug {
    async fn store(&self, handle: &str, token: RefreshToken) -> Result<()>;

    async fn get(&self, handle: &str) -> Result<Option<RefreshToken>>;

    /// Atomically remove and return the token; `None` if another caller took it first
    async fn remove(&self, handle: &str) -> Result<Option<RefreshToken>>;

    /// Remove every refresh token of `subject` for `client_id`; returns the count removed
    async fn revoke_all(&self, subject: &str, client_id: &str) -> Result<usize>;
}

/// Remembered consent storage
#[async_trait]
pub trait ConsentStore: Send + Sync + std::fmt::Debug {
    async fn load(&self, subject: &str, client_id: &str) -> Result<Option<Consent>>;

    /// Insert or replace; a consent without scopes removes the record
    async fn update(&self, consent: Consent) -> Result<()>;

    async fn revoke(&self, subject: &str, client_id: &str) -> Result<()>;
}
