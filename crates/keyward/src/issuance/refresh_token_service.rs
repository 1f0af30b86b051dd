use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::new_handle;
use crate::audit::{AuditEvent, AuditLogger};
use crate::error::{ErrorCode, Result, ValidationError};
use crate::models::{
    Client, RefreshToken, RefreshTokenPolicy, Token, TokenExpiration, TokenMetadata, TokenUsage,
};
use crate::stores::RefreshTokenStore;

/// Lifetime after a sliding renewal, `elapsed` seconds after issuance
///
/// Never exceeds the absolute ceiling measured from original issuance.
pub fn renewed_lifetime(policy: &RefreshTokenPolicy, elapsed: u64) -> u32 {
    let extended = elapsed.saturating_add(u64::from(policy.sliding_lifetime));
    let capped = extended.min(u64::from(policy.absolute_lifetime));
    u32::try_from(capped).unwrap_or(policy.absolute_lifetime)
}

/// Result of using a refresh token
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshTokenRotation {
    pub old_handle: String,
    /// Equal to `old_handle` under [`TokenUsage::ReUse`]
    pub new_handle: String,
    pub token: RefreshToken,
}

impl RefreshTokenRotation {
    pub fn is_rotated(&self) -> bool {
        self.old_handle != self.new_handle
    }
}

/// Creates, rotates and revokes refresh tokens
#[derive(Debug, Clone)]
pub struct RefreshTokenService {
    store: Arc<dyn RefreshTokenStore>,
    audit: AuditLogger,
}

impl RefreshTokenService {
    pub fn new(store: Arc<dyn RefreshTokenStore>, audit: AuditLogger) -> Self {
        Self { store, audit }
    }

    /// Store a refresh token for `access_token` and return its handle
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn create(&self, access_token: &Token, client: &Client) -> Result<String> {
        let policy = client.refresh_token_policy();
        let lifetime = match policy.expiration {
            TokenExpiration::Sliding => policy.sliding_lifetime,
            TokenExpiration::Absolute => policy.absolute_lifetime,
        };

        let token = RefreshToken {
            access_token: access_token.clone(),
            creation_time: Utc::now(),
            lifetime,
            policy,
            version: 1,
        };

        let handle = new_handle();
        self.store.store(&handle, token).await?;
        debug!(client_id = %client.client_id, lifetime, "Created refresh token");
        Ok(handle)
    }

    /// Apply the issuance-time policy to a used refresh token
    ///
    /// One-time-only tokens get a new handle. The new handle is stored first
    /// and the old one removed after, so a concurrent use of the same handle
    /// fails. Sliding tokens get their lifetime extended, capped at the
    /// absolute ceiling.
    ///
    /// # Errors
    ///
    /// [`ErrorCode::InvalidGrant`] when a one-time-only handle was already
    /// used, or a store failure.
    pub async fn update(
        &self,
        handle: &str,
        token: RefreshToken,
        access_token: Token,
    ) -> Result<RefreshTokenRotation> {
        self.update_at(handle, token, access_token, Utc::now()).await
    }

    pub(crate) async fn update_at(
        &self,
        handle: &str,
        mut token: RefreshToken,
        access_token: Token,
        now: DateTime<Utc>,
    ) -> Result<RefreshTokenRotation> {
        let new_handle = match token.policy.usage {
            TokenUsage::OneTimeOnly => new_handle(),
            TokenUsage::ReUse => handle.to_string(),
        };

        if token.policy.expiration == TokenExpiration::Sliding {
            let elapsed = u64::try_from((now - token.creation_time).num_seconds()).unwrap_or(0);
            token.lifetime = renewed_lifetime(&token.policy, elapsed);
        }

        token.access_token = access_token;
        token.version = token.version.saturating_add(1);
        self.store.store(&new_handle, token.clone()).await?;

        // Only the caller whose removal finds the old handle keeps its rotation
        if new_handle != handle && self.store.remove(handle).await?.is_none() {
            self.store.remove(&new_handle).await?;
            warn!(client_id = %token.client_id(), "Refresh token already used");
            self.audit.log(AuditEvent::RefreshTokenRejected {
                client_id: token.client_id().to_string(),
                handle: handle.to_string(),
                reason: "refresh token already used".to_string(),
            });
            return Err(ValidationError::client(ErrorCode::InvalidGrant)
                .with_description("refresh token already used")
                .into());
        }

        info!(
            client_id = %token.client_id(),
            version = token.version,
            rotated = new_handle != handle,
            "Refresh token used"
        );
        self.audit.log(AuditEvent::RefreshTokenRotated {
            client_id: token.client_id().to_string(),
            subject: token.subject_id().map(str::to_string),
            old_handle: handle.to_string(),
            new_handle: new_handle.clone(),
            version: token.version,
        });

        Ok(RefreshTokenRotation {
            old_handle: handle.to_string(),
            new_handle,
            token,
        })
    }

    /// Remove every refresh token of `subject` for `client_id`
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn revoke_all(&self, subject: &str, client_id: &str) -> Result<usize> {
        let removed = self.store.revoke_all(subject, client_id).await?;
        info!(subject, client_id, removed, "Revoked refresh tokens");
        Ok(removed)
    }
}
