//! Presented-token validation for userinfo, introspection and end-session

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::audit::{AuditEvent, AuditLogger};
use crate::constants::access_token_audience;
use crate::error::{Error, ErrorCode, Result, ValidationError};
use crate::models::{Token, TokenKind, TokenMetadata};
use crate::services::TokenVerifier;
use crate::stores::TokenHandleStore;

/// Validates access and identity tokens in either form
///
/// A token containing `.` is treated as a JWT and checked by the
/// [`TokenVerifier`]; anything else is a reference handle looked up in the
/// [`TokenHandleStore`]. Lifetime is checked here for both forms.
#[derive(Debug, Clone)]
pub struct TokenValidator {
    handles: Arc<dyn TokenHandleStore>,
    verifier: Arc<dyn TokenVerifier>,
    issuer_uri: String,
    audit: AuditLogger,
}

impl TokenValidator {
    pub fn new(
        handles: Arc<dyn TokenHandleStore>,
        verifier: Arc<dyn TokenVerifier>,
        issuer_uri: impl Into<String>,
        audit: AuditLogger,
    ) -> Self {
        Self {
            handles,
            verifier,
            issuer_uri: issuer_uri.into(),
            audit,
        }
    }

    /// Validate an access token, optionally requiring a granted scope
    ///
    /// # Errors
    ///
    /// `invalid_token`, `expired_token` or `insufficient_scope`, or a store failure.
    pub async fn validate_access_token(
        &self,
        token: &str,
        expected_scope: Option<&str>,
    ) -> Result<Token> {
        let audience = access_token_audience(&self.issuer_uri);
        let token = self.resolve(token, TokenKind::Access, &audience).await?;

        if let Some(scope) = expected_scope
            && !token.scopes().iter().any(|s| s == scope)
        {
            return Err(self.fail(
                ErrorCode::InsufficientScope,
                format!("token lacks scope {scope}"),
            ));
        }
        Ok(token)
    }

    /// Validate an identity token issued to `client_id`
    ///
    /// Identity tokens are always self-contained.
    ///
    /// # Errors
    ///
    /// `invalid_token` for reference handles or tokens that fail verification.
    pub async fn validate_identity_token(&self, token: &str, client_id: &str) -> Result<Token> {
        if !is_jwt(token) {
            return Err(self.fail(ErrorCode::InvalidToken, "identity token is not a JWT"));
        }
        self.resolve(token, TokenKind::Identity, client_id).await
    }

    async fn resolve(&self, raw: &str, kind: TokenKind, audience: &str) -> Result<Token> {
        if raw.trim().is_empty() {
            return Err(self.fail(ErrorCode::InvalidToken, "token is missing"));
        }

        let token = if is_jwt(raw) {
            self.verifier
                .verify(raw, audience)
                .await?
                .ok_or_else(|| self.fail(ErrorCode::InvalidToken, "JWT verification failed"))?
        } else {
            let token = self
                .handles
                .get(raw)
                .await?
                .ok_or_else(|| self.fail(ErrorCode::InvalidToken, "unknown reference token"))?;
            if token.is_expired(Utc::now()) {
                self.handles.remove(raw).await?;
                return Err(self.fail(ErrorCode::ExpiredToken, "reference token expired"));
            }
            token
        };

        if token.kind != kind {
            return Err(self.fail(
                ErrorCode::InvalidToken,
                format!("expected {}, got {}", kind.as_str(), token.kind.as_str()),
            ));
        }

        if token.is_expired(Utc::now()) {
            return Err(self.fail(ErrorCode::ExpiredToken, "token expired"));
        }

        debug!(client_id = %token.client_id, kind = kind.as_str(), "Token validated");
        Ok(token)
    }

    fn fail(&self, code: ErrorCode, reason: impl Into<String>) -> Error {
        let reason = reason.into();
        warn!(error = %code, reason = %reason, "Token validation failed");
        self.audit.log(AuditEvent::TokenValidationFailed {
            error: code,
            reason: reason.clone(),
        });
        ValidationError::client(code).with_description(reason).into()
    }
}

fn is_jwt(token: &str) -> bool {
    token.contains('.')
}
