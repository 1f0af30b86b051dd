use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use super::new_handle;
use crate::constants::{access_token_audience, claim_types};
use crate::error::{Error, Result};
use crate::models::{
    AccessTokenType, AuthenticatedUser, Claim, Client, Parameters, Scope, Token, TokenKind,
};
use crate::services::{ClaimsProvider, TokenSigningService};
use crate::stores::TokenHandleStore;

/// `at_hash` / `c_hash`: base64url of the left half of SHA-256
pub fn left_half_hash(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2])
}

/// Inputs of an identity token
#[derive(Debug, Clone, Copy)]
pub struct IdentityTokenRequest<'a> {
    pub subject: &'a AuthenticatedUser,
    pub client: &'a Client,
    pub scopes: &'a [Scope],
    /// Set when no access token accompanies the identity token
    pub include_all_identity_claims: bool,
    pub nonce: Option<&'a str>,
    /// Issued access token, for `at_hash`
    pub access_token: Option<&'a str>,
    /// Issued authorization code, for `c_hash`
    pub authorization_code: Option<&'a str>,
    pub parameters: &'a Parameters,
}

/// Builds tokens and renders them as JWTs or reference handles
#[derive(Debug, Clone)]
pub struct TokenService {
    issuer_uri: String,
    claims: Arc<dyn ClaimsProvider>,
    handles: Arc<dyn TokenHandleStore>,
    signer: Arc<dyn TokenSigningService>,
}

impl TokenService {
    pub fn new(
        issuer_uri: impl Into<String>,
        claims: Arc<dyn ClaimsProvider>,
        handles: Arc<dyn TokenHandleStore>,
        signer: Arc<dyn TokenSigningService>,
    ) -> Self {
        Self {
            issuer_uri: issuer_uri.into(),
            claims,
            handles,
            signer,
        }
    }

    pub fn issuer_uri(&self) -> &str {
        &self.issuer_uri
    }

    /// Identity token for `request.client`, audience = client id
    ///
    /// # Errors
    ///
    /// Returns an error if the claims provider fails.
    pub async fn create_identity_token(&self, request: IdentityTokenRequest<'_>) -> Result<Token> {
        let client = request.client;
        let mut claims = self
            .claims
            .identity_token_claims(
                request.subject,
                client,
                request.scopes,
                request.include_all_identity_claims,
                request.parameters,
            )
            .await?;

        if let Some(nonce) = request.nonce {
            claims.push(Claim::new(claim_types::NONCE, nonce));
        }
        if let Some(access_token) = request.access_token {
            claims.push(Claim::new(
                claim_types::ACCESS_TOKEN_HASH,
                left_half_hash(access_token),
            ));
        }
        if let Some(code) = request.authorization_code {
            claims.push(Claim::new(
                claim_types::AUTHORIZATION_CODE_HASH,
                left_half_hash(code),
            ));
        }

        let mut token = Token::new(
            TokenKind::Identity,
            client.client_id.clone(),
            self.issuer_uri.clone(),
            client.client_id.clone(),
            client.identity_token_lifetime,
        );
        token.claims = claims;
        debug!(client_id = %client.client_id, "Created identity token");
        Ok(token)
    }

    /// Access token for the resources audience; `subject` is `None` for client-only grants
    ///
    /// # Errors
    ///
    /// Returns an error if the claims provider fails.
    pub async fn create_access_token(
        &self,
        subject: Option<&AuthenticatedUser>,
        client: &Client,
        scopes: &[Scope],
        parameters: &Parameters,
    ) -> Result<Token> {
        let mut claims = self
            .claims
            .access_token_claims(subject, client, scopes, parameters)
            .await?;
        claims.push(Claim::new(claim_types::JWT_ID, Uuid::now_v7().to_string()));

        let mut token = Token::new(
            TokenKind::Access,
            client.client_id.clone(),
            self.issuer_uri.clone(),
            access_token_audience(&self.issuer_uri),
            client.access_token_lifetime,
        );
        token.access_token_type = client.access_token_type;
        token.claims = claims;
        debug!(client_id = %client.client_id, "Created access token");
        Ok(token)
    }

    /// Render `token` for the wire
    ///
    /// Identity tokens and JWT access tokens are signed; reference access
    /// tokens are stored under a fresh handle, which is returned.
    ///
    /// # Errors
    ///
    /// A signing failure, or a token handle store failure.
    pub async fn create_security_token(&self, token: &Token) -> Result<String> {
        match (token.kind, token.access_token_type) {
            (TokenKind::Identity, _) | (TokenKind::Access, AccessTokenType::Jwt) => {
                self.signer.sign(token).await
            }
            (TokenKind::Access, AccessTokenType::Reference) => {
                let handle = new_handle();
                self.handles.store(&handle, token.clone()).await?;
                debug!(client_id = %token.client_id, "Stored reference token");
                Ok(handle)
            }
        }
    }

    /// Copy of `token` with a fresh creation time and lifetime
    pub(crate) fn renew_access_token(&self, token: &Token, client: &Client) -> Result<Token> {
        if token.kind != TokenKind::Access {
            return Err(Error::ContractViolation(
                "only access tokens can be renewed".to_string(),
            ));
        }
        let mut renewed = token.clone();
        renewed.creation_time = chrono::Utc::now();
        renewed.lifetime = client.access_token_lifetime;
        renewed.access_token_type = client.access_token_type;
        renewed
            .claims
            .retain(|c| c.claim_type != claim_types::JWT_ID);
        renewed
            .claims
            .push(Claim::new(claim_types::JWT_ID, Uuid::now_v7().to_string()));
        Ok(renewed)
    }
}
