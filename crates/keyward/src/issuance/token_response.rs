use serde::{Deserialize, Serialize};
use tracing::debug;

use super::refresh_token_service::RefreshTokenService;
use super::token_service::{IdentityTokenRequest, TokenService};
use crate::audit::{AuditEvent, AuditLogger};
use crate::constants::BEARER_TOKEN_TYPE;
use crate::error::{Error, Result};
use crate::models::{Token, TokenMetadata};
use crate::validation::{GrantType, ValidatedTokenRequest};

/// Token endpoint response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Seconds
    pub expires_in: u32,
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(rename = "id_token", skip_serializing_if = "Option::is_none")]
    pub identity_token: Option<String>,
    /// Space-delimited granted scopes
    pub scope: String,
}

/// Turns validated token requests into token responses
#[derive(Debug, Clone)]
pub struct TokenResponseGenerator {
    tokens: TokenService,
    refresh_tokens: RefreshTokenService,
    audit: AuditLogger,
}

impl TokenResponseGenerator {
    pub fn new(tokens: TokenService, refresh_tokens: RefreshTokenService, audit: AuditLogger) -> Self {
        Self {
            tokens,
            refresh_tokens,
            audit,
        }
    }

    /// Issue the tokens for a validated token request
    ///
    /// # Errors
    ///
    /// [`ErrorCode::InvalidGrant`](crate::error::ErrorCode::InvalidGrant) when a
    /// one-time-only refresh token was already used, a signing or store failure,
    /// or a contract violation when the request lacks what its grant needs.
    pub async fn process(&self, request: &ValidatedTokenRequest) -> Result<TokenResponse> {
        let response = match request.grant_type {
            GrantType::RefreshToken => self.process_refresh_token(request).await?,
            GrantType::AuthorizationCode => self.process_authorization_code(request).await?,
            _ => self.process_subject_grant(request).await?,
        };
        debug!(
            client_id = %request.client.client_id,
            grant_type = %request.grant_type,
            refresh = response.refresh_token.is_some(),
            "Created token response"
        );
        Ok(response)
    }

    /// Code grant: access token, identity token for OpenID codes, optional refresh token
    async fn process_authorization_code(&self, request: &ValidatedTokenRequest) -> Result<TokenResponse> {
        let Some(code) = &request.authorization_code else {
            return Err(Error::ContractViolation(
                "authorization code grant without a consumed code".to_string(),
            ));
        };

        let token = self
            .tokens
            .create_access_token(Some(&code.subject), &request.client, &code.scopes, &request.raw)
            .await?;
        let mut response = self.access_token_response(request, &token).await?;

        if code.is_open_id {
            let id_token = self
                .tokens
                .create_identity_token(IdentityTokenRequest {
                    subject: &code.subject,
                    client: &request.client,
                    scopes: &code.scopes,
                    include_all_identity_claims: false,
                    nonce: code.nonce.as_deref(),
                    access_token: Some(response.access_token.as_str()),
                    authorization_code: None,
                    parameters: &request.raw,
                })
                .await?;
            response.identity_token = Some(self.tokens.create_security_token(&id_token).await?);
            self.token_issued(&id_token, "id_token");
        }

        Ok(response)
    }

    /// Client credentials, password, assertion and custom grants
    async fn process_subject_grant(&self, request: &ValidatedTokenRequest) -> Result<TokenResponse> {
        let token = self
            .tokens
            .create_access_token(
                request.subject.as_ref(),
                &request.client,
                &request.scopes,
                &request.raw,
            )
            .await?;
        self.access_token_response(request, &token).await
    }

    async fn process_refresh_token(&self, request: &ValidatedTokenRequest) -> Result<TokenResponse> {
        let (Some(handle), Some(refresh_token)) =
            (&request.refresh_token_handle, &request.refresh_token)
        else {
            return Err(Error::ContractViolation(
                "refresh token grant without a resolved refresh token".to_string(),
            ));
        };

        let access_token = self
            .tokens
            .renew_access_token(&refresh_token.access_token, &request.client)?;

        // A lost rotation race must not leave a usable access token behind
        let rotation = self
            .refresh_tokens
            .update(handle, refresh_token.clone(), access_token.clone())
            .await?;

        let rendered = self.tokens.create_security_token(&access_token).await?;
        self.token_issued(&access_token, "access_token");

        Ok(TokenResponse {
            access_token: rendered,
            expires_in: access_token.lifetime,
            token_type: BEARER_TOKEN_TYPE.to_string(),
            refresh_token: Some(rotation.new_handle),
            identity_token: None,
            scope: access_token.scopes().join(" "),
        })
    }

    async fn access_token_response(
        &self,
        request: &ValidatedTokenRequest,
        token: &Token,
    ) -> Result<TokenResponse> {
        let access_token = self.tokens.create_security_token(token).await?;
        self.token_issued(token, "access_token");

        let refresh_token =
            if request.contains_offline_access() && request.client.flow.allows_refresh_tokens() {
                let handle = self.refresh_tokens.create(token, &request.client).await?;
                self.token_issued(token, "refresh_token");
                Some(handle)
            } else {
                None
            };

        Ok(TokenResponse {
            access_token,
            expires_in: token.lifetime,
            token_type: BEARER_TOKEN_TYPE.to_string(),
            refresh_token,
            identity_token: None,
            scope: token.scopes().join(" "),
        })
    }

    fn token_issued(&self, token: &Token, token_type: &str) {
        self.audit.log(AuditEvent::TokenIssued {
            client_id: token.client_id.clone(),
            subject: token.subject_id().map(str::to_string),
            token_type: token_type.to_string(),
            expires_in: token.lifetime,
            scopes: token.scopes(),
        });
    }
}
