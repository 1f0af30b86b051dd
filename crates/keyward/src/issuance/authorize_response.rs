use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::new_handle;
use super::token_service::{IdentityTokenRequest, TokenService};
use crate::audit::{AuditEvent, AuditLogger};
use crate::constants::{BEARER_TOKEN_TYPE, ResponseMode, ResponseType, params};
use crate::error::{Error, Result};
use crate::models::{AuthenticatedUser, AuthorizationCode, Parameters};
use crate::stores::AuthorizationCodeStore;
use crate::validation::ValidatedAuthorizeRequest;

/// Front-channel authorization response
///
/// Session-less: everything the client needs is in these fields, the host
/// only chooses how to deliver them per `response_mode`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizeResponse {
    pub redirect_uri: String,
    pub response_mode: ResponseMode,
    pub code: Option<String>,
    pub identity_token: Option<String>,
    pub access_token: Option<String>,
    /// Seconds; set with `access_token`
    pub access_token_lifetime: Option<u32>,
    /// Granted scopes; set with `access_token`
    pub scope: Option<String>,
    pub state: Option<String>,
}

impl AuthorizeResponse {
    /// Response parameters as sent to the client
    pub fn to_parameters(&self) -> Parameters {
        let mut out = Parameters::new();
        if let Some(code) = &self.code {
            out.insert(params::CODE, code.as_str());
        }
        if let Some(id_token) = &self.identity_token {
            out.insert("id_token", id_token.as_str());
        }
        if let Some(access_token) = &self.access_token {
            out.insert("access_token", access_token.as_str());
            out.insert("token_type", BEARER_TOKEN_TYPE);
        }
        if let Some(lifetime) = self.access_token_lifetime {
            out.insert("expires_in", lifetime.to_string());
        }
        if let Some(scope) = &self.scope {
            out.insert(params::SCOPE, scope.as_str());
        }
        if let Some(state) = &self.state {
            out.insert(params::STATE, state.as_str());
        }
        out
    }

    /// Redirect target carrying the parameters in the query or fragment
    ///
    /// For `form_post` the bare redirect URI is returned; the host posts
    /// [`to_parameters`](Self::to_parameters) to it.
    ///
    /// # Errors
    ///
    /// A contract violation if the redirect URI does not parse.
    pub fn redirect_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.redirect_uri).map_err(|e| {
            Error::ContractViolation(format!("validated redirect_uri does not parse: {e}"))
        })?;
        let parameters = self.to_parameters();
        match self.response_mode {
            ResponseMode::Query => {
                url.query_pairs_mut().extend_pairs(parameters.iter());
            }
            ResponseMode::Fragment => {
                let fragment = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(parameters.iter())
                    .finish();
                url.set_fragment(Some(&fragment));
            }
            ResponseMode::FormPost => {}
        }
        Ok(url)
    }
}

/// Issues codes and front-channel tokens for validated authorize requests
#[derive(Debug, Clone)]
pub struct AuthorizeResponseGenerator {
    tokens: TokenService,
    codes: Arc<dyn AuthorizationCodeStore>,
    audit: AuditLogger,
}

impl AuthorizeResponseGenerator {
    pub fn new(
        tokens: TokenService,
        codes: Arc<dyn AuthorizationCodeStore>,
        audit: AuditLogger,
    ) -> Self {
        Self {
            tokens,
            codes,
            audit,
        }
    }

    /// Build the response for a request that cleared interaction
    ///
    /// # Errors
    ///
    /// [`Error::ContractViolation`] if the subject is anonymous.
    pub async fn create_response(
        &self,
        request: &ValidatedAuthorizeRequest,
    ) -> Result<AuthorizeResponse> {
        let Some(subject) = request.subject.user() else {
            return Err(Error::ContractViolation(
                "authorize response requires an authenticated subject".to_string(),
            ));
        };

        let response_type = request.response_type;
        let code = if response_type.includes_code() {
            Some(self.create_code(request, subject).await?)
        } else {
            None
        };

        let (access_token, access_token_lifetime) = if response_type.includes_access_token() {
            let token = self
                .tokens
                .create_access_token(
                    Some(subject),
                    &request.client,
                    &request.scopes.granted_scopes,
                    &request.raw,
                )
                .await?;
            let lifetime = token.lifetime;
            let rendered = self.tokens.create_security_token(&token).await?;
            self.token_issued(request, subject, "access_token", lifetime);
            (Some(rendered), Some(lifetime))
        } else {
            (None, None)
        };

        let identity_token = if response_type.includes_identity_token() {
            let token = self
                .tokens
                .create_identity_token(IdentityTokenRequest {
                    subject,
                    client: &request.client,
                    scopes: &request.scopes.granted_scopes,
                    include_all_identity_claims: response_type == ResponseType::IdToken,
                    nonce: request.nonce.as_deref(),
                    access_token: access_token.as_deref(),
                    authorization_code: code.as_deref(),
                    parameters: &request.raw,
                })
                .await?;
            let lifetime = token.lifetime;
            let rendered = self.tokens.create_security_token(&token).await?;
            self.token_issued(request, subject, "id_token", lifetime);
            Some(rendered)
        } else {
            None
        };

        debug!(
            client_id = %request.client_id(),
            response_type = %response_type,
            response_mode = request.response_mode.as_str(),
            "Created authorize response"
        );

        Ok(AuthorizeResponse {
            redirect_uri: request.redirect_uri.clone(),
            response_mode: request.response_mode,
            scope: access_token
                .as_ref()
                .map(|_| request.scopes.granted_scope_string()),
            code,
            identity_token,
            access_token,
            access_token_lifetime,
            state: request.state.clone(),
        })
    }

    async fn create_code(
        &self,
        request: &ValidatedAuthorizeRequest,
        subject: &AuthenticatedUser,
    ) -> Result<String> {
        let code = AuthorizationCode {
            client_id: request.client.client_id.clone(),
            subject: subject.clone(),
            redirect_uri: request.redirect_uri.clone(),
            scopes: request.scopes.granted_scopes.clone(),
            is_open_id: request.is_open_id_request,
            nonce: request.nonce.clone(),
            was_consent_shown: request.was_consent_shown,
            creation_time: Utc::now(),
            lifetime: request.client.authorization_code_lifetime,
        };

        let handle = new_handle();
        self.codes.store(&handle, code).await?;
        self.audit.log(AuditEvent::AuthorizationCodeIssued {
            client_id: request.client.client_id.clone(),
            subject: subject.subject_id.clone(),
            code: handle.clone(),
            scopes: request.scopes.granted_scope_names(),
        });
        Ok(handle)
    }

    fn token_issued(
        &self,
        request: &ValidatedAuthorizeRequest,
        subject: &AuthenticatedUser,
        token_type: &str,
        expires_in: u32,
    ) {
        self.audit.log(AuditEvent::TokenIssued {
            client_id: request.client.client_id.clone(),
            subject: Some(subject.subject_id.clone()),
            token_type: token_type.to_string(),
            expires_in,
            scopes: request.scopes.granted_scope_names(),
        });
    }
}
