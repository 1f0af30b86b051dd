//! `/authorize` request validation
//!
//! Two phases, run in order:
//!
//! 1. [`AuthorizeRequestValidator::validate_protocol`] checks syntax and
//!    supported values without touching any store.
//! 2. [`AuthorizeRequestValidator::validate_client`] resolves the client and
//!    scopes and applies client policy.
//!
//! Errors classified [`ErrorType::User`] must not be redirected to the
//! requested redirect URI: it has not been verified at that point.

use std::sync::Arc;

use tracing::{debug, warn};

use super::authorize_request::{AuthorizeRequest, ValidatedAuthorizeRequest};
use super::scope_validator::{ScopeValidator, first_disallowed, parse_scopes};
use crate::audit::{AuditEvent, AuditLogger};
use crate::config::InputLengthLimits;
use crate::constants::{
    DisplayMode, IDP_ACR_PREFIX, OFFLINE_ACCESS_SCOPE, OPENID_SCOPE, PromptMode, ResponseMode,
    ResponseType, params,
};
use crate::error::{Error, ErrorCode, ErrorType, Result, ValidationError};
use crate::models::{Flow, Parameters, Subject};
use crate::stores::ClientStore;

/// Validates authorize requests
#[derive(Debug, Clone)]
pub struct AuthorizeRequestValidator {
    clients: Arc<dyn ClientStore>,
    scopes: ScopeValidator,
    limits: InputLengthLimits,
    audit: AuditLogger,
}

impl AuthorizeRequestValidator {
    pub fn new(
        clients: Arc<dyn ClientStore>,
        scopes: ScopeValidator,
        limits: InputLengthLimits,
        audit: AuditLogger,
    ) -> Self {
        Self {
            clients,
            scopes,
            limits,
            audit,
        }
    }

    /// Run both phases and attach `subject`
    ///
    /// # Errors
    ///
    /// Any error of [`validate_protocol`](Self::validate_protocol) or
    /// [`validate_client`](Self::validate_client).
    pub async fn validate(
        &self,
        parameters: Parameters,
        subject: Subject,
    ) -> Result<ValidatedAuthorizeRequest> {
        let request = self.validate_protocol(parameters)?;
        let validated = self.validate_client(request).await?;
        Ok(validated.with_subject(subject))
    }

    /// Protocol phase: parameter syntax and supported values only
    ///
    /// # Errors
    ///
    /// User-type errors for a missing `client_id` or unusable `redirect_uri`;
    /// client-type errors for everything else.
    pub fn validate_protocol(&self, parameters: Parameters) -> Result<AuthorizeRequest> {
        let client_id = parameters.get(params::CLIENT_ID).map(str::to_string);
        self.check_protocol(parameters)
            .map_err(|error| self.rejected(client_id.as_deref(), error))
    }

    /// Client phase: client, redirect URI, flow and scope policy
    ///
    /// # Errors
    ///
    /// `unauthorized_client` (User) for an unknown client, unregistered
    /// redirect URI, flow mismatch or disallowed scope; `invalid_scope`
    /// (Client) for unknown scopes or an implausible scope set; or a store failure.
    pub async fn validate_client(
        &self,
        request: AuthorizeRequest,
    ) -> Result<ValidatedAuthorizeRequest> {
        let client_id = request.client_id.clone();
        match self.check_client(request).await {
            Ok(validated) => Ok(validated),
            Err(Error::Validation(error)) => Err(self.rejected(Some(&client_id), error)),
            Err(fault) => Err(fault),
        }
    }

    fn rejected(&self, client_id: Option<&str>, error: ValidationError) -> Error {
        let reason = error.description.clone().unwrap_or_default();
        warn!(
            client_id = ?client_id,
            error = %error.code,
            error_type = ?error.error_type,
            reason = %reason,
            "Authorize request rejected"
        );
        self.audit.log(AuditEvent::AuthorizeRequestRejected {
            client_id: client_id.map(str::to_string),
            error: error.code,
            error_type: error.error_type,
            reason,
        });
        Error::Validation(error)
    }

    fn check_protocol(
        &self,
        parameters: Parameters,
    ) -> std::result::Result<AuthorizeRequest, ValidationError> {
        let limits = &self.limits;

        let client_id = required(&parameters, params::CLIENT_ID, limits.client_id)
            .map_err(|e| e.into_error(ErrorType::User))?;

        let redirect_uri = required(&parameters, params::REDIRECT_URI, limits.redirect_uri)
            .map_err(|e| e.into_error(ErrorType::User))?;
        if url::Url::parse(redirect_uri).is_err() {
            return Err(ValidationError::user(ErrorCode::InvalidRequest)
                .with_description("redirect_uri is not an absolute URI"));
        }

        let Some(raw_response_type) = parameters.get(params::RESPONSE_TYPE) else {
            return Err(ValidationError::client(ErrorCode::UnsupportedResponseType)
                .with_description("missing response_type"));
        };
        let Some(response_type) = ResponseType::parse(raw_response_type) else {
            return Err(ValidationError::client(ErrorCode::UnsupportedResponseType)
                .with_description(format!("unsupported response_type: {raw_response_type}")));
        };
        let flow = response_type.flow();

        let response_mode = match parameters.get(params::RESPONSE_MODE) {
            None => response_type.default_response_mode(),
            Some(raw) => match ResponseMode::parse(raw) {
                Some(mode) if mode.is_allowed_for(flow) => mode,
                _ => {
                    return Err(ValidationError::client(ErrorCode::UnsupportedResponseType)
                        .with_description(format!("response_mode {raw} is invalid for {response_type}")));
                }
            },
        };

        let scope = required(&parameters, params::SCOPE, limits.scope)
            .map_err(|e| e.into_error(ErrorType::Client))?;
        let requested_scopes = parse_scopes(scope);
        let is_open_id_request = requested_scopes.iter().any(|s| s == OPENID_SCOPE);

        // Pure code requests are judged once the client's scopes are known
        if response_type != ResponseType::Code {
            if is_open_id_request && !response_type.includes_identity_token() {
                return Err(ValidationError::client(ErrorCode::InvalidScope).with_description(
                    format!("OpenID request with response_type {response_type} lacks an id_token"),
                ));
            }
            if !is_open_id_request && response_type != ResponseType::Token {
                return Err(ValidationError::client(ErrorCode::InvalidScope).with_description(
                    format!("response_type {response_type} requires the openid scope"),
                ));
            }
        }

        if flow == Flow::Implicit && requested_scopes.iter().any(|s| s == OFFLINE_ACCESS_SCOPE) {
            return Err(ValidationError::client(ErrorCode::InvalidScope)
                .with_description("offline_access cannot be requested through the implicit flow"));
        }

        let state = optional(&parameters, params::STATE, limits.state)?;

        let nonce = optional(&parameters, params::NONCE, limits.nonce)?;
        if nonce.is_none() && is_open_id_request && matches!(flow, Flow::Implicit | Flow::Hybrid) {
            return Err(ValidationError::client(ErrorCode::InvalidRequest)
                .with_description("nonce is required for implicit and hybrid OpenID requests"));
        }

        let prompt_mode = parameters.get(params::PROMPT).and_then(|raw| {
            let parsed = PromptMode::parse(raw);
            if parsed.is_none() {
                debug!(prompt = %raw, "Ignoring unsupported prompt value");
            }
            parsed
        });

        let ui_locales = optional(&parameters, params::UI_LOCALES, limits.ui_locales)?;
        let display_mode = parameters.get(params::DISPLAY).and_then(DisplayMode::parse);

        let max_age = match parameters.get(params::MAX_AGE) {
            None => None,
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| {
                ValidationError::client(ErrorCode::InvalidRequest)
                    .with_description(format!("max_age is not a non-negative integer: {raw}"))
            })?),
        };

        let login_hint = optional(&parameters, params::LOGIN_HINT, limits.login_hint)?;

        let mut idp_hint = None;
        let mut acr_values = Vec::new();
        if let Some(raw) = optional(&parameters, params::ACR_VALUES, limits.acr_values)? {
            for value in raw.split_whitespace() {
                match value.strip_prefix(IDP_ACR_PREFIX) {
                    Some(idp) if !idp.is_empty() => idp_hint = Some(idp.to_string()),
                    _ => acr_values.push(value.to_string()),
                }
            }
        }

        debug!(
            client_id = %client_id,
            response_type = %response_type,
            flow = ?flow,
            "Authorize request passed protocol validation"
        );

        Ok(AuthorizeRequest {
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
            response_type,
            flow,
            response_mode,
            requested_scopes,
            is_open_id_request,
            state,
            nonce,
            ui_locales,
            login_hint,
            display_mode,
            acr_values,
            idp_hint,
            prompt_mode,
            max_age,
            raw: parameters,
        })
    }

    async fn check_client(&self, request: AuthorizeRequest) -> Result<ValidatedAuthorizeRequest> {
        let client = match self.clients.find_client_by_id(&request.client_id).await? {
            Some(client) if client.enabled => client,
            _ => {
                return Err(ValidationError::user(ErrorCode::UnauthorizedClient)
                    .with_description("unknown or disabled client")
                    .into());
            }
        };

        if !client.has_redirect_uri(&request.redirect_uri) {
            return Err(ValidationError::user(ErrorCode::UnauthorizedClient)
                .with_description(format!(
                    "redirect_uri not registered: {}",
                    request.redirect_uri
                ))
                .into());
        }

        if client.flow != request.flow {
            return Err(ValidationError::user(ErrorCode::UnauthorizedClient)
                .with_description(format!(
                    "client is configured for {:?}, request uses {:?}",
                    client.flow, request.flow
                ))
                .into());
        }

        if let Some(scope) = first_disallowed(&client, &request.requested_scopes) {
            return Err(ValidationError::user(ErrorCode::UnauthorizedClient)
                .with_description(format!("scope not allowed for client: {scope}"))
                .into());
        }

        let scopes = self.scopes.validate(&request.requested_scopes).await?;

        let requirement = request.response_type.scope_requirement();
        if !scopes.satisfies(requirement) {
            return Err(ValidationError::client(ErrorCode::InvalidScope)
                .with_description(format!(
                    "scopes do not fit response_type {}",
                    request.response_type
                ))
                .into());
        }

        debug!(
            client_id = %client.client_id,
            scopes = %scopes.granted_scope_string(),
            "Authorize request passed client validation"
        );
        Ok(ValidatedAuthorizeRequest::from_protocol(request, client, scopes))
    }
}

/// Why a required parameter was rejected
enum ParameterProblem {
    Missing(&'static str),
    TooLong(&'static str),
}

impl ParameterProblem {
    fn into_error(self, error_type: ErrorType) -> ValidationError {
        let description = match self {
            ParameterProblem::Missing(name) => format!("missing {name}"),
            ParameterProblem::TooLong(name) => format!("{name} too long"),
        };
        ValidationError::new(ErrorCode::InvalidRequest, error_type).with_description(description)
    }
}

fn required<'a>(
    parameters: &'a Parameters,
    name: &'static str,
    max_len: usize,
) -> std::result::Result<&'a str, ParameterProblem> {
    let value = parameters.get(name).ok_or(ParameterProblem::Missing(name))?;
    if value.len() > max_len {
        return Err(ParameterProblem::TooLong(name));
    }
    Ok(value)
}

/// Optional pass-through parameter; over-long values are `invalid_request` (Client)
fn optional(
    parameters: &Parameters,
    name: &'static str,
    max_len: usize,
) -> std::result::Result<Option<String>, ValidationError> {
    match parameters.get(name) {
        None => Ok(None),
        Some(value) if value.len() > max_len => {
            Err(ParameterProblem::TooLong(name).into_error(ErrorType::Client))
        }
        Some(value) => Ok(Some(value.to_string())),
    }
}
