use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info};

use super::{InteractionResponse, SignInRequest};
use crate::audit::{AuditEvent, AuditLogger};
use crate::config::AuthenticationOptions;
use crate::constants::PromptMode;
use crate::error::{Error, ErrorCode, Result, ValidationError};
use crate::models::{AuthenticatedUser, UserConsent};
use crate::services::ConsentService;
use crate::validation::ValidatedAuthorizeRequest;

const EMPTY_CONSENT_MESSAGE: &str = "You must select at least one permission.";

/// Decides whether an authorize request needs a login or consent step
///
/// A pure decision per call: the host shows the requested page and calls
/// back with the new subject or the user's consent.
#[derive(Debug, Clone)]
pub struct InteractionResponseGenerator {
    consent: Arc<dyn ConsentService>,
    options: AuthenticationOptions,
    audit: AuditLogger,
}

impl InteractionResponseGenerator {
    pub fn new(
        consent: Arc<dyn ConsentService>,
        options: AuthenticationOptions,
        audit: AuditLogger,
    ) -> Self {
        Self {
            consent,
            options,
            audit,
        }
    }

    /// Login phase, then consent phase
    ///
    /// # Errors
    ///
    /// Returns an error if the consent service fails. Protocol outcomes such
    /// as `login_required` come back as [`InteractionResponse::Error`].
    pub async fn process(
        &self,
        request: ValidatedAuthorizeRequest,
        consent: Option<UserConsent>,
    ) -> Result<InteractionResponse> {
        match self.process_login(request) {
            InteractionResponse::Proceed(request) => self.process_consent(request, consent).await,
            other => Ok(other),
        }
    }

    /// Decide whether the subject must (re-)authenticate
    ///
    /// `prompt=login` and `prompt=select_account` force a login and are
    /// removed from the returned request so the next round does not loop.
    pub fn process_login(&self, request: ValidatedAuthorizeRequest) -> InteractionResponse {
        if matches!(
            request.prompt_mode,
            Some(PromptMode::Login) | Some(PromptMode::SelectAccount)
        ) {
            debug!(client_id = %request.client_id(), "Login forced by prompt");
            let request = request.without_prompt();
            let sign_in = SignInRequest::for_request(&request);
            return InteractionResponse::RequireLogin { request, sign_in };
        }

        let reason = match request.subject.user() {
            None => Some("subject is anonymous"),
            Some(user) => self.login_required_for(&request, user),
        };

        let Some(reason) = reason else {
            return InteractionResponse::Proceed(request);
        };

        if request.prompt_mode == Some(PromptMode::None) {
            let error = ValidationError::client(ErrorCode::LoginRequired).with_description(reason);
            return self.reject(request, error);
        }

        debug!(client_id = %request.client_id(), reason, "Login required");
        let sign_in = SignInRequest::for_request(&request);
        InteractionResponse::RequireLogin { request, sign_in }
    }

    fn login_required_for(
        &self,
        request: &ValidatedAuthorizeRequest,
        user: &AuthenticatedUser,
    ) -> Option<&'static str> {
        if let Some(max_age) = request.max_age {
            // An out-of-range max_age can never be exceeded
            let stale = i64::try_from(max_age)
                .ok()
                .and_then(Duration::try_seconds)
                .and_then(|max_age| user.auth_time.checked_add_signed(max_age))
                .is_some_and(|deadline| deadline < Utc::now());
            if stale {
                return Some("authentication is older than max_age");
            }
        }

        let client = &request.client;
        if !client.allows_identity_provider(&user.identity_provider) {
            return Some("identity provider not allowed for client");
        }

        if let Some(hint) = &request.idp_hint
            && *hint != user.identity_provider
        {
            return Some("request names a different identity provider");
        }

        let is_local = user.identity_provider == self.options.local_identity_provider;
        if is_local && (!self.options.enable_local_login || !client.enable_local_login) {
            return Some("local login is disabled");
        }

        None
    }

    /// Decide whether consent is needed and apply the user's answer
    ///
    /// # Errors
    ///
    /// [`Error::ContractViolation`] when called with `prompt=login` or
    /// `prompt=select_account` still set, or with an anonymous subject:
    /// the login phase must have run first.
    pub async fn process_consent(
        &self,
        request: ValidatedAuthorizeRequest,
        consent: Option<UserConsent>,
    ) -> Result<InteractionResponse> {
        if matches!(
            request.prompt_mode,
            Some(PromptMode::Login) | Some(PromptMode::SelectAccount)
        ) {
            return Err(Error::ContractViolation(
                "prompt=login/select_account must be handled by the login phase".to_string(),
            ));
        }

        let Some(user) = request.subject.user().cloned() else {
            return Err(Error::ContractViolation(
                "consent phase requires an authenticated subject".to_string(),
            ));
        };

        let requested = request.scopes.requested_scope_names();
        let consent_required = self
            .consent
            .requires_consent(&request.client, &user, &requested)
            .await?;

        if consent_required && request.prompt_mode == Some(PromptMode::None) {
            let error = ValidationError::client(ErrorCode::InteractionRequired)
                .with_description("consent required but prompt=none");
            return Ok(self.reject(request, error));
        }

        if request.prompt_mode != Some(PromptMode::Consent) && !consent_required {
            return Ok(InteractionResponse::Proceed(request));
        }

        let Some(consent) = consent else {
            return Ok(InteractionResponse::RequireConsent {
                request,
                validation_message: None,
            });
        };

        if !consent.granted {
            self.audit.log(AuditEvent::ConsentDenied {
                client_id: request.client.client_id.clone(),
                subject: user.subject_id.clone(),
            });
            let mut request = request;
            request.was_consent_shown = true;
            let error = ValidationError::client(ErrorCode::AccessDenied)
                .with_description("user denied consent");
            return Ok(self.reject(request, error));
        }

        if consent.scopes.is_empty() {
            return Ok(InteractionResponse::RequireConsent {
                request,
                validation_message: Some(EMPTY_CONSENT_MESSAGE.to_string()),
            });
        }

        let request = request.with_consented_scopes(&consent.scopes);
        if request.scopes.granted_scopes.is_empty() {
            return Ok(InteractionResponse::RequireConsent {
                request,
                validation_message: Some(EMPTY_CONSENT_MESSAGE.to_string()),
            });
        }

        let granted = request.scopes.granted_scope_names();
        let remembered = request.client.allow_remember_consent && consent.remember;
        if request.client.allow_remember_consent {
            let to_remember: &[String] = if consent.remember { &granted } else { &[] };
            self.consent
                .update_consent(&request.client, &user, to_remember)
                .await?;
        }

        info!(
            client_id = %request.client_id(),
            scopes = %granted.join(" "),
            remembered,
            "Consent granted"
        );
        self.audit.log(AuditEvent::ConsentGranted {
            client_id: request.client.client_id.clone(),
            subject: user.subject_id.clone(),
            scopes: granted,
            remembered,
        });

        Ok(InteractionResponse::Proceed(request))
    }

    fn reject(
        &self,
        request: ValidatedAuthorizeRequest,
        error: ValidationError,
    ) -> InteractionResponse {
        self.audit.log(AuditEvent::AuthorizeRequestRejected {
            client_id: Some(request.client.client_id.clone()),
            error: error.code,
            error_type: error.error_type,
            reason: error.description.clone().unwrap_or_default(),
        });
        InteractionResponse::Error { request, error }
    }
}
