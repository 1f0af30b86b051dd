//! Authorize request states
//!
//! [`AuthorizeRequest`] is the output of the protocol phase;
//! [`ValidatedAuthorizeRequest`] can only be built from it by the client
//! phase, so the phases cannot run out of order.

use crate::constants::{DisplayMode, PromptMode, ResponseMode, ResponseType};
use crate::models::{Client, Flow, Parameters, Subject};

use super::scope_validator::ValidatedScopes;

/// Protocol-valid authorize request, not yet bound to a client
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizeRequest {
    pub raw: Parameters,
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: ResponseType,
    pub flow: Flow,
    pub response_mode: ResponseMode,
    /// Requested scope names, trimmed and de-duplicated
    pub requested_scopes: Vec<String>,
    pub is_open_id_request: bool,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub ui_locales: Option<String>,
    pub login_hint: Option<String>,
    pub display_mode: Option<DisplayMode>,
    /// `acr_values` minus the `idp:` hint
    pub acr_values: Vec<String>,
    /// Identity provider named through `acr_values=idp:<name>`
    pub idp_hint: Option<String>,
    pub prompt_mode: Option<PromptMode>,
    /// Seconds
    pub max_age: Option<u64>,
}

/// Authorize request that passed both validation phases
#[derive(Debug, Clone)]
pub struct ValidatedAuthorizeRequest {
    pub raw: Parameters,
    pub client: Client,
    pub redirect_uri: String,
    pub response_type: ResponseType,
    pub flow: Flow,
    pub response_mode: ResponseMode,
    pub scopes: ValidatedScopes,
    pub is_open_id_request: bool,
    pub is_resource_request: bool,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub ui_locales: Option<String>,
    pub login_hint: Option<String>,
    pub display_mode: Option<DisplayMode>,
    pub acr_values: Vec<String>,
    pub idp_hint: Option<String>,
    pub prompt_mode: Option<PromptMode>,
    pub max_age: Option<u64>,
    pub subject: Subject,
    pub was_consent_shown: bool,
}

impl ValidatedAuthorizeRequest {
    pub(crate) fn from_protocol(
        request: AuthorizeRequest,
        client: Client,
        scopes: ValidatedScopes,
    ) -> Self {
        let AuthorizeRequest {
            raw,
            client_id: _,
            redirect_uri,
            response_type,
            flow,
            response_mode,
            requested_scopes: _,
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
        } = request;

        Self {
            raw,
            is_resource_request: scopes.contains_resource_scopes,
            client,
            redirect_uri,
            response_type,
            flow,
            response_mode,
            scopes,
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
            subject: Subject::Anonymous,
            was_consent_shown: false,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client.client_id
    }

    /// Attach the current principal
    #[must_use]
    pub fn with_subject(mut self, subject: Subject) -> Self {
        self.subject = subject;
        self
    }

    /// Same request without a `prompt`
    #[must_use]
    pub fn without_prompt(mut self) -> Self {
        self.prompt_mode = None;
        self.raw.remove(crate::constants::params::PROMPT);
        self
    }

    /// Same request with the grant narrowed to what the subject consented to
    #[must_use]
    pub fn with_consented_scopes(mut self, consented: &[String]) -> Self {
        self.scopes = self.scopes.with_consented_scopes(consented);
        self.is_resource_request = self.scopes.contains_resource_scopes;
        self.was_consent_shown = true;
        self
    }
}
