//! Login and consent decisions for validated authorize requests

mod generator;

pub use generator::InteractionResponseGenerator;

use serde::{Deserialize, Serialize};

use crate::constants::DisplayMode;
use crate::error::ValidationError;
use crate::validation::ValidatedAuthorizeRequest;

/// What the host's login page needs to know
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInRequest {
    pub client_id: String,
    /// Identity provider the client asked for via `acr_values=idp:`
    pub idp_hint: Option<String>,
    pub login_hint: Option<String>,
    pub acr_values: Vec<String>,
    pub ui_locales: Option<String>,
    pub display_mode: Option<DisplayMode>,
}

impl SignInRequest {
    pub(crate) fn for_request(request: &ValidatedAuthorizeRequest) -> Self {
        Self {
            client_id: request.client.client_id.clone(),
            idp_hint: request.idp_hint.clone(),
            login_hint: request.login_hint.clone(),
            acr_values: request.acr_values.clone(),
            ui_locales: request.ui_locales.clone(),
            display_mode: request.display_mode,
        }
    }
}

/// Outcome of an interaction decision
#[derive(Debug, Clone)]
pub enum InteractionResponse {
    /// Nothing to ask; issue the response
    Proceed(ValidatedAuthorizeRequest),
    /// Show the login page, then re-run with the authenticated subject
    RequireLogin {
        request: ValidatedAuthorizeRequest,
        sign_in: SignInRequest,
    },
    /// Show the consent page, then re-run with the user's answer
    RequireConsent {
        request: ValidatedAuthorizeRequest,
        /// Shown when the previous answer could not be accepted
        validation_message: Option<String>,
    },
    /// Send an error to the client
    Error {
        request: ValidatedAuthorizeRequest,
        error: ValidationError,
    },
}

impl InteractionResponse {
    pub fn request(&self) -> &ValidatedAuthorizeRequest {
        match self {
            InteractionResponse::Proceed(request)
            | InteractionResponse::RequireLogin { request, .. }
            | InteractionResponse::RequireConsent { request, .. }
            | InteractionResponse::Error { request, .. } => request,
        }
    }

    pub fn into_request(self) -> ValidatedAuthorizeRequest {
        match self {
            InteractionResponse::Proceed(request)
            | InteractionResponse::RequireLogin { request, .. }
            | InteractionResponse::RequireConsent { request, .. }
            | InteractionResponse::Error { request, .. } => request,
        }
    }

    pub fn is_proceed(&self) -> bool {
        matches!(self, InteractionResponse::Proceed(_))
    }

    pub fn is_login(&self) -> bool {
        matches!(self, InteractionResponse::RequireLogin { .. })
    }

    pub fn is_consent(&self) -> bool {
        matches!(self, InteractionResponse::RequireConsent { .. })
    }

    pub fn error(&self) -> Option<&ValidationError> {
        match self {
            InteractionResponse::Error { error, .. } => Some(error),
            _ => None,
        }
    }
}
