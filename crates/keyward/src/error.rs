//! Error types for the keyward pipeline
//!
//! Two layers:
//!
//! - [`ValidationError`] is a protocol or policy outcome. It carries a wire
//!   [`ErrorCode`] and an [`ErrorType`] that tells the host whether it may
//!   redirect back to the client (`Client`) or must render a generic error
//!   page (`User`).
//! - [`Error`] is what every fallible operation returns. Validation outcomes
//!   are one variant; store, service and signing faults are opaque to the
//!   protocol and never mapped onto an OAuth error code.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;

/// Result type for keyward operations
pub type Result<T> = std::result::Result<T, Error>;

/// OAuth 2.0 / OpenID Connect error codes (RFC 6749 §4.1.2.1, §5.2,
/// RFC 6750 §3.1, OIDC Core §3.1.2.6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Missing, repeated or malformed parameter
    InvalidRequest,
    /// Client authentication failed
    InvalidClient,
    /// Authorization code, refresh token or assertion is invalid
    InvalidGrant,
    /// Client may not use this flow, grant or redirect URI
    UnauthorizedClient,
    /// Grant type is unknown or not enabled
    UnsupportedGrantType,
    /// Response type or response mode is not supported
    UnsupportedResponseType,
    /// Requested scope is unknown, disallowed or implausible
    InvalidScope,
    /// Resource owner denied the request
    AccessDenied,
    /// Unexpected condition on the server
    ServerError,
    /// The request needs user interaction but `prompt=none` forbids it
    InteractionRequired,
    /// The user must authenticate but `prompt=none` forbids it
    LoginRequired,
    /// The user must consent but `prompt=none` forbids it
    ConsentRequired,
    /// Presented token is unknown, malformed or of the wrong type
    InvalidToken,
    /// Presented token has expired
    ExpiredToken,
    /// Presented token lacks a required scope
    InsufficientScope,
}

impl ErrorCode {
    /// Wire representation of the error code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::InvalidClient => "invalid_client",
            ErrorCode::InvalidGrant => "invalid_grant",
            ErrorCode::UnauthorizedClient => "unauthorized_client",
            ErrorCode::UnsupportedGrantType => "unsupported_grant_type",
            ErrorCode::UnsupportedResponseType => "unsupported_response_type",
            ErrorCode::InvalidScope => "invalid_scope",
            ErrorCode::AccessDenied => "access_denied",
            ErrorCode::ServerError => "server_error",
            ErrorCode::InteractionRequired => "interaction_required",
            ErrorCode::LoginRequired => "login_required",
            ErrorCode::ConsentRequired => "consent_required",
            ErrorCode::InvalidToken => "invalid_token",
            ErrorCode::ExpiredToken => "expired_token",
            ErrorCode::InsufficientScope => "insufficient_scope",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who a validation failure is reported to.
///
/// This classification, not the error string, drives transport behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    /// Safe to redirect back to the client's (verified) redirect URI
    Client,
    /// The redirect URI cannot be trusted; show a generic error page
    User,
}

/// Protocol or policy failure produced by a validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Wire error code
    pub code: ErrorCode,
    /// Redirect-vs-error-page classification
    pub error_type: ErrorType,
    /// Internal detail for logs; hosts may choose not to expose it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ValidationError {
    /// Create a validation error without description
    pub fn new(code: ErrorCode, error_type: ErrorType) -> Self {
        Self {
            code,
            error_type,
            description: None,
        }
    }

    /// Attach an internal description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Client-classified error
    pub fn client(code: ErrorCode) -> Self {
        Self::new(code, ErrorType::Client)
    }

    /// User-classified error
    pub fn user(code: ErrorCode) -> Self {
        Self::new(code, ErrorType::User)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{} ({:?}): {}", self.code, self.error_type, description),
            None => write!(f, "{} ({:?})", self.code, self.error_type),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Crate error
#[derive(Debug, Error)]
pub enum Error {
    /// The request failed protocol or policy validation
    #[error("validation failed: {0}")]
    Validation(ValidationError),

    /// A store collaborator failed
    #[error("store failure: {0}")]
    Store(String),

    /// A service collaborator (user service, claims provider, grant validator) failed
    #[error("service failure: {0}")]
    Service(String),

    /// Token signing or verification key material failed
    #[error("signing failure: {0}")]
    Signing(String),

    /// A caller broke a pipeline contract (programming error)
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// Configuration could not be loaded or is inconsistent
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Shorthand for a validation error
    pub fn validation(code: ErrorCode, error_type: ErrorType) -> Self {
        Error::Validation(ValidationError::new(code, error_type))
    }

    /// Wire error code, if this is a validation outcome
    pub fn code(&self) -> Option<ErrorCode> {
        self.as_validation().map(|e| e.code)
    }

    /// Error classification, if this is a validation outcome
    pub fn error_type(&self) -> Option<ErrorType> {
        self.as_validation().map(|e| e.error_type)
    }

    /// Borrow the validation outcome
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Error::Validation(e) => Some(e),
            _ => None,
        }
    }

    /// True when the failure is a protocol/policy outcome rather than a fault
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Metrics/logging category
    pub fn category(&self) -> &'static str {
        match self {
            Error::Validation(e) => e.code.as_str(),
            Error::Store(_) => "store",
            Error::Service(_) => "service",
            Error::Signing(_) => "signing",
            Error::ContractViolation(_) => "contract_violation",
            Error::Config(_) => "config",
        }
    }
}

impl From<ValidationError> for Error {
    fn from(error: ValidationError) -> Self {
        Error::Validation(error)
    }
}
