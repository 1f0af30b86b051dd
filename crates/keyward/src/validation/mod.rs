//! Request validators
//!
//! Authorize and token requests arrive as raw [`Parameters`](crate::models::Parameters)
//! and leave as validated request values, or as a
//! [`ValidationError`](crate::error::ValidationError) carrying the OAuth error
//! code and its [`ErrorType`](crate::error::ErrorType).

mod authorize_request;
mod authorize_validator;
mod client_validator;
mod credential_parser;
mod scope_validator;
mod token_request;
mod token_request_validator;
mod token_validator;

pub use authorize_request::{AuthorizeRequest, ValidatedAuthorizeRequest};
pub use authorize_validator::AuthorizeRequestValidator;
pub use client_validator::ClientValidator;
pub use credential_parser::{
    ClientCertificate, ClientCredential, ClientCredentialParseResult, CredentialSource,
    parse_client_credentials,
};
pub use scope_validator::{ScopeValidator, ValidatedScopes, first_disallowed, parse_scopes};
pub use token_request::{GrantType, ValidatedTokenRequest};
pub use token_request_validator::TokenRequestValidator;
pub use token_validator::TokenValidator;
