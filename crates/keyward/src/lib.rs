//! # Keyward - OAuth 2.0 / OpenID Connect Authorization Server Core
//!
//! Turns raw, untrusted request parameters into authorization decisions and
//! security tokens. Hosting, persistence and key management stay outside:
//! the pipeline talks to them through the traits in [`stores`] and
//! [`services`].
//!
//! ## Pipeline
//!
//! ```text
//! /authorize: AuthorizeRequestValidator -> InteractionResponseGenerator -> AuthorizeResponseGenerator
//! /token:     ClientValidator -> TokenRequestValidator -> TokenResponseGenerator -> RefreshTokenService
//! ```
//!
//! ## Architecture
//!
//! - [`validation`] - authorize, client, scope, token-request and presented-token validators
//! - [`interaction`] - login and consent decisions
//! - [`issuance`] - identity, access and refresh tokens; authorization codes
//! - [`models`] - clients, scopes, subjects, tokens, request parameters
//! - [`stores`] / [`services`] - collaborator contracts and default services
//! - [`memory`] - `DashMap`-backed stores (`memory-store` feature)
//! - [`audit`] - structured audit events
//! - [`config`] - options loaded from files, environment or a builder
//!
//! Every failure is an [`Error`]. Protocol and policy outcomes are
//! [`Error::Validation`], carrying the wire [`ErrorCode`] and the
//! [`ErrorType`] that decides whether the host may redirect to the client.
//!
//! ## Quick Start
//!
//! ```rust
//! use keyward::models::Parameters;
//! use keyward::{ErrorCode, ErrorType};
//! # use std::sync::Arc;
//! # use keyward::audit::AuditLogger;
//! # use keyward::config::InputLengthLimits;
//! # use keyward::memory::{InMemoryClientStore, InMemoryScopeStore};
//! # use keyward::models::Scope;
//! # use keyward::validation::{AuthorizeRequestValidator, ScopeValidator};
//! # let validator = AuthorizeRequestValidator::new(
//! #     Arc::new(InMemoryClientStore::new(std::iter::empty::<keyward::models::Client>())),
//! #     ScopeValidator::new(Arc::new(InMemoryScopeStore::new(Scope::standard_scopes()))),
//! #     InputLengthLimits::default(),
//! #     AuditLogger::default(),
//! # );
//!
//! let params: Parameters = [
//!     ("client_id", "implicitclient"),
//!     ("redirect_uri", "https://client/cb"),
//!     ("response_type", "id_token"),
//!     ("scope", "openid"),
//! ]
//! .into_iter()
//! .collect();
//!
//! // OpenID implicit requests need a nonce
//! let err = validator.validate_protocol(params).unwrap_err();
//! assert_eq!(err.code(), Some(ErrorCode::InvalidRequest));
//! assert_eq!(err.error_type(), Some(ErrorType::Client));
//! ```
//!
//! ## Feature Flags
//!
//! - `memory-store` (default) - in-memory store and user service implementations
//!
//! ## Standards
//!
//! - **RFC 6749** - OAuth 2.0 Authorization Framework
//! - **RFC 7521** - Assertion Framework for OAuth 2.0 Client Authentication and Authorization Grants
//! - **OpenID Connect Core 1.0**

pub mod audit;
pub mod config;
pub mod constants;
pub mod error;
pub mod interaction;
pub mod issuance;
pub mod models;
pub mod services;
pub mod stores;
pub mod validation;

#[cfg(feature = "memory-store")]
pub mod memory;

#[doc(inline)]
pub use error::{Error, ErrorCode, ErrorType, Result, ValidationError};

#[doc(inline)]
pub use config::{ConfigError, KeywardOptions};

#[doc(inline)]
pub use interaction::{InteractionResponse, InteractionResponseGenerator};

#[doc(inline)]
pub use issuance::{
    AuthorizeResponse, AuthorizeResponseGenerator, RefreshTokenService, TokenResponse,
    TokenResponseGenerator, TokenService,
};

#[doc(inline)]
pub use validation::{
    AuthorizeRequestValidator, ClientValidator, ScopeValidator, TokenRequestValidator,
    TokenValidator, ValidatedAuthorizeRequest, ValidatedTokenRequest,
};
