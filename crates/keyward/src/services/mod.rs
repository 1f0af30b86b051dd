//! Service contracts consumed by the pipeline, and their default implementations

mod claims;
mod consent;
mod signing;

pub use claims::DefaultClaimsProvider;
pub use consent::DefaultConsentService;
pub use signing::JwtTokenSigner;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{AuthenticatedUser, Claim, Client, Parameters, Scope, Token};

/// End-user directory
#[async_trait]
pub trait UserService: Send + Sync + std::fmt::Debug {
    /// Check a username/password pair; `None` means the credentials are wrong
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
        parameters: &Parameters,
    ) -> Result<Option<AuthenticatedUser>>;

    /// Profile claims of `subject` restricted to `claim_types`; an empty list asks for all
    async fn get_profile_claims(
        &self,
        subject: &AuthenticatedUser,
        claim_types: &[String],
    ) -> Result<Vec<Claim>>;

    /// Whether the subject may still receive tokens
    async fn is_active(&self, subject: &AuthenticatedUser) -> Result<bool>;
}

/// Consent policy
#[async_trait]
pub trait ConsentService: Send + Sync + std::fmt::Debug {
    /// Whether the subject must be asked before `scopes` are released to `client`
    async fn requires_consent(
        &self,
        client: &Client,
        subject: &AuthenticatedUser,
        scopes: &[String],
    ) -> Result<bool>;

    /// Remember the subject's decision
    async fn update_consent(
        &self,
        client: &Client,
        subject: &AuthenticatedUser,
        scopes: &[String],
    ) -> Result<()>;
}

/// Claim assembly for issued tokens
#[async_trait]
pub trait ClaimsProvider: Send + Sync + std::fmt::Debug {
    /// Claims for an identity token
    ///
    /// `include_all_identity_claims` is set when no access token accompanies
    /// the identity token, so it must carry the profile claims itself.
    async fn identity_token_claims(
        &self,
        subject: &AuthenticatedUser,
        client: &Client,
        scopes: &[Scope],
        include_all_identity_claims: bool,
        parameters: &Parameters,
    ) -> Result<Vec<Claim>>;

    /// Claims for an access token; `subject` is `None` for client-only grants
    async fn access_token_claims(
        &self,
        subject: Option<&AuthenticatedUser>,
        client: &Client,
        scopes: &[Scope],
        parameters: &Parameters,
    ) -> Result<Vec<Claim>>;
}

/// Produces the signed artifact of a token
#[async_trait]
pub trait TokenSigningService: Send + Sync + std::fmt::Debug {
    async fn sign(&self, token: &Token) -> Result<String>;
}

/// Verifies a self-contained token
///
/// Returns `None` when the signature, issuer or audience do not check out.
/// Lifetime is left to the caller so that expired and forged tokens can be
/// told apart.
#[async_trait]
pub trait TokenVerifier: Send + Sync + std::fmt::Debug {
    async fn verify(&self, jwt: &str, audience: &str) -> Result<Option<Token>>;
}

/// Validates an assertion grant (RFC 7521), e.g. JWT or SAML2 bearer
#[async_trait]
pub trait AssertionGrantValidator: Send + Sync + std::fmt::Debug {
    /// The `grant_type` URI this validator handles
    fn grant_type(&self) -> &str;

    /// Resolve the assertion to a subject; `None` rejects it
    async fn validate(
        &self,
        assertion: &str,
        client: &Client,
        parameters: &Parameters,
    ) -> Result<Option<AuthenticatedUser>>;
}

/// Validates a custom (extension) grant
#[async_trait]
pub trait CustomGrantValidator: Send + Sync + std::fmt::Debug {
    /// The `grant_type` value this validator handles
    fn grant_type(&self) -> &str;

    /// Resolve the request to a subject; `None` rejects it
    async fn validate(
        &self,
        client: &Client,
        parameters: &Parameters,
    ) -> Result<Option<AuthenticatedUser>>;
}
