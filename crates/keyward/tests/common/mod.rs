//! Common test utilities for integration tests
//!
//! Wires the whole pipeline over the in-memory stores with a fixed client
//! and scope catalog.

#![allow(dead_code)]

use std::sync::Arc;

use keyward::audit::AuditLogger;
use keyward::config::InputLengthLimits;
use keyward::interaction::InteractionResponse;
use keyward::memory::{
    InMemoryAuthorizationCodeStore, InMemoryClientStore, InMemoryConsentStore,
    InMemoryRefreshTokenStore, InMemoryScopeStore, InMemoryTokenHandleStore, InMemoryUserService,
    TestUser,
};
use keyward::models::{
    AccessTokenType, AuthenticatedUser, Client, ClientSecret, Flow, Parameters, Scope, Subject,
    TokenExpiration, TokenUsage, UserConsent,
};
use keyward::services::{DefaultClaimsProvider, DefaultConsentService, JwtTokenSigner};
use keyward::validation::{ClientCredentialParseResult, parse_client_credentials};
use keyward::{
    AuthorizeRequestValidator, AuthorizeResponse, AuthorizeResponseGenerator, ClientValidator,
    InteractionResponseGenerator, RefreshTokenService, Result, ScopeValidator,
    TokenRequestValidator, TokenResponse, TokenResponseGenerator, TokenService, TokenValidator,
};

pub const ISSUER: &str = "https://idsrv.test";
pub const SIGNING_KEY: &[u8] = b"integration-signing-key-0123456789";
pub const REDIRECT_URI: &str = "https://server/cb";
pub const SECRET: &str = "secret";

/// The registered clients
pub fn clients() -> Vec<Client> {
    let secret = || ClientSecret::sha256(SECRET);
    vec![
        Client::new("codeclient", Flow::AuthorizationCode)
            .with_secret(secret())
            .with_redirect_uri(REDIRECT_URI)
            .with_refresh_policy(TokenUsage::OneTimeOnly, TokenExpiration::Sliding),
        Client::new("reuseclient", Flow::AuthorizationCode)
            .with_secret(secret())
            .with_redirect_uri(REDIRECT_URI)
            .with_refresh_policy(TokenUsage::ReUse, TokenExpiration::Absolute)
            .without_consent(),
        Client::new("implicitclient", Flow::Implicit)
            .with_redirect_uri(REDIRECT_URI)
            .with_allowed_scopes(["openid", "profile", "email", "api1"]),
        Client::new("hybridclient", Flow::Hybrid)
            .with_secret(secret())
            .with_redirect_uri(REDIRECT_URI),
        Client::new("svcclient", Flow::ClientCredentials)
            .with_secret(secret())
            .with_allowed_scopes(["api1", "api2"])
            .with_access_token_type(AccessTokenType::Reference),
        Client::new("roclient", Flow::ResourceOwner).with_secret(secret()),
    ]
}

pub fn scopes() -> Vec<Scope> {
    let mut scopes = Scope::standard_scopes();
    scopes.push(Scope::resource("api1"));
    scopes.push(Scope::resource("api2"));
    scopes
}

pub fn users() -> Vec<TestUser> {
    vec![
        TestUser::new("818727", "alice", "alice")
            .with_claim("name", "Alice Smith")
            .with_claim("email", "alice@example.com"),
        TestUser::new("88421113", "bob", "bob").with_claim("name", "Bob Smith"),
    ]
}

/// Every component of the pipeline plus handles on the stores
pub struct TestServer {
    pub codes: Arc<InMemoryAuthorizationCodeStore>,
    pub refresh_tokens: Arc<InMemoryRefreshTokenStore>,
    pub handles: Arc<InMemoryTokenHandleStore>,
    pub consents: Arc<InMemoryConsentStore>,
    pub client_validator: ClientValidator,
    pub authorize_validator: AuthorizeRequestValidator,
    pub interaction: InteractionResponseGenerator,
    pub authorize_responses: AuthorizeResponseGenerator,
    pub token_requests: TokenRequestValidator,
    pub token_responses: TokenResponseGenerator,
    pub token_validator: TokenValidator,
    pub refresh_service: RefreshTokenService,
}

impl TestServer {
    pub fn new() -> Self {
        let audit = AuditLogger::new("keyward-tests");
        let clients = Arc::new(InMemoryClientStore::new(clients()));
        let scope_validator = ScopeValidator::new(Arc::new(InMemoryScopeStore::new(scopes())));
        let users = Arc::new(InMemoryUserService::new(users()));
        let codes = Arc::new(InMemoryAuthorizationCodeStore::new());
        let refresh_tokens = Arc::new(InMemoryRefreshTokenStore::new());
        let handles = Arc::new(InMemoryTokenHandleStore::new());
        let consents = Arc::new(InMemoryConsentStore::new());
        let signer = Arc::new(JwtTokenSigner::hs256(SIGNING_KEY, ISSUER));

        let tokens = TokenService::new(
            ISSUER,
            Arc::new(DefaultClaimsProvider::new(users.clone())),
            handles.clone(),
            signer.clone(),
        );
        let refresh_service = RefreshTokenService::new(refresh_tokens.clone(), audit.clone());

        Self {
            client_validator: ClientValidator::new(clients.clone(), audit.clone()),
            authorize_validator: AuthorizeRequestValidator::new(
                clients,
                scope_validator.clone(),
                InputLengthLimits::default(),
                audit.clone(),
            ),
            interaction: InteractionResponseGenerator::new(
                Arc::new(DefaultConsentService::new(consents.clone())),
                Default::default(),
                audit.clone(),
            ),
            authorize_responses: AuthorizeResponseGenerator::new(
                tokens.clone(),
                codes.clone(),
                audit.clone(),
            ),
            token_requests: TokenRequestValidator::new(
                codes.clone(),
                refresh_tokens.clone(),
                scope_validator,
                users,
                InputLengthLimits::default(),
                audit.clone(),
            ),
            token_responses: TokenResponseGenerator::new(
                tokens,
                refresh_service.clone(),
                audit.clone(),
            ),
            token_validator: TokenValidator::new(handles.clone(), signer, ISSUER, audit),
            refresh_service,
            codes,
            refresh_tokens,
            handles,
            consents,
        }
    }

    /// Full authorize round: validation, interaction with the given consent, response
    pub async fn authorize(
        &self,
        params: Parameters,
        subject: Subject,
        consent: Option<UserConsent>,
    ) -> Result<InteractionOutcome> {
        let request = self.authorize_validator.validate(params, subject).await?;
        match self.interaction.process(request, consent).await? {
            InteractionResponse::Proceed(request) => Ok(InteractionOutcome::Response(
                self.authorize_responses.create_response(&request).await?,
            )),
            other => Ok(InteractionOutcome::Interaction(other)),
        }
    }

    /// Authenticate the client from form credentials and run the token pipeline
    pub async fn token(&self, params: Parameters) -> Result<TokenResponse> {
        let credentials = form_credentials(&params);
        let client = self.client_validator.validate(&credentials).await?;
        let request = self.token_requests.validate(params, client).await?;
        self.token_responses.process(&request).await
    }
}

impl Default for TestServer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub enum InteractionOutcome {
    Response(AuthorizeResponse),
    Interaction(InteractionResponse),
}

impl InteractionOutcome {
    pub fn response(self) -> AuthorizeResponse {
        match self {
            InteractionOutcome::Response(response) => response,
            InteractionOutcome::Interaction(other) => {
                panic!("expected an authorize response, got {other:?}")
            }
        }
    }

    pub fn interaction(self) -> InteractionResponse {
        match self {
            InteractionOutcome::Interaction(other) => other,
            InteractionOutcome::Response(response) => {
                panic!("expected an interaction, got {response:?}")
            }
        }
    }
}

pub fn form_credentials(params: &Parameters) -> ClientCredentialParseResult {
    parse_client_credentials(None, params, None)
}

pub fn alice() -> Subject {
    Subject::Authenticated(AuthenticatedUser::new("818727", "idsrv").with_name("alice"))
}

pub fn params(pairs: &[(&str, &str)]) -> Parameters {
    pairs.iter().map(|(k, v)| (*k, *v)).collect()
}

pub fn authorize_params(client_id: &str, response_type: &str, scope: &str) -> Parameters {
    params(&[
        ("client_id", client_id),
        ("redirect_uri", REDIRECT_URI),
        ("response_type", response_type),
        ("scope", scope),
        ("state", "af0ifjsldkj"),
        ("nonce", "n-0S6_WzA2Mj"),
    ])
}

pub fn code_redemption(client_id: &str, code: &str) -> Parameters {
    params(&[
        ("grant_type", "authorization_code"),
        ("client_id", client_id),
        ("client_secret", SECRET),
        ("code", code),
        ("redirect_uri", REDIRECT_URI),
    ])
}

pub fn refresh_redemption(client_id: &str, handle: &str) -> Parameters {
    params(&[
        ("grant_type", "refresh_token"),
        ("client_id", client_id),
        ("client_secret", SECRET),
        ("refresh_token", handle),
    ])
}
