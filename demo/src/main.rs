//! Keyward Demo - one authorization server, three clients
//!
//! Walks the in-memory pipeline through:
//! - an authorization code round trip with consent and an identity token
//! - refresh token rotation
//! - a client credentials grant with a reference token
//!
//! Pass a TOML/YAML/JSON options file as the first argument to override the
//! built-in options; `KEYWARD__*` environment variables apply on top.

use std::sync::Arc;

use anyhow::{Context, bail};
use keyward::audit::AuditLogger;
use keyward::memory::{
    InMemoryAuthorizationCodeStore, InMemoryClientStore, InMemoryConsentStore,
    InMemoryRefreshTokenStore, InMemoryScopeStore, InMemoryTokenHandleStore, InMemoryUserService,
    TestUser,
};
use keyward::models::{
    AccessTokenType, AuthenticatedUser, Client, ClientSecret, Flow, Parameters, Scope, Subject,
    TokenExpiration, TokenMetadata, TokenUsage, UserConsent,
};
use keyward::services::{DefaultClaimsProvider, DefaultConsentService, JwtTokenSigner};
use keyward::validation::parse_client_credentials;
use keyward::{
    AuthorizeRequestValidator, AuthorizeResponseGenerator, ClientValidator, InteractionResponse,
    InteractionResponseGenerator, KeywardOptions, RefreshTokenService, ScopeValidator,
    TokenRequestValidator, TokenResponse, TokenResponseGenerator, TokenService, TokenValidator,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const REDIRECT_URI: &str = "https://app.example.com/callback";

/// The wired pipeline
struct Server {
    client_validator: ClientValidator,
    authorize_validator: AuthorizeRequestValidator,
    interaction: InteractionResponseGenerator,
    authorize_responses: AuthorizeResponseGenerator,
    token_requests: TokenRequestValidator,
    token_responses: TokenResponseGenerator,
    token_validator: TokenValidator,
}

impl Server {
    fn new(options: &KeywardOptions) -> anyhow::Result<Self> {
        let audit = AuditLogger::from_options(&options.audit);
        let clients = Arc::new(InMemoryClientStore::new(clients()));
        let scope_validator = ScopeValidator::new(Arc::new(InMemoryScopeStore::new(scopes())));
        let users = Arc::new(
            InMemoryUserService::new(users())
                .with_identity_provider(options.authentication.local_identity_provider.clone()),
        );
        let codes = Arc::new(InMemoryAuthorizationCodeStore::new());
        let refresh_tokens = Arc::new(InMemoryRefreshTokenStore::new());
        let handles = Arc::new(InMemoryTokenHandleStore::new());
        let signer = Arc::new(JwtTokenSigner::from_options(options)?);

        let tokens = TokenService::new(
            options.issuer_uri.clone(),
            Arc::new(DefaultClaimsProvider::new(users.clone())),
            handles.clone(),
            signer.clone(),
        );

        Ok(Self {
            client_validator: ClientValidator::new(clients.clone(), audit.clone()),
            authorize_validator: AuthorizeRequestValidator::new(
                clients,
                scope_validator.clone(),
                options.input_limits,
                audit.clone(),
            ),
            interaction: InteractionResponseGenerator::new(
                Arc::new(DefaultConsentService::new(Arc::new(InMemoryConsentStore::new()))),
                options.authentication.clone(),
                audit.clone(),
            ),
            authorize_responses: AuthorizeResponseGenerator::new(
                tokens.clone(),
                codes.clone(),
                audit.clone(),
            ),
            token_requests: TokenRequestValidator::new(
                codes,
                refresh_tokens.clone(),
                scope_validator,
                users,
                options.input_limits,
                audit.clone(),
            ),
            token_responses: TokenResponseGenerator::new(
                tokens,
                RefreshTokenService::new(refresh_tokens, audit.clone()),
                audit.clone(),
            ),
            token_validator: TokenValidator::new(handles, signer, options.issuer_uri.clone(), audit),
        })
    }

    async fn token(&self, params: Parameters) -> anyhow::Result<TokenResponse> {
        let credentials = parse_client_credentials(None, &params, None);
        let client = self.client_validator.validate(&credentials).await?;
        let request = self.token_requests.validate(params, client).await?;
        Ok(self.token_responses.process(&request).await?)
    }
}

fn clients() -> Vec<Client> {
    vec![
        Client::new("webapp", Flow::AuthorizationCode)
            .with_secret(ClientSecret::sha256("webapp-secret"))
            .with_redirect_uri(REDIRECT_URI)
            .with_allowed_scopes(["openid", "profile", "email", "orders", "offline_access"])
            .with_refresh_policy(TokenUsage::OneTimeOnly, TokenExpiration::Sliding),
        Client::new("billing-job", Flow::ClientCredentials)
            .with_secret(ClientSecret::sha256("billing-secret"))
            .with_allowed_scopes(["orders"])
            .with_access_token_type(AccessTokenType::Reference),
    ]
}

fn scopes() -> Vec<Scope> {
    let mut scopes = Scope::standard_scopes();
    scopes.push(Scope::resource("orders").with_claims(["role"]));
    scopes
}

fn users() -> Vec<TestUser> {
    vec![
        TestUser::new("248289761001", "jane", "jane")
            .with_claim("name", "Jane Doe")
            .with_claim("email", "janedoe@example.com")
            .with_claim("role", "buyer"),
    ]
}

fn load_options() -> anyhow::Result<KeywardOptions> {
    match std::env::args().nth(1) {
        Some(path) => KeywardOptions::from_file(&path)
            .with_context(|| format!("loading options from {path}")),
        None => {
            let options = KeywardOptions::builder()
                .issuer_uri("https://login.example.com")
                .site_name("Keyward Demo")
                .symmetric_key("demo-signing-key-change-me-0123456789")
                .key_id("demo")
                .audit_service_name("keyward-demo")
                .build();
            options.validate()?;
            Ok(options)
        }
    }
}

fn init_logging(options: &KeywardOptions) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&options.logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if options.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn form(pairs: &[(&str, &str)]) -> Parameters {
    pairs.iter().map(|(k, v)| (*k, *v)).collect()
}

async fn code_flow(server: &Server) -> anyhow::Result<String> {
    let jane = Subject::Authenticated(
        AuthenticatedUser::new("248289761001", "idsrv")
            .with_name("jane")
            .with_authentication_method("pwd"),
    );
    let params = form(&[
        ("client_id", "webapp"),
        ("redirect_uri", REDIRECT_URI),
        ("response_type", "code"),
        ("scope", "openid profile orders offline_access"),
        ("state", "xyz"),
        ("nonce", "n-0S6_WzA2Mj"),
    ]);

    let request = server
        .authorize_validator
        .validate(params.clone(), jane.clone())
        .await?;
    let pending = server.interaction.process(request, None).await?;
    info!(consent = pending.is_consent(), "First pass through interaction");

    // The user ticks every box on the consent page
    let request = server.authorize_validator.validate(params, jane).await?;
    let consent = UserConsent::granted(["openid", "profile", "orders", "offline_access"]);
    let request = match server.interaction.process(request, Some(consent)).await? {
        InteractionResponse::Proceed(request) => request,
        other => bail!("unexpected interaction outcome: {other:?}"),
    };

    let response = server.authorize_responses.create_response(&request).await?;
    info!(redirect = %response.redirect_url()?, "Authorization response");
    let code = response.code.context("code flow returned no code")?;

    let tokens = server
        .token(form(&[
            ("grant_type", "authorization_code"),
            ("client_id", "webapp"),
            ("client_secret", "webapp-secret"),
            ("code", &code),
            ("redirect_uri", REDIRECT_URI),
        ]))
        .await?;
    println!("{}", serde_json::to_string_pretty(&tokens)?);

    let access = server
        .token_validator
        .validate_access_token(&tokens.access_token, Some("orders"))
        .await?;
    info!(subject = ?access.subject_id(), "Access token validated");

    tokens
        .refresh_token
        .context("offline_access granted but no refresh token issued")
}

async fn refresh(server: &Server, handle: &str) -> anyhow::Result<()> {
    let tokens = server
        .token(form(&[
            ("grant_type", "refresh_token"),
            ("client_id", "webapp"),
            ("client_secret", "webapp-secret"),
            ("refresh_token", handle),
        ]))
        .await?;
    info!(
        rotated = tokens.refresh_token.as_deref() != Some(handle),
        "Refresh token used"
    );
    println!("{}", serde_json::to_string_pretty(&tokens)?);
    Ok(())
}

async fn client_credentials(server: &Server) -> anyhow::Result<()> {
    let tokens = server
        .token(form(&[
            ("grant_type", "client_credentials"),
            ("client_id", "billing-job"),
            ("client_secret", "billing-secret"),
            ("scope", "orders"),
        ]))
        .await?;
    println!("{}", serde_json::to_string_pretty(&tokens)?);

    let access = server
        .token_validator
        .validate_access_token(&tokens.access_token, Some("orders"))
        .await?;
    info!(client_id = %access.client_id, "Reference token validated");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let options = load_options()?;
    init_logging(&options);
    info!(issuer = %options.issuer_uri, site = %options.site_name, "Starting Keyward demo");

    let server = Server::new(&options)?;

    let handle = code_flow(&server).await?;
    refresh(&server, &handle).await?;
    client_credentials(&server).await?;

    Ok(())
}
