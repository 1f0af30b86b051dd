//! `/token` request validation
//!
//! Runs after client authentication. Every failure is classified
//! [`ErrorType::Client`](crate::error::ErrorType::Client): the token endpoint
//! answers the client directly and never redirects.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use super::scope_validator::{ScopeValidator, first_disallowed, parse_scopes};
use super::token_request::{GrantType, ValidatedTokenRequest};
use crate::audit::{AuditEvent, AuditLogger};
use crate::config::InputLengthLimits;
use crate::constants::{OPENID_SCOPE, grant_types, params};
use crate::error::{Error, ErrorCode, Result, ValidationError};
use crate::models::{AuthenticatedUser, Client, Flow, Parameters, Scope, TokenMetadata};
use crate::services::{AssertionGrantValidator, CustomGrantValidator, UserService};
use crate::stores::{AuthorizationCodeStore, RefreshTokenStore};

/// Validates token requests per grant type
#[derive(Debug, Clone)]
pub struct TokenRequestValidator {
    codes: Arc<dyn AuthorizationCodeStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    scopes: ScopeValidator,
    users: Arc<dyn UserService>,
    assertion_validators: Vec<Arc<dyn AssertionGrantValidator>>,
    custom_validators: Vec<Arc<dyn CustomGrantValidator>>,
    limits: InputLengthLimits,
    audit: AuditLogger,
}

/// Whether identity scopes may be granted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdentityScopes {
    Forbidden,
    /// Only alongside `openid`
    WithOpenId,
}

impl TokenRequestValidator {
    pub fn new(
        codes: Arc<dyn AuthorizationCodeStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        scopes: ScopeValidator,
        users: Arc<dyn UserService>,
        limits: InputLengthLimits,
        audit: AuditLogger,
    ) -> Self {
        Self {
            codes,
            refresh_tokens,
            scopes,
            users,
            assertion_validators: Vec::new(),
            custom_validators: Vec::new(),
            limits,
            audit,
        }
    }

    /// Register a validator for an assertion grant type
    #[must_use]
    pub fn with_assertion_validator(mut self, validator: Arc<dyn AssertionGrantValidator>) -> Self {
        self.assertion_validators.push(validator);
        self
    }

    /// Register a validator for a custom grant type
    #[must_use]
    pub fn with_custom_grant_validator(mut self, validator: Arc<dyn CustomGrantValidator>) -> Self {
        self.custom_validators.push(validator);
        self
    }

    /// Validate `parameters` for the already authenticated `client`
    ///
    /// # Errors
    ///
    /// Client-type validation errors (`unsupported_grant_type`, `invalid_grant`,
    /// `invalid_scope`, `unauthorized_client`, `invalid_request`), or a store or
    /// service failure.
    pub async fn validate(
        &self,
        parameters: Parameters,
        client: Client,
    ) -> Result<ValidatedTokenRequest> {
        let client_id = client.client_id.clone();
        match self.dispatch(parameters, client).await {
            Ok(request) => {
                debug!(
                    client_id = %client_id,
                    grant_type = %request.grant_type,
                    "Token request validated"
                );
                Ok(request)
            }
            Err(Error::Validation(error)) => {
                warn!(
                    client_id = %client_id,
                    error = %error.code,
                    reason = error.description.as_deref().unwrap_or_default(),
                    "Token request rejected"
                );
                Err(Error::Validation(error))
            }
            Err(fault) => Err(fault),
        }
    }

    async fn dispatch(&self, parameters: Parameters, client: Client) -> Result<ValidatedTokenRequest> {
        let Some(raw_grant) = bounded(&parameters, params::GRANT_TYPE, self.limits.grant_type)?
        else {
            return Err(reject(ErrorCode::UnsupportedGrantType, "missing grant_type"));
        };

        let grant_type = self.resolve_grant_type(raw_grant, &parameters, &client)?;
        let request = ValidatedTokenRequest::new(parameters, client, grant_type.clone());

        match grant_type {
            GrantType::AuthorizationCode => self.validate_authorization_code(request).await,
            GrantType::ClientCredentials => self.validate_client_credentials(request).await,
            GrantType::Password => self.validate_password(request).await,
            GrantType::RefreshToken => self.validate_refresh_token(request).await,
            GrantType::Assertion(_) => self.validate_assertion(request).await,
            GrantType::Custom(_) => self.validate_custom(request).await,
        }
    }

    fn resolve_grant_type(
        &self,
        raw: &str,
        parameters: &Parameters,
        client: &Client,
    ) -> Result<GrantType> {
        if let Some(standard) = GrantType::standard(raw) {
            return Ok(standard);
        }
        if self.assertion_validators.iter().any(|v| v.grant_type() == raw) {
            return Ok(GrantType::Assertion(raw.to_string()));
        }
        if self.custom_validators.iter().any(|v| v.grant_type() == raw) {
            return Ok(GrantType::Custom(raw.to_string()));
        }
        // An extension client presenting an assertion nobody understands gets invalid_grant
        let is_assertion = matches!(raw, grant_types::JWT_BEARER | grant_types::SAML2_BEARER)
            || parameters.get(params::ASSERTION).is_some();
        if client.flow == Flow::Custom && is_assertion {
            return Ok(GrantType::Assertion(raw.to_string()));
        }
        Err(reject(
            ErrorCode::UnsupportedGrantType,
            format!("unsupported grant_type: {raw}"),
        ))
    }

    async fn validate_authorization_code(
        &self,
        mut request: ValidatedTokenRequest,
    ) -> Result<ValidatedTokenRequest> {
        let client_id = request.client.client_id.clone();

        // hybrid clients redeem the code half of their response here too
        if !matches!(request.client.flow, Flow::AuthorizationCode | Flow::Hybrid) {
            return Err(reject(
                ErrorCode::UnauthorizedClient,
                "client is not configured for the authorization code flow",
            ));
        }

        let Some(handle) = bounded(&request.raw, params::CODE, self.limits.code)? else {
            return Err(reject(ErrorCode::InvalidGrant, "missing code"));
        };
        let handle = handle.to_string();
        let redirect_uri = bounded(&request.raw, params::REDIRECT_URI, self.limits.redirect_uri)?
            .map(str::to_string);

        // Single point of consumption: whatever happens below, the code is gone.
        let Some(code) = self.codes.get_and_remove(&handle).await? else {
            return Err(self.code_rejected(&client_id, &handle, "unknown or already redeemed code"));
        };

        if code.client_id != client_id {
            return Err(self.code_rejected(&client_id, &handle, "code issued to another client"));
        }

        if code.is_expired(Utc::now()) {
            return Err(self.code_rejected(&client_id, &handle, "code expired"));
        }

        if redirect_uri.as_deref() != Some(code.redirect_uri.as_str()) {
            self.audit.log(AuditEvent::AuthorizationCodeRejected {
                client_id: client_id.clone(),
                code: handle,
                reason: "redirect_uri does not match".to_string(),
            });
            return Err(reject(
                ErrorCode::UnauthorizedClient,
                "redirect_uri missing or different from the authorize request",
            ));
        }

        if !self.users.is_active(&code.subject).await? {
            return Err(self.code_rejected(&client_id, &handle, "subject is no longer active"));
        }

        self.audit.log(AuditEvent::AuthorizationCodeRedeemed {
            client_id,
            subject: code.subject.subject_id.clone(),
            code: handle,
        });

        request.subject = Some(code.subject.clone());
        request.scopes = code.scopes.clone();
        request.authorization_code = Some(code);
        Ok(request)
    }

    fn code_rejected(&self, client_id: &str, handle: &str, reason: &str) -> Error {
        self.audit.log(AuditEvent::AuthorizationCodeRejected {
            client_id: client_id.to_string(),
            code: handle.to_string(),
            reason: reason.to_string(),
        });
        reject(ErrorCode::InvalidGrant, reason)
    }

    async fn validate_client_credentials(
        &self,
        mut request: ValidatedTokenRequest,
    ) -> Result<ValidatedTokenRequest> {
        if request.client.flow != Flow::ClientCredentials {
            return Err(reject(
                ErrorCode::UnauthorizedClient,
                "client is not configured for the client credentials flow",
            ));
        }

        request.scopes = self
            .requested_scopes(&request.client, &request.raw, IdentityScopes::Forbidden)
            .await?;
        Ok(request)
    }

    async fn validate_password(
        &self,
        mut request: ValidatedTokenRequest,
    ) -> Result<ValidatedTokenRequest> {
        if request.client.flow != Flow::ResourceOwner {
            return Err(reject(
                ErrorCode::UnauthorizedClient,
                "client is not configured for the resource owner flow",
            ));
        }

        request.scopes = self
            .requested_scopes(&request.client, &request.raw, IdentityScopes::WithOpenId)
            .await?;

        let username = bounded(&request.raw, params::USER_NAME, self.limits.user_name)?;
        let password = bounded(&request.raw, params::PASSWORD, self.limits.password)?;
        let (Some(username), Some(password)) = (username, password) else {
            return Err(reject(ErrorCode::InvalidGrant, "missing username or password"));
        };

        let Some(user) = self
            .users
            .authenticate(username, password, &request.raw)
            .await?
        else {
            return Err(reject(ErrorCode::InvalidGrant, "invalid username or password"));
        };

        self.ensure_active(&user).await?;
        request.subject = Some(user);
        Ok(request)
    }

    async fn validate_refresh_token(
        &self,
        mut request: ValidatedTokenRequest,
    ) -> Result<ValidatedTokenRequest> {
        let client_id = request.client.client_id.clone();

        let Some(handle) = bounded(&request.raw, params::REFRESH_TOKEN, self.limits.refresh_token)?
        else {
            return Err(ValidationError::client(ErrorCode::InvalidRequest)
                .with_description("missing refresh_token")
                .into());
        };
        let handle = handle.to_string();

        let Some(token) = self.refresh_tokens.get(&handle).await? else {
            return Err(self.refresh_rejected(&client_id, &handle, "unknown refresh token"));
        };

        if token.is_expired(Utc::now()) {
            self.refresh_tokens.remove(&handle).await?;
            return Err(self.refresh_rejected(&client_id, &handle, "refresh token expired"));
        }

        if token.client_id() != client_id {
            return Err(self.refresh_rejected(
                &client_id,
                &handle,
                "refresh token issued to another client",
            ));
        }

        if let Some(subject) = token.access_token.subject() {
            if !self.users.is_active(&subject).await? {
                return Err(self.refresh_rejected(&client_id, &handle, "subject is no longer active"));
            }
            request.subject = Some(subject);
        }

        request.refresh_token_handle = Some(handle);
        request.refresh_token = Some(token);
        Ok(request)
    }

    fn refresh_rejected(&self, client_id: &str, handle: &str, reason: &str) -> Error {
        self.audit.log(AuditEvent::RefreshTokenRejected {
            client_id: client_id.to_string(),
            handle: handle.to_string(),
            reason: reason.to_string(),
        });
        reject(ErrorCode::InvalidGrant, reason)
    }

    async fn validate_assertion(
        &self,
        mut request: ValidatedTokenRequest,
    ) -> Result<ValidatedTokenRequest> {
        let grant_type = request.grant_type.as_str().to_string();
        self.ensure_extension_grant_allowed(&request.client, &grant_type)?;

        let Some(validator) = self
            .assertion_validators
            .iter()
            .find(|v| v.grant_type() == grant_type)
        else {
            return Err(reject(
                ErrorCode::InvalidGrant,
                format!("unrecognized assertion type: {grant_type}"),
            ));
        };

        request.scopes = self
            .requested_scopes(&request.client, &request.raw, IdentityScopes::WithOpenId)
            .await?;

        let Some(assertion) = bounded(&request.raw, params::ASSERTION, self.limits.assertion)?
        else {
            return Err(reject(ErrorCode::InvalidGrant, "missing assertion"));
        };

        let Some(user) = validator
            .validate(assertion, &request.client, &request.raw)
            .await?
        else {
            return Err(reject(ErrorCode::InvalidGrant, "assertion rejected"));
        };

        self.ensure_active(&user).await?;
        request.subject = Some(user);
        Ok(request)
    }

    async fn validate_custom(
        &self,
        mut request: ValidatedTokenRequest,
    ) -> Result<ValidatedTokenRequest> {
        let grant_type = request.grant_type.as_str().to_string();
        self.ensure_extension_grant_allowed(&request.client, &grant_type)?;

        let Some(validator) = self
            .custom_validators
            .iter()
            .find(|v| v.grant_type() == grant_type)
        else {
            return Err(reject(ErrorCode::UnsupportedGrantType, "no custom grant validator"));
        };

        request.scopes = self
            .requested_scopes(&request.client, &request.raw, IdentityScopes::WithOpenId)
            .await?;

        let Some(user) = validator.validate(&request.client, &request.raw).await? else {
            return Err(reject(ErrorCode::InvalidGrant, "custom grant rejected"));
        };

        self.ensure_active(&user).await?;
        request.subject = Some(user);
        Ok(request)
    }

    fn ensure_extension_grant_allowed(&self, client: &Client, grant_type: &str) -> Result<()> {
        if client.flow != Flow::Custom {
            return Err(reject(
                ErrorCode::UnauthorizedClient,
                "client is not configured for extension grants",
            ));
        }
        if !client.allows_custom_grant_type(grant_type) {
            return Err(reject(
                ErrorCode::UnauthorizedClient,
                format!("grant_type not allowed for client: {grant_type}"),
            ));
        }
        Ok(())
    }

    async fn ensure_active(&self, user: &AuthenticatedUser) -> Result<()> {
        if self.users.is_active(user).await? {
            Ok(())
        } else {
            Err(reject(ErrorCode::InvalidGrant, "subject is not active"))
        }
    }

    /// Resolve `scope` against the client allow-list and the catalog
    async fn requested_scopes(
        &self,
        client: &Client,
        parameters: &Parameters,
        identity: IdentityScopes,
    ) -> Result<Vec<Scope>> {
        let Some(raw) = bounded(parameters, params::SCOPE, self.limits.scope)? else {
            return Err(reject(ErrorCode::InvalidScope, "missing scope"));
        };
        let requested = parse_scopes(raw);
        if requested.is_empty() {
            return Err(reject(ErrorCode::InvalidScope, "missing scope"));
        }

        if let Some(scope) = first_disallowed(client, &requested) {
            return Err(reject(
                ErrorCode::InvalidScope,
                format!("scope not allowed for client: {scope}"),
            ));
        }

        let validated = self.scopes.validate(&requested).await?;

        if validated.contains_open_id_scopes {
            let allowed = identity == IdentityScopes::WithOpenId
                && requested.iter().any(|s| s == OPENID_SCOPE);
            if !allowed {
                return Err(reject(
                    ErrorCode::InvalidScope,
                    "identity scopes are not allowed for this grant",
                ));
            }
        }

        Ok(validated.granted_scopes)
    }
}

fn reject(code: ErrorCode, reason: impl Into<String>) -> Error {
    ValidationError::client(code).with_description(reason).into()
}

/// Optional token request parameter; over-long values are `invalid_request`
fn bounded<'a>(parameters: &'a Parameters, name: &str, max_len: usize) -> Result<Option<&'a str>> {
    match parameters.get(name) {
        Some(value) if value.len() > max_len => Err(ValidationError::client(ErrorCode::InvalidRequest)
            .with_description(format!("{name} too long"))
            .into()),
        value => Ok(value),
    }
}

#[cfg(all(test, feature = "memory-store"))]
mod tests {
    use super::*;
    use crate::constants::grant_types;
    use crate::error::ErrorType;
    use crate::memory::{
        InMemoryAuthorizationCodeStore, InMemoryRefreshTokenStore, InMemoryScopeStore,
        InMemoryUserService, TestUser,
    };
    use crate::models::{AuthorizationCode, Claim, RefreshToken, Token, TokenKind};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    #[derive(Debug)]
    struct StaticAssertion;

    #[async_trait]
    impl AssertionGrantValidator for StaticAssertion {
        fn grant_type(&self) -> &str {
            grant_types::JWT_BEARER
        }

        async fn validate(
            &self,
            assertion: &str,
            _client: &Client,
            _parameters: &Parameters,
        ) -> Result<Option<AuthenticatedUser>> {
            Ok((assertion == "good").then(|| AuthenticatedUser::new("alice", "partner")))
        }
    }

    struct Fixture {
        validator: TokenRequestValidator,
        codes: Arc<InMemoryAuthorizationCodeStore>,
        refresh_tokens: Arc<InMemoryRefreshTokenStore>,
    }

    fn fixture() -> Fixture {
        let mut scopes = Scope::standard_scopes();
        scopes.push(Scope::resource("api1"));
        scopes.push(Scope::resource("api2"));
        let codes = Arc::new(InMemoryAuthorizationCodeStore::new());
        let refresh_tokens = Arc::new(InMemoryRefreshTokenStore::new());
        let users = InMemoryUserService::new(vec![
            TestUser::new("alice", "alice", "secret"),
            TestUser::new("bob", "bob", "secret").disabled(),
        ]);
        let validator = TokenRequestValidator::new(
            codes.clone(),
            refresh_tokens.clone(),
            ScopeValidator::new(Arc::new(InMemoryScopeStore::new(scopes))),
            Arc::new(users),
            InputLengthLimits::default(),
            AuditLogger::new("test"),
        )
        .with_assertion_validator(Arc::new(StaticAssertion));
        Fixture {
            validator,
            codes,
            refresh_tokens,
        }
    }

    fn code_client() -> Client {
        Client::new("codeclient", Flow::AuthorizationCode).with_redirect_uri("https://server/cb")
    }

    fn code_for(client_id: &str, subject: &str) -> AuthorizationCode {
        AuthorizationCode {
            client_id: client_id.to_string(),
            subject: AuthenticatedUser::new(subject, "idsrv"),
            redirect_uri: "https://server/cb".to_string(),
            scopes: vec![Scope::standard(crate::constants::StandardScope::OpenId)],
            is_open_id: true,
            nonce: None,
            was_consent_shown: false,
            creation_time: Utc::now(),
            lifetime: 60,
        }
    }

    fn code_params(code: &str) -> Parameters {
        [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", "https://server/cb"),
        ]
        .into_iter()
        .collect()
    }

    fn validation_error(err: Error) -> (ErrorCode, ErrorType) {
        let error = err.as_validation().cloned().unwrap();
        (error.code, error.error_type)
    }

    #[tokio::test]
    async fn test_missing_and_unknown_grant_type() {
        let f = fixture();
        let err = f.validator.validate(Parameters::new(), code_client()).await.unwrap_err();
        assert_eq!(
            validation_error(err),
            (ErrorCode::UnsupportedGrantType, ErrorType::Client)
        );

        let params = Parameters::new().with("grant_type", "implicit");
        let err = f.validator.validate(params, code_client()).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::UnsupportedGrantType));
    }

    #[tokio::test]
    async fn test_code_is_redeemed_once() {
        let f = fixture();
        f.codes.store("c1", code_for("codeclient", "alice")).await.unwrap();

        let request = f.validator.validate(code_params("c1"), code_client()).await.unwrap();
        assert_eq!(request.grant_type, GrantType::AuthorizationCode);
        assert_eq!(request.subject.as_ref().unwrap().subject_id, "alice");
        assert_eq!(request.scope_names(), vec!["openid".to_string()]);

        let err = f.validator.validate(code_params("c1"), code_client()).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidGrant));
    }

    #[tokio::test]
    async fn test_code_bound_to_other_client() {
        let f = fixture();
        f.codes.store("c1", code_for("otherclient", "alice")).await.unwrap();
        let err = f.validator.validate(code_params("c1"), code_client()).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidGrant));
        // the misused code is burned
        assert!(f.codes.is_empty());
    }

    #[tokio::test]
    async fn test_expired_code() {
        let f = fixture();
        let mut code = code_for("codeclient", "alice");
        code.creation_time = Utc::now() - chrono::Duration::seconds(61);
        f.codes.store("c1", code).await.unwrap();
        let err = f.validator.validate(code_params("c1"), code_client()).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidGrant));
    }

    #[tokio::test]
    async fn test_code_redirect_uri_must_match() {
        let f = fixture();
        f.codes.store("c1", code_for("codeclient", "alice")).await.unwrap();
        let params = code_params("c1").with("redirect_uri", "https://server/other");
        let err = f.validator.validate(params, code_client()).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::UnauthorizedClient));

        f.codes.store("c2", code_for("codeclient", "alice")).await.unwrap();
        let mut params = code_params("c2");
        params.remove("redirect_uri");
        let err = f.validator.validate(params, code_client()).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::UnauthorizedClient));
    }

    #[tokio::test]
    async fn test_code_grant_requires_code_flow() {
        let f = fixture();
        let client = Client::new("svc", Flow::ClientCredentials);
        let err = f.validator.validate(code_params("c1"), client).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::UnauthorizedClient));

        let mut params = code_params("c1");
        params.remove("code");
        let err = f.validator.validate(params, code_client()).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidGrant));
    }

    #[tokio::test]
    async fn test_code_for_inactive_subject() {
        let f = fixture();
        f.codes.store("c1", code_for("codeclient", "bob")).await.unwrap();
        let err = f.validator.validate(code_params("c1"), code_client()).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidGrant));
    }

    #[tokio::test]
    async fn test_client_credentials_scopes() {
        let f = fixture();
        let client = Client::new("svc", Flow::ClientCredentials).with_allowed_scopes(["api1", "openid"]);
        let params = |scope: &str| {
            Parameters::new()
                .with("grant_type", "client_credentials")
                .with("scope", scope)
        };

        let request = f.validator.validate(params("api1"), client.clone()).await.unwrap();
        assert_eq!(request.scope_names(), vec!["api1".to_string()]);
        assert!(request.subject.is_none());

        for scope in ["openid", "api2", "unknown"] {
            let err = f.validator.validate(params(scope), client.clone()).await.unwrap_err();
            assert_eq!(validation_error(err), (ErrorCode::InvalidScope, ErrorType::Client));
        }

        let err = f
            .validator
            .validate(Parameters::new().with("grant_type", "client_credentials"), client)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidScope));
    }

    #[tokio::test]
    async fn test_password_grant() {
        let f = fixture();
        let client = Client::new("roclient", Flow::ResourceOwner);
        let params = |user: &str, password: &str, scope: &str| {
            Parameters::new()
                .with("grant_type", "password")
                .with("username", user)
                .with("password", password)
                .with("scope", scope)
        };

        let request = f
            .validator
            .validate(params("alice", "secret", "openid profile api1"), client.clone())
            .await
            .unwrap();
        assert!(request.is_open_id());
        assert_eq!(request.subject.as_ref().unwrap().subject_id, "alice");

        let err = f
            .validator
            .validate(params("alice", "wrong", "api1"), client.clone())
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidGrant));

        let err = f
            .validator
            .validate(params("alice", "secret", "profile api1"), client.clone())
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidScope));

        let err = f
            .validator
            .validate(params("bob", "secret", "api1"), client)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidGrant));
    }

    fn refresh_token(client_id: &str, subject: &str, lifetime: u32) -> RefreshToken {
        let mut access = Token::new(TokenKind::Access, client_id, "https://issuer", "aud", 60);
        access.claims.push(Claim::new("sub", subject));
        access.claims.push(Claim::new("idp", "idsrv"));
        let client = Client::new(client_id, Flow::AuthorizationCode);
        RefreshToken {
            creation_time: Utc::now(),
            access_token: access,
            lifetime,
            policy: client.refresh_token_policy(),
            version: 1,
        }
    }

    fn refresh_params(handle: &str) -> Parameters {
        Parameters::new()
            .with("grant_type", "refresh_token")
            .with("refresh_token", handle)
    }

    #[tokio::test]
    async fn test_refresh_grant() {
        let f = fixture();
        f.refresh_tokens
            .store("r1", refresh_token("codeclient", "alice", 600))
            .await
            .unwrap();

        let request = f.validator.validate(refresh_params("r1"), code_client()).await.unwrap();
        assert_eq!(request.refresh_token_handle.as_deref(), Some("r1"));
        assert_eq!(request.subject.as_ref().unwrap().subject_id, "alice");

        let other = Client::new("other", Flow::AuthorizationCode);
        let err = f.validator.validate(refresh_params("r1"), other).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidGrant));

        let err = f.validator.validate(refresh_params("nope"), code_client()).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidGrant));

        let err = f
            .validator
            .validate(Parameters::new().with("grant_type", "refresh_token"), code_client())
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidRequest));
    }

    #[tokio::test]
    async fn test_expired_refresh_token_is_removed() {
        let f = fixture();
        let mut token = refresh_token("codeclient", "alice", 10);
        token.creation_time = Utc::now() - chrono::Duration::seconds(20);
        f.refresh_tokens.store("r1", token).await.unwrap();

        let err = f.validator.validate(refresh_params("r1"), code_client()).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidGrant));
        assert!(f.refresh_tokens.is_empty());
    }

    #[tokio::test]
    async fn test_assertion_grant() {
        let f = fixture();
        let mut client = Client::new("partner", Flow::Custom);
        client.custom_grant_type_restrictions = vec![grant_types::JWT_BEARER.to_string()];
        let params = |assertion: &str| {
            Parameters::new()
                .with("grant_type", grant_types::JWT_BEARER)
                .with("assertion", assertion)
                .with("scope", "api1")
        };

        let request = f.validator.validate(params("good"), client.clone()).await.unwrap();
        assert_eq!(
            request.grant_type,
            GrantType::Assertion(grant_types::JWT_BEARER.to_string())
        );
        assert_eq!(request.subject.as_ref().unwrap().identity_provider, "partner");

        let err = f.validator.validate(params("bad"), client).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidGrant));

        let err = f.validator.validate(params("good"), code_client()).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::UnauthorizedClient));
    }

    #[tokio::test]
    async fn test_unrecognized_assertion_type() {
        let f = fixture();
        let client = Client::new("partner", Flow::Custom);
        let saml = Parameters::new()
            .with("grant_type", grant_types::SAML2_BEARER)
            .with("assertion", "x")
            .with("scope", "api1");
        let err = f.validator.validate(saml.clone(), client.clone()).await.unwrap_err();
        assert_eq!(
            validation_error(err),
            (ErrorCode::InvalidGrant, ErrorType::Client)
        );

        let vendor = Parameters::new()
            .with("grant_type", "urn:example:vendor-assertion")
            .with("assertion", "x");
        let err = f.validator.validate(vendor, client.clone()).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidGrant));

        // without an assertion an unknown grant stays unsupported
        let unknown = Parameters::new().with("grant_type", "urn:example:other");
        let err = f.validator.validate(unknown, client).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::UnsupportedGrantType));

        // non-extension clients never reach assertion handling
        let err = f.validator.validate(saml, code_client()).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::UnsupportedGrantType));
    }

    #[tokio::test]
    async fn test_over_long_code_is_invalid_request() {
        let f = fixture();
        let long = "x".repeat(101);
        let err = f.validator.validate(code_params(&long), code_client()).await.unwrap_err();
        assert_eq!(validation_error(err), (ErrorCode::InvalidRequest, ErrorType::Client));
    }
}
