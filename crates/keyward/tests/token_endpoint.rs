//! Token endpoint integration tests
//!
//! Tests the back-channel pipeline end to end:
//! - Authorization code redemption with client authentication
//! - Cross-client and replayed codes
//! - Client credentials with reference tokens
//! - Resource owner password grant

mod common;

use common::*;
use keyward::models::{Parameters, TokenMetadata, UserConsent};
use keyward::stores::TokenHandleStore;
use keyward::validation::{CredentialSource, parse_client_credentials};
use keyward::{ErrorCode, ErrorType};
use pretty_assertions::assert_eq;

async fn issue_code(server: &TestServer, client_id: &str, scope: &str) -> String {
    let consent: Vec<&str> = scope.split(' ').collect();
    server
        .authorize(
            authorize_params(client_id, "code", scope),
            alice(),
            Some(UserConsent::granted(consent)),
        )
        .await
        .unwrap()
        .response()
        .code
        .expect("code issued")
}

#[tokio::test]
async fn test_code_round_trip() {
    let server = TestServer::new();

    // GIVEN: a code issued for openid and a resource scope
    let code = issue_code(&server, "codeclient", "openid profile api1 offline_access").await;

    // WHEN: the client redeems it
    let response = server.token(code_redemption("codeclient", &code)).await.unwrap();

    // THEN: access, identity and refresh tokens come back
    assert_eq!(response.token_type, "Bearer");
    assert_eq!(response.expires_in, 3600);
    assert_eq!(response.scope, "openid profile api1 offline_access");
    assert!(response.refresh_token.is_some());

    let access = server
        .token_validator
        .validate_access_token(&response.access_token, Some("api1"))
        .await
        .unwrap();
    assert_eq!(access.subject_id(), Some("818727"));
    assert_eq!(access.client_id, "codeclient");

    let id_token = response.identity_token.expect("id_token");
    let identity = server
        .token_validator
        .validate_identity_token(&id_token, "codeclient")
        .await
        .unwrap();
    assert_eq!(identity.subject_id(), Some("818727"));
    assert!(identity.claims.iter().any(|c| c.claim_type == "nonce"));
    assert!(identity.claims.iter().any(|c| c.claim_type == "at_hash"));

    // AND: the code is gone
    assert!(server.codes.is_empty());
}

#[tokio::test]
async fn test_code_without_openid_has_no_identity_token() {
    let server = TestServer::new();
    let code = issue_code(&server, "codeclient", "api1").await;

    let response = server.token(code_redemption("codeclient", &code)).await.unwrap();
    assert!(response.identity_token.is_none());
    assert!(response.refresh_token.is_none());
    assert_eq!(response.scope, "api1");
}

#[tokio::test]
async fn test_code_cannot_be_redeemed_twice() {
    let server = TestServer::new();
    let code = issue_code(&server, "codeclient", "openid api1").await;

    server.token(code_redemption("codeclient", &code)).await.unwrap();
    let err = server.token(code_redemption("codeclient", &code)).await.unwrap_err();

    assert_eq!(err.code(), Some(ErrorCode::InvalidGrant));
    assert_eq!(err.error_type(), Some(ErrorType::Client));
}

#[tokio::test]
async fn test_code_issued_to_other_client_is_invalid_grant() {
    let server = TestServer::new();

    // GIVEN: a code issued to codeclient
    let code = issue_code(&server, "codeclient", "openid api1").await;

    // WHEN: another authenticated client presents it
    let err = server.token(code_redemption("reuseclient", &code)).await.unwrap_err();

    // THEN: invalid_grant, and the code is burned
    assert_eq!(err.code(), Some(ErrorCode::InvalidGrant));
    let err = server.token(code_redemption("codeclient", &code)).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidGrant));
}

#[tokio::test]
async fn test_redirect_uri_must_match() {
    let server = TestServer::new();
    let code = issue_code(&server, "codeclient", "openid api1").await;

    let mut params = code_redemption("codeclient", &code);
    params.insert("redirect_uri", "https://server/other");
    let err = server.token(params).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::UnauthorizedClient));
}

#[tokio::test]
async fn test_wrong_secret_is_invalid_client() {
    let server = TestServer::new();
    let code = issue_code(&server, "codeclient", "openid api1").await;

    let mut params = code_redemption("codeclient", &code);
    params.insert("client_secret", "wrong");
    let err = server.token(params).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidClient));

    // The code was never touched
    assert_eq!(server.codes.len(), 1);
}

#[tokio::test]
async fn test_basic_authentication() {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    let server = TestServer::new();
    let code = issue_code(&server, "codeclient", "openid api1").await;

    let header = format!("Basic {}", STANDARD.encode(format!("codeclient:{SECRET}")));
    let body = params(&[
        ("grant_type", "authorization_code"),
        ("code", &code),
        ("redirect_uri", REDIRECT_URI),
    ]);

    let credentials = parse_client_credentials(Some(&header), &body, None);
    assert_eq!(
        credentials.credential.as_ref().map(|c| c.source),
        Some(CredentialSource::BasicAuthentication)
    );

    let client = server.client_validator.validate(&credentials).await.unwrap();
    let request = server.token_requests.validate(body, client).await.unwrap();
    let response = server.token_responses.process(&request).await.unwrap();
    assert!(response.identity_token.is_some());
}

#[tokio::test]
async fn test_client_credentials_issue_reference_tokens() {
    let server = TestServer::new();
    let params = params(&[
        ("grant_type", "client_credentials"),
        ("client_id", "svcclient"),
        ("client_secret", SECRET),
        ("scope", "api1"),
    ]);

    let response = server.token(params).await.unwrap();
    assert_eq!(response.scope, "api1");
    assert!(response.refresh_token.is_none());
    assert!(response.identity_token.is_none());

    // Reference tokens are opaque handles into the handle store
    assert!(!response.access_token.contains('.'));
    let stored = server.handles.get(&response.access_token).await.unwrap().unwrap();
    assert_eq!(stored.client_id, "svcclient");
    assert_eq!(stored.subject_id(), None);

    let validated = server
        .token_validator
        .validate_access_token(&response.access_token, Some("api1"))
        .await
        .unwrap();
    assert_eq!(validated.client_id, "svcclient");

    let err = server
        .token_validator
        .validate_access_token(&response.access_token, Some("api2"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InsufficientScope));
}

#[tokio::test]
async fn test_client_credentials_scope_rules() {
    let server = TestServer::new();
    let request = |scope: &str| -> Parameters {
        params(&[
            ("grant_type", "client_credentials"),
            ("client_id", "svcclient"),
            ("client_secret", SECRET),
            ("scope", scope),
        ])
    };

    // Not on the client's allow-list
    let err = server.token(request("api1 openid")).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidScope));

    // Missing
    let mut missing = request("api1");
    missing.remove("scope");
    let err = server.token(missing).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidScope));
}

#[tokio::test]
async fn test_grant_not_allowed_for_flow() {
    let server = TestServer::new();
    let params = params(&[
        ("grant_type", "client_credentials"),
        ("client_id", "codeclient"),
        ("client_secret", SECRET),
        ("scope", "api1"),
    ]);

    let err = server.token(params).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::UnauthorizedClient));
}

#[tokio::test]
async fn test_unsupported_grant_type() {
    let server = TestServer::new();
    let params = params(&[
        ("grant_type", "urn:example:unknown"),
        ("client_id", "codeclient"),
        ("client_secret", SECRET),
    ]);

    let err = server.token(params).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::UnsupportedGrantType));
}

#[tokio::test]
async fn test_password_grant() {
    let server = TestServer::new();
    let request = |password: &str| -> Parameters {
        params(&[
            ("grant_type", "password"),
            ("client_id", "roclient"),
            ("client_secret", SECRET),
            ("username", "bob"),
            ("password", password),
            ("scope", "api1 offline_access"),
        ])
    };

    let response = server.token(request("bob")).await.unwrap();
    assert_eq!(response.scope, "api1 offline_access");
    assert!(response.refresh_token.is_some());
    assert!(response.identity_token.is_none());

    let access = server
        .token_validator
        .validate_access_token(&response.access_token, None)
        .await
        .unwrap();
    assert_eq!(access.subject_id(), Some("88421113"));

    let err = server.token(request("wrong")).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidGrant));
}
