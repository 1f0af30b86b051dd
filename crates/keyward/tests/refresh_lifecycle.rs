//! Refresh token lifecycle tests
//!
//! Tests refresh tokens from issuance to expiry:
//! - One-time-only rotation and replay of the old handle
//! - Reusable handles and their version counter
//! - Sliding renewal bounded by the absolute lifetime
//! - Expiry and bulk revocation

mod common;

use chrono::Duration;
use common::*;
use keyward::models::{TokenMetadata, UserConsent};
use keyward::stores::RefreshTokenStore;
use keyward::{ErrorCode, TokenResponse};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

const OFFLINE_SCOPE: &str = "openid api1 offline_access";

async fn redeem_offline_code(server: &TestServer, client_id: &str) -> TokenResponse {
    let code = server
        .authorize(
            authorize_params(client_id, "code", OFFLINE_SCOPE),
            alice(),
            Some(UserConsent::granted(["openid", "api1", "offline_access"])),
        )
        .await
        .unwrap()
        .response()
        .code
        .unwrap();
    server.token(code_redemption(client_id, &code)).await.unwrap()
}

/// Pretend the refresh token behind `handle` was issued `seconds` ago
async fn age_refresh_token(server: &TestServer, handle: &str, seconds: i64) {
    let mut token = server.refresh_tokens.get(handle).await.unwrap().unwrap();
    token.creation_time -= Duration::seconds(seconds);
    server.refresh_tokens.store(handle, token).await.unwrap();
}

#[tokio::test]
async fn test_one_time_only_handle_rotates() {
    let server = TestServer::new();
    let first = redeem_offline_code(&server, "codeclient").await;
    let handle = first.refresh_token.unwrap();

    // WHEN: the refresh token is used
    let second = server.token(refresh_redemption("codeclient", &handle)).await.unwrap();

    // THEN: a new handle replaces the old one
    let rotated = second.refresh_token.unwrap();
    assert_ne!(rotated, handle);
    assert_ne!(second.access_token, first.access_token);
    assert_eq!(second.scope, OFFLINE_SCOPE);
    assert!(second.identity_token.is_none());
    assert_eq!(server.refresh_tokens.len(), 1);

    let access = server
        .token_validator
        .validate_access_token(&second.access_token, Some("api1"))
        .await
        .unwrap();
    assert_eq!(access.subject_id(), Some("818727"));

    // AND: the old handle is dead
    let err = server
        .token(refresh_redemption("codeclient", &handle))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidGrant));

    // AND: the rotated one carries the incremented version
    let stored = server.refresh_tokens.get(&rotated).await.unwrap().unwrap();
    assert_eq!(stored.version, 2);
}

#[tokio::test]
async fn test_interleaved_uses_of_one_time_handle() {
    let server = TestServer::new();
    let handle = redeem_offline_code(&server, "codeclient")
        .await
        .refresh_token
        .unwrap();

    // GIVEN: two requests with the same handle both pass validation
    let mut validated = Vec::new();
    for _ in 0..2 {
        let params = refresh_redemption("codeclient", &handle);
        let client = server
            .client_validator
            .validate(&form_credentials(&params))
            .await
            .unwrap();
        validated.push(server.token_requests.validate(params, client).await.unwrap());
    }

    // WHEN: both are processed
    let first = server.token_responses.process(&validated[0]).await;
    let second = server.token_responses.process(&validated[1]).await;

    // THEN: only the first rotation survives
    let rotated = first.unwrap().refresh_token.unwrap();
    assert_eq!(second.unwrap_err().code(), Some(ErrorCode::InvalidGrant));
    assert_eq!(server.refresh_tokens.len(), 1);
    assert!(server.refresh_tokens.get(&rotated).await.unwrap().is_some());
}

#[tokio::test]
async fn test_reusable_handle_survives_use() {
    let server = TestServer::new();
    let first = redeem_offline_code(&server, "reuseclient").await;
    let handle = first.refresh_token.unwrap();

    for expected_version in 2..=4 {
        let response = server
            .token(refresh_redemption("reuseclient", &handle))
            .await
            .unwrap();
        assert_eq!(response.refresh_token.as_deref(), Some(handle.as_str()));

        let stored = server.refresh_tokens.get(&handle).await.unwrap().unwrap();
        assert_eq!(stored.version, expected_version);
        // Absolute expiration never moves
        assert_eq!(stored.lifetime, 2_592_000);
    }
}

#[tokio::test]
async fn test_refresh_token_bound_to_client() {
    let server = TestServer::new();
    let handle = redeem_offline_code(&server, "codeclient")
        .await
        .refresh_token
        .unwrap();

    let err = server
        .token(refresh_redemption("reuseclient", &handle))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidGrant));
}

#[tokio::test]
async fn test_sliding_renewal_keeps_issuance_time() {
    let server = TestServer::new();
    let handle = redeem_offline_code(&server, "codeclient")
        .await
        .refresh_token
        .unwrap();
    let issued = server.refresh_tokens.get(&handle).await.unwrap().unwrap();
    assert_eq!(issued.lifetime, 1_296_000);

    // GIVEN: ten days have passed
    age_refresh_token(&server, &handle, 864_000).await;

    // WHEN: the token is used
    let rotated = server
        .token(refresh_redemption("codeclient", &handle))
        .await
        .unwrap()
        .refresh_token
        .unwrap();

    // THEN: the lifetime slides but the issuance time stays
    let renewed = server.refresh_tokens.get(&rotated).await.unwrap().unwrap();
    assert!((2_160_000..=2_160_001).contains(&renewed.lifetime));
    assert_eq!(
        renewed.creation_time,
        issued.creation_time - Duration::seconds(864_000)
    );
}

#[tokio::test]
async fn test_sliding_renewal_capped_at_absolute() {
    let server = TestServer::new();
    let handle = redeem_offline_code(&server, "codeclient")
        .await
        .refresh_token
        .unwrap();

    // Within the sliding window of use but close to the absolute ceiling
    age_refresh_token(&server, &handle, 2_000_000).await;
    let mut token = server.refresh_tokens.get(&handle).await.unwrap().unwrap();
    token.lifetime = 2_100_000;
    server.refresh_tokens.store(&handle, token).await.unwrap();

    let rotated = server
        .token(refresh_redemption("codeclient", &handle))
        .await
        .unwrap()
        .refresh_token
        .unwrap();

    let renewed = server.refresh_tokens.get(&rotated).await.unwrap().unwrap();
    assert_eq!(renewed.lifetime, 2_592_000);
}

#[tokio::test]
async fn test_expired_refresh_token_is_removed() {
    let server = TestServer::new();
    let handle = redeem_offline_code(&server, "reuseclient")
        .await
        .refresh_token
        .unwrap();

    age_refresh_token(&server, &handle, 2_592_001).await;

    let err = server
        .token(refresh_redemption("reuseclient", &handle))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidGrant));
    assert!(server.refresh_tokens.get(&handle).await.unwrap().is_none());
}

#[tokio::test]
async fn test_revoke_all_for_subject_and_client() {
    let server = TestServer::new();
    redeem_offline_code(&server, "reuseclient").await;
    redeem_offline_code(&server, "reuseclient").await;
    let kept = redeem_offline_code(&server, "codeclient")
        .await
        .refresh_token
        .unwrap();

    let removed = server
        .refresh_service
        .revoke_all("818727", "reuseclient")
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert!(server.refresh_tokens.get(&kept).await.unwrap().is_some());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_sliding_lifetime_never_exceeds_absolute(ages in proptest::collection::vec(0i64..1_000_000, 1..5)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let server = TestServer::new();
            let mut handle = redeem_offline_code(&server, "codeclient")
                .await
                .refresh_token
                .unwrap();
            let mut total = 0i64;

            for age in ages {
                total += age;
                age_refresh_token(&server, &handle, age).await;

                // Lifetimes of a sliding token may have lapsed by now
                let token = server.refresh_tokens.get(&handle).await.unwrap().unwrap();
                if i64::from(token.lifetime) <= total {
                    break;
                }

                handle = server
                    .token(refresh_redemption("codeclient", &handle))
                    .await
                    .unwrap()
                    .refresh_token
                    .unwrap();
                let renewed = server.refresh_tokens.get(&handle).await.unwrap().unwrap();
                let expected = (total + 1_296_000).min(2_592_000);
                assert!(renewed.lifetime <= 2_592_000);
                // Allow for the second boundary crossing during the call
                assert!((i64::from(renewed.lifetime) - expected).abs() <= 1);
            }
        });
    }
}
