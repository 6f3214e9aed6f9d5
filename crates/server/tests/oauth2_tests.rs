//! OAuth2 endpoint tests.
//!
//! Tests for the authorization server, both through HTTP and against the
//! code store, issuer and validator directly.

mod common;

use axum::http::{HeaderName, HeaderValue, header};
use common::*;
use flash_oauth2::entity::{oauth2_authorization, oauth2_refresh_token};
use flash_oauth2::error::{OAuthError, TokenError};
use flash_oauth2::oauth2::NewClient;
use flash_oauth2::oauth2::claims::{ACCESS_TOKEN_TYPE, AccessTokenClaims, IdTokenClaims};
use flash_oauth2::oauth2::{SigningKey, TokenValidator};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait, PaginatorTrait};
use serde_json::Value;
use time::{Duration, OffsetDateTime};
use url::Url;

fn query_param(location: &str, name: &str) -> Option<String> {
    Url::parse(location)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

fn location(response: &axum_test::TestResponse) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("location header")
        .to_string()
}

fn authorization_header(value: &str) -> (HeaderName, HeaderValue) {
    (
        header::AUTHORIZATION,
        HeaderValue::from_str(value).expect("header value"),
    )
}

fn claims_for(user_id: &str, scope: &str, exp: OffsetDateTime) -> AccessTokenClaims {
    let now = OffsetDateTime::now_utc();
    AccessTokenClaims {
        sub: user_id.to_string(),
        client_id: CLIENT_ID.to_string(),
        scope: scope.to_string(),
        iat: now.unix_timestamp(),
        exp: exp.unix_timestamp(),
        iss: ISSUER.to_string(),
        aud: CLIENT_ID.to_string(),
        jti: uuid::Uuid::new_v4().to_string(),
        token_type: ACCESS_TOKEN_TYPE.to_string(),
    }
}

// =============================================================================
// Code store, issuer and validator
// =============================================================================

#[tokio::test]
async fn test_code_exchanged_once_then_invalid_grant() {
    let state = create_test_state().await;

    let code = state
        .codes
        .create(CLIENT_ID, USER_ID, REDIRECT_URI, "openid profile")
        .await
        .expect("create code");
    assert_eq!(code.code.len(), 43);

    let grant = state
        .codes
        .redeem(&code.code, CLIENT_ID, REDIRECT_URI)
        .await
        .expect("first redemption");
    let token = state
        .issuer
        .issue_access_token(&grant.user_id, CLIENT_ID, &grant.scope)
        .expect("issue");
    let claims = state.validator.verify(&token).expect("verify");
    assert_eq!(claims.sub, "42");
    assert_eq!(claims.client_id, "c1");
    assert_eq!(claims.scope, "openid profile");

    let second = state
        .codes
        .redeem(&code.code, CLIENT_ID, REDIRECT_URI)
        .await;
    assert!(matches!(second, Err(OAuthError::InvalidGrant(_))));
}

#[tokio::test]
async fn test_code_bound_to_client_and_redirect_uri() {
    let state = create_test_state().await;
    let code = state
        .codes
        .create(CLIENT_ID, USER_ID, REDIRECT_URI, "openid")
        .await
        .expect("create code");

    let wrong_uri = state
        .codes
        .redeem(&code.code, CLIENT_ID, "https://x/other")
        .await;
    assert!(matches!(wrong_uri, Err(OAuthError::InvalidGrant(_))));
    let wrong_client = state.codes.redeem(&code.code, "c2", REDIRECT_URI).await;
    assert!(matches!(wrong_client, Err(OAuthError::InvalidGrant(_))));

    // Mismatched attempts leave the code redeemable by its owner.
    state
        .codes
        .redeem(&code.code, CLIENT_ID, REDIRECT_URI)
        .await
        .expect("redeem with matching triple");
}

#[tokio::test]
async fn test_expired_code_is_deleted_and_never_redeemable() {
    let state = create_test_state().await;
    let past = OffsetDateTime::now_utc() - Duration::minutes(11);
    oauth2_authorization::ActiveModel {
        code: Set("stale-code".to_string()),
        client_id: Set(CLIENT_ID.to_string()),
        user_id: Set(USER_ID.to_string()),
        redirect_uri: Set(REDIRECT_URI.to_string()),
        scope: Set("openid".to_string()),
        expires_at: Set(past + Duration::minutes(10)),
        created_at: Set(past),
    }
    .insert(state.db.as_ref())
    .await
    .expect("insert expired code");

    let first = state
        .codes
        .redeem("stale-code", CLIENT_ID, REDIRECT_URI)
        .await;
    assert!(matches!(
        first,
        Err(OAuthError::InvalidGrant("authorization code expired"))
    ));

    let row = oauth2_authorization::Entity::find_by_id("stale-code")
        .one(state.db.as_ref())
        .await
        .expect("query");
    assert!(row.is_none(), "expired code should be deleted");

    let retry = state
        .codes
        .redeem("stale-code", CLIENT_ID, REDIRECT_URI)
        .await;
    assert!(matches!(retry, Err(OAuthError::InvalidGrant(_))));
}

#[tokio::test]
async fn test_concurrent_redemption_has_one_winner() {
    let state = create_test_state().await;
    let code = state
        .codes
        .create(CLIENT_ID, USER_ID, REDIRECT_URI, "openid")
        .await
        .expect("create code");

    let (a, b) = tokio::join!(
        state.codes.redeem(&code.code, CLIENT_ID, REDIRECT_URI),
        state.codes.redeem(&code.code, CLIENT_ID, REDIRECT_URI),
    );
    assert_eq!(
        [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(),
        1,
        "exactly one redemption must succeed"
    );
}

#[tokio::test]
async fn test_refresh_token_reusable_until_expiry() {
    let state = create_test_state().await;
    let refresh_token = state
        .issuer
        .issue_refresh_token(CLIENT_ID, USER_ID, "openid profile")
        .await
        .expect("issue refresh token");

    // Not rotated: both uses succeed and mint independent access tokens.
    let first = state.issuer.refresh(&refresh_token).await.expect("first");
    let second = state.issuer.refresh(&refresh_token).await.expect("second");
    assert_eq!(first, second);
    assert_eq!(first.user_id, USER_ID);

    let t1 = state
        .issuer
        .issue_access_token(&first.user_id, &first.client_id, &first.scope)
        .expect("issue");
    let t2 = state
        .issuer
        .issue_access_token(&second.user_id, &second.client_id, &second.scope)
        .expect("issue");
    assert_ne!(t1, t2);
    let c1 = state.validator.verify(&t1).expect("t1 valid");
    let c2 = state.validator.verify(&t2).expect("t2 valid");
    assert_ne!(c1.jti, c2.jti);
}

#[tokio::test]
async fn test_unknown_refresh_token_is_invalid_grant() {
    let state = create_test_state().await;
    let result = state.issuer.refresh("no-such-token").await;
    assert!(matches!(result, Err(OAuthError::InvalidGrant(_))));
}

#[tokio::test]
async fn test_expired_refresh_token_is_deleted() {
    let state = create_test_state().await;
    let now = OffsetDateTime::now_utc();
    oauth2_refresh_token::ActiveModel {
        token: Set("stale-refresh".to_string()),
        client_id: Set(CLIENT_ID.to_string()),
        user_id: Set(USER_ID.to_string()),
        scope: Set("openid profile".to_string()),
        expires_at: Set(now - Duration::minutes(1)),
        created_at: Set(now - Duration::days(31)),
    }
    .insert(state.db.as_ref())
    .await
    .expect("insert refresh token");

    let result = state.issuer.refresh("stale-refresh").await;
    assert!(matches!(
        result,
        Err(OAuthError::InvalidGrant("refresh token expired"))
    ));

    let row = oauth2_refresh_token::Entity::find_by_id("stale-refresh")
        .one(state.db.as_ref())
        .await
        .expect("query");
    assert!(row.is_none());

    // Gone for good: the next attempt no longer finds it at all.
    assert!(matches!(
        state.issuer.refresh("stale-refresh").await,
        Err(OAuthError::InvalidGrant("invalid refresh token"))
    ));
}

#[tokio::test]
async fn test_token_signed_by_other_key_rejected() {
    let state = create_test_state().await;
    let other = SigningKey::generate("test-key").expect("generate");
    let forged = jsonwebtoken::encode(
        &other.header(),
        &claims_for(USER_ID, "openid", OffsetDateTime::now_utc() + Duration::hours(1)),
        other.encoding_key(),
    )
    .expect("encode");

    assert!(matches!(
        state.validator.verify(&forged),
        Err(TokenError::Jwt(_))
    ));
    assert!(!state.validator.introspect(&forged).active);
}

#[tokio::test]
async fn test_hmac_token_rejected() {
    let state = create_test_state().await;
    let token = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims_for(USER_ID, "openid", OffsetDateTime::now_utc() + Duration::hours(1)),
        &EncodingKey::from_secret(b"guessable"),
    )
    .expect("encode");

    assert!(state.validator.verify(&token).is_err());
}

#[tokio::test]
async fn test_expired_access_token_rejected() {
    let state = create_test_state().await;
    let key = signing_key();
    let token = jsonwebtoken::encode(
        &key.header(),
        &claims_for(USER_ID, "openid", OffsetDateTime::now_utc() - Duration::hours(2)),
        key.encoding_key(),
    )
    .expect("encode");

    assert!(state.validator.verify(&token).is_err());
    assert!(!state.validator.introspect(&token).active);
}

#[tokio::test]
async fn test_access_token_expired_seconds_ago_rejected() {
    let state = create_test_state().await;
    let key = signing_key();
    let token = jsonwebtoken::encode(
        &key.header(),
        &claims_for(USER_ID, "openid", OffsetDateTime::now_utc() - Duration::seconds(30)),
        key.encoding_key(),
    )
    .expect("encode");

    assert!(matches!(
        state.validator.verify(&token),
        Err(TokenError::Jwt(_))
    ));
    assert!(!state.validator.introspect(&token).active);
}

#[tokio::test]
async fn test_id_token_is_not_an_access_token() {
    let state = create_test_state().await;
    let user = state
        .find_user(USER_ID)
        .await
        .expect("query")
        .expect("user exists");
    let id_token = state
        .issuer
        .issue_id_token(&user, CLIENT_ID)
        .expect("issue id token");

    assert!(matches!(
        state.validator.verify(&id_token),
        Err(TokenError::WrongTokenType(_))
    ));
}

#[tokio::test]
async fn test_validator_with_other_issuer_rejects() {
    let state = create_test_state().await;
    let token = state
        .issuer
        .issue_access_token(USER_ID, CLIENT_ID, "openid")
        .expect("issue");
    let validator = TokenValidator::new(signing_key(), "https://elsewhere.example.com");
    assert!(validator.verify(&token).is_err());
}

#[tokio::test]
async fn test_introspect_never_fails() {
    let state = create_test_state().await;
    for garbage in ["", "abc", "a.b.c", "eyJhbGciOiJub25lIn0.e30.", "\u{0}\u{1}"] {
        let response = state.validator.introspect(garbage);
        assert!(!response.active);
        assert!(response.sub.is_none());
    }
}

// =============================================================================
// Authorization Endpoint Tests
// =============================================================================

#[tokio::test]
async fn test_authorize_invalid_client() {
    let state = create_test_state().await;
    let server = test_server(&state, None);

    let response = server
        .get("/oauth2/authorize")
        .add_query_param("response_type", "code")
        .add_query_param("client_id", "nonexistent-client")
        .await;

    response.assert_status_unauthorized();
    let body: Value = response.json();
    assert_eq!(body["error"], "invalid_client");
}

#[tokio::test]
async fn test_authorize_unregistered_redirect_uri_is_not_followed() {
    let state = create_test_state().await;
    let server = test_server(&state, Some(USER_ID));

    let response = server
        .get("/oauth2/authorize")
        .add_query_param("response_type", "code")
        .add_query_param("client_id", CLIENT_ID)
        .add_query_param("redirect_uri", "http://evil.com/callback")
        .await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn test_authorize_bad_response_type_redirects_with_error() {
    let state = create_test_state().await;
    let server = test_server(&state, Some(USER_ID));

    let response = server
        .get("/oauth2/authorize")
        .add_query_param("response_type", "token")
        .add_query_param("client_id", CLIENT_ID)
        .add_query_param("redirect_uri", REDIRECT_URI)
        .add_query_param("state", "xyz")
        .await;

    response.assert_status_see_other();
    let location = location(&response);
    assert!(location.starts_with(REDIRECT_URI));
    assert_eq!(
        query_param(&location, "error").as_deref(),
        Some("unsupported_response_type")
    );
    assert_eq!(query_param(&location, "state").as_deref(), Some("xyz"));
    assert!(query_param(&location, "code").is_none());
}

#[tokio::test]
async fn test_authorize_without_session_redirects_to_login() {
    let state = create_test_state().await;
    let server = test_server(&state, None);

    let response = server
        .get("/oauth2/authorize")
        .add_query_param("response_type", "code")
        .add_query_param("client_id", CLIENT_ID)
        .add_query_param("redirect_uri", REDIRECT_URI)
        .add_query_param("scope", "openid")
        .add_query_param("state", "random-state")
        .await;

    response.assert_status_see_other();
    let location = location(&response);
    assert!(location.starts_with(LOGIN_URL));
    assert_eq!(query_param(&location, "client_id").as_deref(), Some("c1"));
    assert_eq!(
        query_param(&location, "redirect_uri").as_deref(),
        Some(REDIRECT_URI)
    );
    assert_eq!(
        query_param(&location, "state").as_deref(),
        Some("random-state")
    );
}

#[tokio::test]
async fn test_authorize_defaults_redirect_uri_and_scope() {
    let state = create_test_state().await;
    let server = test_server(&state, Some(USER_ID));

    let response = server
        .get("/oauth2/authorize")
        .add_query_param("response_type", "code")
        .add_query_param("client_id", CLIENT_ID)
        .await;

    response.assert_status_see_other();
    let location = location(&response);
    assert!(location.starts_with(REDIRECT_URI));
    let code = query_param(&location, "code").expect("code");

    let grant = state
        .codes
        .redeem(&code, CLIENT_ID, REDIRECT_URI)
        .await
        .expect("redeem");
    assert_eq!(grant.scope, "openid profile");
    assert_eq!(grant.user_id, USER_ID);
}

// =============================================================================
// Token Endpoint Tests
// =============================================================================

#[tokio::test]
async fn test_full_authorization_code_flow() {
    let state = create_test_state().await;
    let server = test_server(&state, Some(USER_ID));

    let response = server
        .get("/oauth2/authorize")
        .add_query_param("response_type", "code")
        .add_query_param("client_id", CLIENT_ID)
        .add_query_param("redirect_uri", REDIRECT_URI)
        .add_query_param("scope", "openid profile")
        .add_query_param("state", "xyz")
        .await;
    response.assert_status_see_other();
    let location = location(&response);
    assert_eq!(query_param(&location, "state").as_deref(), Some("xyz"));
    let code = query_param(&location, "code").expect("code");

    let (name, value) = authorization_header(&basic_auth(CLIENT_ID, CLIENT_SECRET));
    let response = server
        .post("/oauth2/token")
        .add_header(name.clone(), value.clone())
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", REDIRECT_URI),
        ])
        .await;

    response.assert_status_ok();
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-store"
    );
    let body: Value = response.json();
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 3600);
    assert_eq!(body["scope"], "openid profile");
    assert!(body["refresh_token"].is_string());

    let access_token = body["access_token"].as_str().expect("access_token");
    let claims = state.validator.verify(access_token).expect("valid");
    assert_eq!(claims.sub, "42");

    let id_token = body["id_token"].as_str().expect("id_token");
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[CLIENT_ID]);
    validation.set_issuer(&[ISSUER]);
    let id_claims = jsonwebtoken::decode::<IdTokenClaims>(
        id_token,
        signing_key().decoding_key(),
        &validation,
    )
    .expect("id token verifies")
    .claims;
    assert_eq!(id_claims.sub, USER_ID);
    assert_eq!(id_claims.phone, USER_PHONE);

    // Second exchange of the same code.
    let response = server
        .post("/oauth2/token")
        .add_header(name, value)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", REDIRECT_URI),
        ])
        .await;
    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"], "invalid_grant");
}

#[tokio::test]
async fn test_failed_code_grant_leaves_no_refresh_token() {
    let state = create_test_state().await;
    let server = test_server(&state, None);
    // No such user, so the ID token cannot be built.
    let code = state
        .codes
        .create(CLIENT_ID, "ghost", REDIRECT_URI, "openid profile")
        .await
        .expect("create code");

    let response = server
        .post("/oauth2/token")
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code.code.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
        ])
        .await;

    response.assert_status(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["error"], "server_error");

    let stored = oauth2_refresh_token::Entity::find()
        .count(state.db.as_ref())
        .await
        .expect("count");
    assert_eq!(stored, 0);
}

#[tokio::test]
async fn test_token_without_openid_has_no_id_token() {
    let state = create_test_state().await;
    let server = test_server(&state, None);
    let code = state
        .codes
        .create(CLIENT_ID, USER_ID, REDIRECT_URI, "profile")
        .await
        .expect("create code");

    let response = server
        .post("/oauth2/token")
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code.code.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
        ])
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert!(body.get("id_token").is_none());
}

#[tokio::test]
async fn test_token_missing_client_id() {
    let state = create_test_state().await;
    let server = test_server(&state, None);

    let response = server
        .post("/oauth2/token")
        .form(&[("grant_type", "authorization_code"), ("code", "test-code")])
        .await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn test_token_wrong_secret() {
    let state = create_test_state().await;
    let server = test_server(&state, None);

    let response = server
        .post("/oauth2/token")
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", "test-code"),
            ("redirect_uri", REDIRECT_URI),
            ("client_id", CLIENT_ID),
            ("client_secret", "not-the-secret"),
        ])
        .await;

    response.assert_status_unauthorized();
    let body: Value = response.json();
    assert_eq!(body["error"], "invalid_client");
}

#[tokio::test]
async fn test_token_unsupported_grant_type() {
    let state = create_test_state().await;
    let server = test_server(&state, None);

    let response = server
        .post("/oauth2/token")
        .form(&[
            ("grant_type", "password"),
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
        ])
        .await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"], "unsupported_grant_type");
}

#[tokio::test]
async fn test_token_missing_code() {
    let state = create_test_state().await;
    let server = test_server(&state, None);

    let response = server
        .post("/oauth2/token")
        .form(&[
            ("grant_type", "authorization_code"),
            ("redirect_uri", REDIRECT_URI),
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
        ])
        .await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn test_grant_not_allowed_for_client() {
    let state = create_test_state().await;
    let mut client = NewClient::new("code-only", "secret", vec![REDIRECT_URI.to_string()]);
    client.grant_types = vec!["authorization_code".to_string()];
    state.clients.register(client).await.expect("register");
    let server = test_server(&state, None);

    let response = server
        .post("/oauth2/token")
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", "whatever"),
            ("client_id", "code-only"),
            ("client_secret", "secret"),
        ])
        .await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"], "unauthorized_client");
}

#[tokio::test]
async fn test_refresh_grant_over_http() {
    let state = create_test_state().await;
    let server = test_server(&state, None);
    let refresh_token = state
        .issuer
        .issue_refresh_token(CLIENT_ID, USER_ID, "openid profile")
        .await
        .expect("issue refresh token");

    for _ in 0..2 {
        let response = server
            .post("/oauth2/token")
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", CLIENT_ID),
                ("client_secret", CLIENT_SECRET),
            ])
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert!(body.get("refresh_token").is_none());
        assert!(body["id_token"].is_string());
        let claims = state
            .validator
            .verify(body["access_token"].as_str().expect("access_token"))
            .expect("valid");
        assert_eq!(claims.sub, USER_ID);
    }
}

#[tokio::test]
async fn test_refresh_token_from_other_client_rejected() {
    let state = create_test_state().await;
    state
        .clients
        .register(NewClient::new("c2", "s2", vec!["https://y/cb".to_string()]))
        .await
        .expect("register");
    let refresh_token = state
        .issuer
        .issue_refresh_token(CLIENT_ID, USER_ID, "openid")
        .await
        .expect("issue refresh token");
    let server = test_server(&state, None);

    let response = server
        .post("/oauth2/token")
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", "c2"),
            ("client_secret", "s2"),
        ])
        .await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"], "invalid_grant");
}

// =============================================================================
// Introspection, UserInfo and discovery
// =============================================================================

#[tokio::test]
async fn test_introspect_endpoint() {
    let state = create_test_state().await;
    let server = test_server(&state, None);
    let token = state
        .issuer
        .issue_access_token(USER_ID, CLIENT_ID, "openid profile")
        .expect("issue");

    let response = server
        .post("/oauth2/introspect")
        .form(&[("token", token.as_str())])
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["active"], true);
    assert_eq!(body["sub"], "42");
    assert_eq!(body["client_id"], "c1");
    assert_eq!(body["scope"], "openid profile");

    let response = server
        .post("/oauth2/introspect")
        .form(&[("token", "not-a-jwt")])
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body, serde_json::json!({ "active": false }));

    let response = server
        .post("/oauth2/introspect")
        .form(&[("token_type_hint", "access_token")])
        .await;
    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn test_userinfo() {
    let state = create_test_state().await;
    let server = test_server(&state, None);

    let response = server.get("/oauth2/userinfo").await;
    response.assert_status_unauthorized();

    let token = state
        .issuer
        .issue_access_token(USER_ID, CLIENT_ID, "openid")
        .expect("issue");
    let (name, value) = authorization_header(&format!("Bearer {token}"));
    let response = server.get("/oauth2/userinfo").add_header(name, value).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["sub"], USER_ID);
    assert_eq!(body["phone"], USER_PHONE);

    let token = state
        .issuer
        .issue_access_token(USER_ID, CLIENT_ID, "profile")
        .expect("issue");
    let (name, value) = authorization_header(&format!("Bearer {token}"));
    let response = server.get("/oauth2/userinfo").add_header(name, value).await;
    response.assert_status_forbidden();
    let body: Value = response.json();
    assert_eq!(body["error"], "insufficient_scope");
}

#[tokio::test]
async fn test_jwks_publishes_signing_key() {
    let state = create_test_state().await;
    let server = test_server(&state, None);
    let token = state
        .issuer
        .issue_access_token(USER_ID, CLIENT_ID, "openid")
        .expect("issue");

    let response = server.get("/.well-known/jwks.json").await;
    response.assert_status_ok();
    let body: Value = response.json();
    let keys = body["keys"].as_array().expect("keys");
    assert_eq!(keys.len(), 1);
    let jwk = &keys[0];
    assert_eq!(jwk["kty"], "RSA");
    assert_eq!(jwk["use"], "sig");
    assert_eq!(jwk["alg"], "RS256");
    assert_eq!(jwk["kid"], "test-key");
    assert_eq!(jwk["e"], "AQAB");

    // The published key verifies what the server just signed.
    let decoding = DecodingKey::from_rsa_components(
        jwk["n"].as_str().expect("n"),
        jwk["e"].as_str().expect("e"),
    )
    .expect("decoding key");
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_aud = false;
    let claims = jsonwebtoken::decode::<AccessTokenClaims>(&token, &decoding, &validation)
        .expect("verifies with JWKS")
        .claims;
    assert_eq!(claims.sub, USER_ID);
    assert_eq!(
        jsonwebtoken::decode_header(&token).expect("header").kid,
        Some("test-key".to_string())
    );
}

#[tokio::test]
async fn test_openid_configuration() {
    let state = create_test_state().await;
    let server = test_server(&state, None);

    let response = server.get("/.well-known/openid-configuration").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["issuer"], ISSUER);
    assert_eq!(
        body["token_endpoint"],
        format!("{ISSUER}/oauth2/token")
    );
    assert_eq!(
        body["jwks_uri"],
        format!("{ISSUER}/.well-known/jwks.json")
    );
}

#[tokio::test]
async fn test_health_and_api_docs() {
    let state = create_test_state().await;
    let server = test_server(&state, None);

    let response = server.get("/healthz").await;
    response.assert_status_ok();
    response.assert_text("ok");

    server.get("/api-docs").await.assert_status_ok();
}
