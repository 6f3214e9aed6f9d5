//! OAuth2 HTTP endpoints.
//!
//! Implements the OAuth2 authorization server endpoints:
//! - Authorization endpoint
//! - Token endpoint
//! - Token introspection
//! - UserInfo (OpenID Connect)
//! - JWKS and discovery documents

use crate::api::auth::{AuthError, BearerAuth};
use crate::entity::oauth2_client;
use crate::error::{ErrorResponse, OAuthError};
use crate::oauth2::claims::scope_contains;
use crate::oauth2::keys::Jwks;
use crate::oauth2::validator::IntrospectionResponse;
use crate::oauth2::{ACCESS_TOKEN_LIFETIME, OAUTH2_TAG, state::OAuth2State};
use axum::{
    Extension, Form, Json,
    extract::{Query, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Redirect, Response},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Creates the OAuth2 router, nested under `/oauth2`.
pub fn router(state: OAuth2State) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(authorize))
        .routes(routes!(token))
        .routes(routes!(introspect))
        .routes(routes!(userinfo))
        .with_state(state)
}

/// Creates the router for the `/.well-known` documents, mounted at the root.
pub fn well_known_router(state: OAuth2State) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(jwks))
        .routes(routes!(openid_configuration))
        .with_state(state)
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// The end user authenticated by an upstream login layer.
///
/// Whatever fronts `/oauth2/authorize` inserts this as a request extension
/// once the user has logged in.
#[derive(Clone, Debug)]
pub struct SessionUser {
    pub user_id: String,
}

/// OAuth2 authorization request parameters.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct AuthorizeRequest {
    /// Must be "code" for Authorization Code flow
    pub response_type: Option<String>,
    /// Client identifier issued during registration
    pub client_id: String,
    /// Redirect URI (must match registered URI)
    pub redirect_uri: Option<String>,
    /// Space-separated list of requested scopes
    pub scope: Option<String>,
    /// Opaque value for CSRF protection
    pub state: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    pub scope: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct IntrospectRequest {
    pub token: Option<String>,
    pub token_type_hint: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserInfoResponse {
    pub sub: String,
    pub phone: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OpenIdConfiguration {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub introspection_endpoint: String,
    pub jwks_uri: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub claims_supported: Vec<String>,
}

// =============================================================================
// Endpoints
// =============================================================================

/// OAuth2 Authorization endpoint.
#[tracing::instrument(skip(state, session))]
#[utoipa::path(
    get,
    path = "/authorize",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Authorize",
    summary = "Initiate OAuth2 authorization flow",
    description = "Starts the OAuth2 Authorization Code flow.\n\n\
                   Unknown clients and unregistered redirect URIs are reported directly. Once the \
                   redirect URI is validated, further errors are sent back to it with `error` and \
                   `state` query parameters.\n\n\
                   Users without a session are redirected to the login page with the authorization \
                   parameters attached. Authenticated users are redirected to the client's \
                   redirect_uri with a single-use authorization code valid for 10 minutes.",
    params(
        ("response_type" = String, Query, description = "OAuth2 response type. Must be `code`."),
        ("client_id" = String, Query, description = "The client identifier issued during client registration."),
        ("redirect_uri" = Option<String>, Query, description = "Must exactly match a registered redirect URI. Defaults to the first registered URI."),
        ("scope" = Option<String>, Query, description = "Space-separated list of requested scopes. Defaults to the client's scope."),
        ("state" = Option<String>, Query, description = "Opaque value for CSRF protection. Returned unchanged in the redirect."),
    ),
    responses(
        (status = 303, description = "Redirect to login page or back to client with authorization code or error"),
        (status = 400, description = "Invalid redirect_uri", body = ErrorResponse),
        (status = 401, description = "Unknown client_id", body = ErrorResponse),
    )
)]
pub async fn authorize(
    State(state): State<OAuth2State>,
    session: Option<Extension<SessionUser>>,
    Query(params): Query<AuthorizeRequest>,
) -> Result<Response, OAuthError> {
    let client = state.clients.resolve(&params.client_id).await?;

    let redirect_uri = match &params.redirect_uri {
        Some(uri) if client.is_redirect_uri_allowed(uri) => uri.clone(),
        Some(_) => {
            return Err(OAuthError::invalid_request(
                "redirect_uri is not registered for this client",
            ));
        }
        None => client
            .redirect_uris_list()
            .into_iter()
            .next()
            .ok_or_else(|| OAuthError::invalid_request("No redirect_uri configured"))?,
    };

    let csrf_state = params.state.as_deref();
    match params.response_type.as_deref() {
        Some("code") if client.is_response_type_allowed("code") => {}
        Some("code") => {
            return Ok(error_redirect(
                &redirect_uri,
                csrf_state,
                &OAuthError::UnauthorizedClient("client may not use response_type=code"),
            ));
        }
        Some(_) => {
            return Ok(error_redirect(
                &redirect_uri,
                csrf_state,
                &OAuthError::UnsupportedResponseType,
            ));
        }
        None => {
            return Ok(error_redirect(
                &redirect_uri,
                csrf_state,
                &OAuthError::invalid_request("response_type is required"),
            ));
        }
    }

    let scope = params
        .scope
        .clone()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| client.scope.clone());

    let Some(Extension(session)) = session else {
        let mut login = Url::parse(&state.login_url).map_err(OAuthError::server_error)?;
        login
            .query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &client.id)
            .append_pair("redirect_uri", &redirect_uri)
            .append_pair("scope", &scope);
        if let Some(s) = csrf_state {
            login.query_pairs_mut().append_pair("state", s);
        }
        return Ok(Redirect::to(login.as_str()).into_response());
    };

    let code = state
        .codes
        .create(&client.id, &session.user_id, &redirect_uri, &scope)
        .await?;
    tracing::info!(client_id = %client.id, user_id = %session.user_id, "issued authorization code");

    let mut target = Url::parse(&redirect_uri).map_err(OAuthError::server_error)?;
    target.query_pairs_mut().append_pair("code", &code.code);
    if let Some(s) = csrf_state {
        target.query_pairs_mut().append_pair("state", s);
    }
    Ok(Redirect::to(target.as_str()).into_response())
}

/// OAuth2 Token endpoint.
#[tracing::instrument(skip(state, headers, params))]
#[utoipa::path(
    post,
    path = "/token",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Token",
    summary = "Exchange authorization code or refresh token for access token",
    description = "Exchanges an authorization code for tokens, or uses a refresh token to obtain a new access token.\n\n\
                   **Supported grant types:**\n\
                   - `authorization_code`: requires `code` and `redirect_uri`; returns access and refresh tokens\n\
                   - `refresh_token`: returns a new access token; the refresh token stays valid until it expires\n\n\
                   An `id_token` is included whenever the granted scope contains `openid`.\n\n\
                   **Client authentication:** HTTP Basic auth, or `client_id` and `client_secret` in the body.",
    request_body(
        content = TokenRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token request parameters"
    ),
    responses(
        (status = 200, description = "Tokens issued successfully", body = TokenResponse),
        (status = 400, description = "Invalid request, grant or grant type", body = ErrorResponse),
        (status = 401, description = "Invalid client credentials or unknown client", body = ErrorResponse),
    )
)]
pub async fn token(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    Form(params): Form<TokenRequest>,
) -> Result<Response, OAuthError> {
    let (client_id, client_secret) = extract_client_credentials(&headers, &params);
    let client_id = client_id.ok_or_else(|| OAuthError::invalid_request("client_id is required"))?;
    let client_secret = client_secret.ok_or(OAuthError::InvalidClient)?;
    let client = state.clients.authenticate(&client_id, &client_secret).await?;

    let grant_type = params
        .grant_type
        .as_deref()
        .ok_or_else(|| OAuthError::invalid_request("grant_type is required"))?;
    if !matches!(grant_type, "authorization_code" | "refresh_token") {
        return Err(OAuthError::UnsupportedGrantType);
    }
    if !client.is_grant_type_allowed(grant_type) {
        return Err(OAuthError::UnauthorizedClient(
            "grant type not allowed for this client",
        ));
    }

    let response = if grant_type == "authorization_code" {
        handle_authorization_code_grant(&state, &client, &params).await?
    } else {
        handle_refresh_token_grant(&state, &client, &params).await?
    };

    Ok((
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(response),
    )
        .into_response())
}

/// Token introspection endpoint (RFC 7662).
#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/introspect",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Introspect Token",
    summary = "Report whether an access token is active",
    description = "Verifies an access token and returns its claims.\n\n\
                   Any token that cannot be used (bad signature, expired, malformed, not an access token) \
                   yields `{\"active\": false}` with status 200. The reason is never disclosed.",
    request_body(
        content = IntrospectRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token introspection request"
    ),
    responses(
        (status = 200, description = "Introspection result", body = IntrospectionResponse),
        (status = 400, description = "Missing token parameter", body = ErrorResponse),
    )
)]
pub async fn introspect(
    State(state): State<OAuth2State>,
    Form(params): Form<IntrospectRequest>,
) -> Result<Json<IntrospectionResponse>, OAuthError> {
    let token = params
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| OAuthError::invalid_request("token is required"))?;
    if let Some(hint) = params.token_type_hint.as_deref()
        && hint != "access_token"
    {
        tracing::debug!(hint, "ignoring token_type_hint");
    }
    Ok(Json(state.validator.introspect(token)))
}

/// OpenID Connect UserInfo endpoint.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/userinfo",
    tag = OAUTH2_TAG,
    operation_id = "OpenID Connect UserInfo",
    summary = "Get authenticated user's profile information",
    description = "Returns claims about the user the access token was issued for. \
                   The token must carry the `openid` scope.\n\n\
                   **Authentication:** Include the access token as a Bearer token in the Authorization header.",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "User profile information", body = UserInfoResponse),
        (status = 401, description = "Missing or invalid access token", body = AuthError),
        (status = 403, description = "Token does not have required `openid` scope", body = AuthError),
    )
)]
pub async fn userinfo(
    State(state): State<OAuth2State>,
    BearerAuth(claims): BearerAuth,
) -> Result<Json<UserInfoResponse>, AuthError> {
    if !claims.has_scope("openid") {
        return Err(AuthError::insufficient_scope("openid"));
    }

    let user = state
        .find_user(&claims.sub)
        .await
        .map_err(|e| {
            tracing::error!("Database error looking up user: {}", e);
            AuthError::server_error()
        })?
        .ok_or_else(|| AuthError::invalid_token("Unknown subject"))?;

    Ok(Json(UserInfoResponse {
        sub: user.id,
        phone: user.phone,
    }))
}

/// JSON Web Key Set.
#[utoipa::path(
    get,
    path = "/.well-known/jwks.json",
    tag = OAUTH2_TAG,
    operation_id = "JWKS",
    summary = "Public keys for verifying issued tokens",
    responses(
        (status = 200, description = "The server's current signing key", body = Jwks),
    )
)]
pub async fn jwks(State(state): State<OAuth2State>) -> Json<Jwks> {
    Json(state.signing_key.jwks())
}

/// OpenID Connect Discovery document.
#[utoipa::path(
    get,
    path = "/.well-known/openid-configuration",
    tag = OAUTH2_TAG,
    operation_id = "OpenID Connect Discovery",
    summary = "OpenID Connect Discovery document",
    description = "Returns the metadata clients need to discover endpoints, supported grant types \
                   and signing algorithms.",
    responses(
        (status = 200, description = "OpenID Connect configuration document", body = OpenIdConfiguration),
    )
)]
pub async fn openid_configuration(State(state): State<OAuth2State>) -> Json<OpenIdConfiguration> {
    let base = &state.issuer_url;
    Json(OpenIdConfiguration {
        issuer: base.clone(),
        authorization_endpoint: format!("{base}/oauth2/authorize"),
        token_endpoint: format!("{base}/oauth2/token"),
        userinfo_endpoint: format!("{base}/oauth2/userinfo"),
        introspection_endpoint: format!("{base}/oauth2/introspect"),
        jwks_uri: format!("{base}/.well-known/jwks.json"),
        response_types_supported: strings(&["code"]),
        grant_types_supported: strings(&["authorization_code", "refresh_token"]),
        subject_types_supported: strings(&["public"]),
        id_token_signing_alg_values_supported: strings(&["RS256"]),
        scopes_supported: strings(&["openid", "profile"]),
        token_endpoint_auth_methods_supported: strings(&[
            "client_secret_basic",
            "client_secret_post",
        ]),
        claims_supported: strings(&["sub", "phone", "iss", "aud", "exp", "iat", "auth_time"]),
    })
}

// =============================================================================
// Helper Functions
// =============================================================================

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn extract_client_credentials(
    headers: &HeaderMap,
    params: &TokenRequest,
) -> (Option<String>, Option<String>) {
    // Try Basic auth first
    if let Some(auth) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        && let Ok(decoded) = STANDARD.decode(auth.trim())
        && let Ok(creds) = String::from_utf8(decoded)
        && let Some((id, secret)) = creds.split_once(':')
    {
        return (Some(id.to_string()), Some(secret.to_string()));
    }

    // Fall back to form body
    (params.client_id.clone(), params.client_secret.clone())
}

async fn handle_authorization_code_grant(
    state: &OAuth2State,
    client: &oauth2_client::Model,
    params: &TokenRequest,
) -> Result<TokenResponse, OAuthError> {
    let code = params
        .code
        .as_deref()
        .ok_or_else(|| OAuthError::invalid_request("code is required"))?;
    let redirect_uri = params
        .redirect_uri
        .as_deref()
        .ok_or_else(|| OAuthError::invalid_request("redirect_uri is required"))?;

    let grant = state.codes.redeem(code, &client.id, redirect_uri).await?;

    let access_token = state
        .issuer
        .issue_access_token(&grant.user_id, &client.id, &grant.scope)?;
    let id_token = id_token_for(state, &grant.user_id, &client.id, &grant.scope).await?;
    // Persisted last so a failed grant leaves no refresh token behind.
    let refresh_token = state
        .issuer
        .issue_refresh_token(&client.id, &grant.user_id, &grant.scope)
        .await?;

    tracing::info!(client_id = %client.id, user_id = %grant.user_id, "exchanged authorization code");

    Ok(TokenResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: ACCESS_TOKEN_LIFETIME.whole_seconds(),
        refresh_token: Some(refresh_token),
        id_token,
        scope: grant.scope,
    })
}

async fn handle_refresh_token_grant(
    state: &OAuth2State,
    client: &oauth2_client::Model,
    params: &TokenRequest,
) -> Result<TokenResponse, OAuthError> {
    let refresh_token = params
        .refresh_token
        .as_deref()
        .ok_or_else(|| OAuthError::invalid_request("refresh_token is required"))?;

    let grant = state.issuer.refresh(refresh_token).await?;
    if grant.client_id != client.id {
        return Err(OAuthError::InvalidGrant(
            "refresh token was issued to another client",
        ));
    }

    let access_token = state
        .issuer
        .issue_access_token(&grant.user_id, &client.id, &grant.scope)?;
    let id_token = id_token_for(state, &grant.user_id, &client.id, &grant.scope).await?;

    Ok(TokenResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: ACCESS_TOKEN_LIFETIME.whole_seconds(),
        refresh_token: None,
        id_token,
        scope: grant.scope,
    })
}

async fn id_token_for(
    state: &OAuth2State,
    user_id: &str,
    client_id: &str,
    scope: &str,
) -> Result<Option<String>, OAuthError> {
    if !scope_contains(scope, "openid") {
        return Ok(None);
    }
    let user = state
        .find_user(user_id)
        .await?
        .ok_or_else(|| OAuthError::server_error(format!("user {user_id} not found")))?;
    Ok(Some(state.issuer.issue_id_token(&user, client_id)?))
}

/// Reports an error to an already validated redirect URI (RFC 6749 §4.1.2.1).
fn error_redirect(redirect_uri: &str, state: Option<&str>, error: &OAuthError) -> Response {
    let mut redirect_url = match Url::parse(redirect_uri) {
        Ok(u) => u,
        Err(_) => {
            return (error.status(), Json(ErrorResponse::from(error))).into_response();
        }
    };

    redirect_url
        .query_pairs_mut()
        .append_pair("error", error.error_code());
    if let Some(desc) = error.description() {
        redirect_url
            .query_pairs_mut()
            .append_pair("error_description", &desc);
    }
    if let Some(s) = state {
        redirect_url.query_pairs_mut().append_pair("state", s);
    }

    Redirect::to(redirect_url.as_str()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn token_request(client_id: Option<&str>, client_secret: Option<&str>) -> TokenRequest {
        TokenRequest {
            grant_type: Some("authorization_code".into()),
            code: None,
            redirect_uri: None,
            client_id: client_id.map(String::from),
            client_secret: client_secret.map(String::from),
            refresh_token: None,
        }
    }

    #[test]
    fn basic_auth_takes_precedence_over_form() {
        let mut headers = HeaderMap::new();
        let encoded = STANDARD.encode("c1:s1");
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {encoded}")).unwrap(),
        );
        let (id, secret) =
            extract_client_credentials(&headers, &token_request(Some("other"), Some("x")));
        assert_eq!(id.as_deref(), Some("c1"));
        assert_eq!(secret.as_deref(), Some("s1"));
    }

    #[test]
    fn form_credentials_used_without_basic_auth() {
        let (id, secret) =
            extract_client_credentials(&HeaderMap::new(), &token_request(Some("c1"), None));
        assert_eq!(id.as_deref(), Some("c1"));
        assert!(secret.is_none());
    }

    #[test]
    fn error_redirect_carries_error_and_state() {
        let response = error_redirect(
            "https://x/cb?keep=1",
            Some("xyz"),
            &OAuthError::UnsupportedResponseType,
        );
        let location = response
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap();
        let url = Url::parse(location).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("keep".into(), "1".into())));
        assert!(pairs.contains(&("error".into(), "unsupported_response_type".into())));
        assert!(pairs.contains(&("state".into(), "xyz".into())));
    }
}
