//! Bearer-token authentication for resource endpoints.

use crate::oauth2::OAuth2State;
use crate::oauth2::claims::AccessTokenClaims;
use axum::{
    Json,
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error type for authentication failures
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthError {
    /// Error code (e.g., "invalid_token", "insufficient_scope")
    pub error: String,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl AuthError {
    pub fn invalid_token(description: impl Into<String>) -> Self {
        Self {
            error: "invalid_token".to_string(),
            error_description: Some(description.into()),
        }
    }

    pub fn insufficient_scope(required_scope: &str) -> Self {
        Self {
            error: "insufficient_scope".to_string(),
            error_description: Some(format!("Token requires '{required_scope}' scope")),
        }
    }

    pub fn forbidden(description: impl Into<String>) -> Self {
        Self {
            error: "forbidden".to_string(),
            error_description: Some(description.into()),
        }
    }

    pub fn server_error() -> Self {
        Self {
            error: "server_error".to_string(),
            error_description: None,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self.error.as_str() {
            "invalid_token" => StatusCode::UNAUTHORIZED,
            "insufficient_scope" | "forbidden" => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let mut response = (status, Json(self)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static("Bearer"),
            );
        }
        response
    }
}

/// Axum extractor that validates `Authorization: Bearer <access token>`.
///
/// Verification is purely cryptographic; no storage lookup is made.
///
/// ```ignore
/// async fn handler(BearerAuth(claims): BearerAuth) -> impl IntoResponse {
///     format!("Hello, {}", claims.sub)
/// }
/// ```
pub struct BearerAuth(pub AccessTokenClaims);

impl<S> FromRequestParts<S> for BearerAuth
where
    OAuth2State: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let oauth2 = OAuth2State::from_ref(state);

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        let access_token = match auth_header {
            Some(header) => header.strip_prefix("Bearer ").ok_or_else(|| {
                AuthError::invalid_token("Authorization header must use Bearer scheme")
            })?,
            None => return Err(AuthError::invalid_token("Missing Authorization header")),
        };

        let claims = oauth2.validator.verify(access_token.trim()).map_err(|e| {
            tracing::debug!(error = %e, "rejected bearer token");
            AuthError::invalid_token("Token is not valid")
        })?;

        Ok(BearerAuth(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_error_status_codes() {
        let response = AuthError::invalid_token("test").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );

        let response = AuthError::insufficient_scope("openid").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = AuthError::forbidden("test").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = AuthError::server_error().into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
