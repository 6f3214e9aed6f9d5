//! Access-token verification for resource endpoints and RFC 7662 introspection.

use crate::error::TokenError;
use crate::oauth2::claims::{ACCESS_TOKEN_TYPE, AccessTokenClaims};
use crate::oauth2::keys::SigningKey;
use jsonwebtoken::{Algorithm, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Introspection result. Inactive tokens serialize as `{"active":false}` only.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

impl IntrospectionResponse {
    pub fn inactive() -> Self {
        Self::default()
    }
}

impl From<AccessTokenClaims> for IntrospectionResponse {
    fn from(claims: AccessTokenClaims) -> Self {
        Self {
            active: true,
            sub: Some(claims.sub),
            client_id: Some(claims.client_id),
            scope: Some(claims.scope),
            exp: Some(claims.exp),
            iat: Some(claims.iat),
            iss: Some(claims.iss),
            aud: Some(claims.aud),
        }
    }
}

#[derive(Clone)]
pub struct TokenValidator {
    key: Arc<SigningKey>,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(key: Arc<SigningKey>, issuer: &str) -> Self {
        let mut validation = Validation::new(Algorithm::RS256);
        // Only the RSA family; the signature check below pins it to our key.
        validation.algorithms = vec![Algorithm::RS256, Algorithm::RS384, Algorithm::RS512];
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        // Expired means expired; no clock-skew allowance.
        validation.leeway = 0;
        // `aud` is the client id, which varies per token.
        validation.validate_aud = false;
        Self { key, validation }
    }

    /// Verifies signature, expiry, issuer and `token_type`.
    pub fn verify(&self, token: &str) -> Result<AccessTokenClaims, TokenError> {
        let data = jsonwebtoken::decode::<AccessTokenClaims>(
            token,
            self.key.decoding_key(),
            &self.validation,
        )?;
        if data.claims.token_type != ACCESS_TOKEN_TYPE {
            return Err(TokenError::WrongTokenType(data.claims.token_type));
        }
        Ok(data.claims)
    }

    /// Never fails. Any verification problem yields `{active:false}` and the
    /// reason is only logged.
    pub fn introspect(&self, token: &str) -> IntrospectionResponse {
        match self.verify(token) {
            Ok(claims) => claims.into(),
            Err(e) => {
                tracing::debug!(error = %e, "introspected token is inactive");
                IntrospectionResponse::inactive()
            }
        }
    }
}
