use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const ACCESS_TOKEN_TYPE: &str = "access_token";
pub const ID_TOKEN_TYPE: &str = "id_token";

/// Claims of a self-contained access token. `aud` is always the client id.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct AccessTokenClaims {
    pub sub: String,
    pub client_id: String,
    pub scope: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    pub jti: String,
    pub token_type: String,
}

impl AccessTokenClaims {
    pub fn has_scope(&self, scope: &str) -> bool {
        scope_contains(&self.scope, scope)
    }
}

/// OpenID Connect ID token claims. Identity attributes only.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdTokenClaims {
    pub sub: String,
    pub phone: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    pub auth_time: i64,
    pub token_type: String,
}

/// Whether a space-delimited scope string grants `wanted` as a whole word.
pub fn scope_contains(scope: &str, wanted: &str) -> bool {
    scope.split_whitespace().any(|s| s == wanted)
}
