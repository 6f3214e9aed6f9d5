//! OAuth2 / OpenID Connect authorization server.
//!
//! ## Supported Flows
//!
//! - Authorization Code
//! - Refresh Token (tokens are not rotated on use)
//!
//! ## Endpoints
//!
//! - `GET /oauth2/authorize` - Authorization endpoint
//! - `POST /oauth2/token` - Token endpoint
//! - `POST /oauth2/introspect` - Token introspection (RFC 7662)
//! - `GET /oauth2/userinfo` - OpenID Connect UserInfo
//! - `GET /.well-known/jwks.json` - Public signing keys
//! - `GET /.well-known/openid-configuration` - OpenID Connect Discovery

use time::Duration;

pub mod claims;
pub mod codes;
pub mod endpoints;
pub mod issuer;
pub mod keys;
pub mod registrar;
mod state;
pub mod validator;

pub use codes::AuthorizationCodeStore;
pub use endpoints::{SessionUser, router, well_known_router};
pub use issuer::{RefreshGrant, TokenIssuer};
pub use keys::SigningKey;
pub use registrar::{ClientRegistry, NewClient};
pub use state::OAuth2State;
pub use validator::{IntrospectionResponse, TokenValidator};

/// OpenAPI tag for OAuth2 endpoints
pub const OAUTH2_TAG: &str = "OAuth2";

pub const AUTHORIZATION_CODE_LIFETIME: Duration = Duration::minutes(10);
pub const ACCESS_TOKEN_LIFETIME: Duration = Duration::hours(1);
pub const ID_TOKEN_LIFETIME: Duration = Duration::hours(1);
pub const REFRESH_TOKEN_LIFETIME: Duration = Duration::days(30);
