//! OpenAPI/Utoipa configuration.

use crate::api::{admin::ADMIN_TAG, health::MISC_TAG};
use crate::oauth2::OAUTH2_TAG;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{
        AuthorizationCode, Flow, HttpAuthScheme, HttpBuilder, OAuth2, Scopes, SecurityScheme,
    },
};

/// Security addon for OpenAPI documentation.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            let bearer = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("JWT")
                .description(Some(
                    "Access token issued by `/oauth2/token`, signed RS256 with the key published at \
                     `/.well-known/jwks.json`.",
                ))
                .build();
            components.add_security_scheme("Authorization", SecurityScheme::Http(bearer));

            let oauth2 = OAuth2::new([Flow::AuthorizationCode(AuthorizationCode::new(
                "/oauth2/authorize",
                "/oauth2/token",
                Scopes::from_iter([
                    ("openid", "OpenID Connect scope; adds an ID token and enables userinfo"),
                    ("profile", "Access to user profile"),
                ]),
            ))]);
            components.add_security_scheme("OAuth2", SecurityScheme::OAuth2(oauth2));
        }
    }
}

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Flash OAuth2 API",
        version = "1.0.0",
        description = "OAuth2 / OpenID Connect authorization server and application key-pair management."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = OAUTH2_TAG, description = "OAuth2 and OpenID Connect endpoints"),
        (name = ADMIN_TAG, description = "Developer, application and key-pair administration")
    )
)]
pub struct ApiDoc;
