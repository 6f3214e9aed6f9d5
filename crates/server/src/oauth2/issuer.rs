//! Mints access tokens, ID tokens and refresh tokens.

use crate::crypto::generate_token;
use crate::entity::{oauth2_refresh_token, oauth2_user};
use crate::error::OAuthError;
use crate::oauth2::claims::{ACCESS_TOKEN_TYPE, AccessTokenClaims, ID_TOKEN_TYPE, IdTokenClaims};
use crate::oauth2::keys::SigningKey;
use crate::oauth2::{ACCESS_TOKEN_LIFETIME, ID_TOKEN_LIFETIME, REFRESH_TOKEN_LIFETIME};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection, EntityTrait};
use std::sync::Arc;
use time::OffsetDateTime;

/// Identity and scope bound to a refresh token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshGrant {
    pub client_id: String,
    pub user_id: String,
    pub scope: String,
}

#[derive(Clone)]
pub struct TokenIssuer {
    db: Arc<DatabaseConnection>,
    key: Arc<SigningKey>,
    issuer: String,
}

impl TokenIssuer {
    pub fn new(db: Arc<DatabaseConnection>, key: Arc<SigningKey>, issuer: String) -> Self {
        Self { db, key, issuer }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn issue_access_token(
        &self,
        user_id: &str,
        client_id: &str,
        scope: &str,
    ) -> Result<String, OAuthError> {
        let now = OffsetDateTime::now_utc();
        let claims = AccessTokenClaims {
            sub: user_id.to_string(),
            client_id: client_id.to_string(),
            scope: scope.to_string(),
            iat: now.unix_timestamp(),
            exp: (now + ACCESS_TOKEN_LIFETIME).unix_timestamp(),
            iss: self.issuer.clone(),
            aud: client_id.to_string(),
            jti: uuid::Uuid::new_v4().to_string(),
            token_type: ACCESS_TOKEN_TYPE.to_string(),
        };
        Ok(jsonwebtoken::encode(
            &self.key.header(),
            &claims,
            self.key.encoding_key(),
        )?)
    }

    pub fn issue_id_token(
        &self,
        user: &oauth2_user::Model,
        client_id: &str,
    ) -> Result<String, OAuthError> {
        let now = OffsetDateTime::now_utc();
        let claims = IdTokenClaims {
            sub: user.id.clone(),
            phone: user.phone.clone(),
            iat: now.unix_timestamp(),
            exp: (now + ID_TOKEN_LIFETIME).unix_timestamp(),
            iss: self.issuer.clone(),
            aud: client_id.to_string(),
            auth_time: now.unix_timestamp(),
            token_type: ID_TOKEN_TYPE.to_string(),
        };
        Ok(jsonwebtoken::encode(
            &self.key.header(),
            &claims,
            self.key.encoding_key(),
        )?)
    }

    #[tracing::instrument(skip(self, scope))]
    pub async fn issue_refresh_token(
        &self,
        client_id: &str,
        user_id: &str,
        scope: &str,
    ) -> Result<String, OAuthError> {
        let now = OffsetDateTime::now_utc();
        let token = generate_token();
        oauth2_refresh_token::ActiveModel {
            token: Set(token.clone()),
            client_id: Set(client_id.to_string()),
            user_id: Set(user_id.to_string()),
            scope: Set(scope.to_string()),
            expires_at: Set(now + REFRESH_TOKEN_LIFETIME),
            created_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await?;
        Ok(token)
    }

    /// Resolves a refresh token to the grant it carries.
    ///
    /// The token is left in place and stays usable until it expires. An
    /// expired token is deleted on the way out.
    #[tracing::instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshGrant, OAuthError> {
        let Some(stored) = oauth2_refresh_token::Entity::find_by_id(refresh_token)
            .one(self.db.as_ref())
            .await?
        else {
            return Err(OAuthError::InvalidGrant("invalid refresh token"));
        };

        if stored.is_expired_at(OffsetDateTime::now_utc()) {
            oauth2_refresh_token::Entity::delete_by_id(refresh_token)
                .exec(self.db.as_ref())
                .await?;
            return Err(OAuthError::InvalidGrant("refresh token expired"));
        }

        Ok(RefreshGrant {
            client_id: stored.client_id,
            user_id: stored.user_id,
            scope: stored.scope,
        })
    }
}
