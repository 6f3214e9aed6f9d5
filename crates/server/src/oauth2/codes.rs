//! Single-use authorization codes.

use crate::crypto::generate_token;
use crate::entity::oauth2_authorization;
use crate::error::OAuthError;
use crate::oauth2::AUTHORIZATION_CODE_LIFETIME;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, TransactionTrait,
};
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Clone)]
pub struct AuthorizationCodeStore {
    db: Arc<DatabaseConnection>,
}

impl AuthorizationCodeStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[tracing::instrument(skip(self, scope))]
    pub async fn create(
        &self,
        client_id: &str,
        user_id: &str,
        redirect_uri: &str,
        scope: &str,
    ) -> Result<oauth2_authorization::Model, DbErr> {
        let now = OffsetDateTime::now_utc();
        let code = oauth2_authorization::ActiveModel {
            code: Set(generate_token()),
            client_id: Set(client_id.to_string()),
            user_id: Set(user_id.to_string()),
            redirect_uri: Set(redirect_uri.to_string()),
            scope: Set(scope.to_string()),
            expires_at: Set(now + AUTHORIZATION_CODE_LIFETIME),
            created_at: Set(now),
        };
        code.insert(self.db.as_ref()).await
    }

    /// Consumes a code issued to `client_id` for `redirect_uri`.
    ///
    /// Lookup and deletion run in one transaction and only the caller whose
    /// delete removed the row wins. Expired codes are deleted as well, so a
    /// retry can never succeed.
    #[tracing::instrument(skip(self, code))]
    pub async fn redeem(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
    ) -> Result<oauth2_authorization::Model, OAuthError> {
        let txn = self.db.begin().await?;

        let Some(found) = oauth2_authorization::Entity::find_by_id(code)
            .filter(oauth2_authorization::Column::ClientId.eq(client_id))
            .filter(oauth2_authorization::Column::RedirectUri.eq(redirect_uri))
            .one(&txn)
            .await?
        else {
            txn.rollback().await?;
            return Err(OAuthError::InvalidGrant("invalid authorization code"));
        };

        let deleted = oauth2_authorization::Entity::delete_many()
            .filter(oauth2_authorization::Column::Code.eq(code))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        if deleted.rows_affected != 1 {
            tracing::warn!("authorization code consumed concurrently");
            return Err(OAuthError::InvalidGrant("invalid authorization code"));
        }
        if found.is_expired_at(OffsetDateTime::now_utc()) {
            return Err(OAuthError::InvalidGrant("authorization code expired"));
        }

        Ok(found)
    }
}
