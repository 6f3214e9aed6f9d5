//! OAuth2 state management.

use crate::entity::oauth2_user;
use crate::oauth2::{
    AuthorizationCodeStore, ClientRegistry, SigningKey, TokenIssuer, TokenValidator,
};
use sea_orm::{DatabaseConnection, DbErr, EntityTrait};
use std::sync::Arc;

/// Everything the OAuth2 endpoints need. Cheap to clone.
#[derive(Clone)]
pub struct OAuth2State {
    pub clients: ClientRegistry,
    pub codes: AuthorizationCodeStore,
    pub issuer: TokenIssuer,
    pub validator: TokenValidator,
    pub signing_key: Arc<SigningKey>,
    pub db: Arc<DatabaseConnection>,
    /// Base URL for the OAuth2 server (used for issuer in tokens)
    pub issuer_url: String,
    /// Where `/oauth2/authorize` sends users without a session
    pub login_url: String,
}

impl OAuth2State {
    pub fn new(
        db: Arc<DatabaseConnection>,
        signing_key: Arc<SigningKey>,
        issuer_url: String,
        login_url: String,
    ) -> Self {
        let issuer_url = issuer_url.trim_end_matches('/').to_string();
        Self {
            clients: ClientRegistry::new(db.clone()),
            codes: AuthorizationCodeStore::new(db.clone()),
            issuer: TokenIssuer::new(db.clone(), signing_key.clone(), issuer_url.clone()),
            validator: TokenValidator::new(signing_key.clone(), &issuer_url),
            signing_key,
            db,
            issuer_url,
            login_url,
        }
    }

    pub async fn find_user(&self, user_id: &str) -> Result<Option<oauth2_user::Model>, DbErr> {
        oauth2_user::Entity::find_by_id(user_id)
            .one(self.db.as_ref())
            .await
    }
}
