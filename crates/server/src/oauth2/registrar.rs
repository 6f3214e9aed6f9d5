//! Database-backed OAuth2 client registry.

use crate::entity::oauth2_client;
use crate::error::OAuthError;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection, DbErr, EntityTrait};
use std::sync::Arc;
use time::OffsetDateTime;

/// Parameters for provisioning a client. Clients are immutable once stored.
#[derive(Clone, Debug)]
pub struct NewClient {
    pub id: String,
    pub secret: String,
    pub name: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub scope: String,
}

impl NewClient {
    /// A confidential client allowed the authorization code and refresh grants.
    pub fn new(
        id: impl Into<String>,
        secret: impl Into<String>,
        redirect_uris: Vec<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            secret: secret.into(),
            redirect_uris,
            grant_types: vec!["authorization_code".into(), "refresh_token".into()],
            response_types: vec!["code".into()],
            scope: "openid profile".into(),
        }
    }
}

#[derive(Clone)]
pub struct ClientRegistry {
    db: Arc<DatabaseConnection>,
}

impl ClientRegistry {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Looks up a client by id. Unknown ids are `invalid_client`.
    pub async fn resolve(&self, client_id: &str) -> Result<oauth2_client::Model, OAuthError> {
        oauth2_client::Entity::find_by_id(client_id)
            .one(self.db.as_ref())
            .await?
            .ok_or(OAuthError::InvalidClient)
    }

    /// Resolves the client and compares the presented secret verbatim.
    ///
    /// Secrets are stored and compared in plaintext.
    pub async fn authenticate(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<oauth2_client::Model, OAuthError> {
        let client = self.resolve(client_id).await?;
        if client.secret != client_secret {
            tracing::debug!(client_id, "client secret mismatch");
            return Err(OAuthError::InvalidClient);
        }
        Ok(client)
    }

    pub async fn register(&self, new: NewClient) -> Result<oauth2_client::Model, DbErr> {
        let redirect_uris = serde_json::to_string(&new.redirect_uris)
            .map_err(|e| DbErr::Custom(format!("redirect_uris: {e}")))?;
        let client = oauth2_client::ActiveModel {
            id: Set(new.id),
            secret: Set(new.secret),
            name: Set(new.name),
            redirect_uris: Set(redirect_uris),
            grant_types: Set(new.grant_types.join(" ")),
            response_types: Set(new.response_types.join(" ")),
            scope: Set(new.scope),
            created_at: Set(OffsetDateTime::now_utc()),
        };
        let client = client.insert(self.db.as_ref()).await?;
        tracing::info!(client_id = %client.id, "registered OAuth2 client");
        Ok(client)
    }
}
