//! Developers and the external applications they own.
//!
//! An application must be registered here, and be active, before it can be
//! issued key pairs.

use crate::entity::developer::{self, DEFAULT_API_QUOTA, DeveloperStatus};
use crate::entity::external_app::{self, AppStatus, DEFAULT_APP_SCOPES};
use crate::error::RegistryError;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder,
};
use std::sync::Arc;
use time::OffsetDateTime;
use url::Url;

#[derive(Clone, Debug)]
pub struct NewDeveloper {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Clone, Debug)]
pub struct NewExternalApp {
    pub developer_id: String,
    pub name: String,
    pub description: Option<String>,
    pub callback_url: String,
    /// Defaults to `openid profile`
    pub scopes: Option<String>,
}

/// An application together with the name of the developer owning it.
#[derive(Clone, Debug)]
pub struct AppWithDeveloper {
    pub app: external_app::Model,
    pub developer_name: Option<String>,
}

#[derive(Clone)]
pub struct AppRegistry {
    db: Arc<DatabaseConnection>,
}

impl AppRegistry {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[tracing::instrument(skip(self, new), fields(email = %new.email))]
    pub async fn register_developer(
        &self,
        new: NewDeveloper,
    ) -> Result<developer::Model, RegistryError> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(RegistryError::InvalidRequest("name is required".into()));
        }
        let email = new.email.trim().to_ascii_lowercase();
        if !is_plausible_email(&email) {
            return Err(RegistryError::InvalidRequest(format!(
                "invalid email: {}",
                new.email
            )));
        }

        let existing = developer::Entity::find()
            .filter(developer::Column::Email.eq(email.as_str()))
            .one(self.db.as_ref())
            .await?;
        if existing.is_some() {
            return Err(RegistryError::DuplicateEmail(email));
        }

        let now = OffsetDateTime::now_utc();
        let developer = developer::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            name: Set(name.to_string()),
            email: Set(email),
            phone: Set(new.phone.filter(|p| !p.trim().is_empty())),
            status: Set(DeveloperStatus::Active),
            api_quota: Set(DEFAULT_API_QUOTA),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await?;

        tracing::info!(developer_id = %developer.id, "registered developer");
        Ok(developer)
    }

    /// Registers an application under an active developer.
    #[tracing::instrument(skip(self, new), fields(developer_id = %new.developer_id))]
    pub async fn register_app(
        &self,
        new: NewExternalApp,
    ) -> Result<external_app::Model, RegistryError> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(RegistryError::InvalidRequest("name is required".into()));
        }
        match Url::parse(&new.callback_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => {
                return Err(RegistryError::InvalidRequest(format!(
                    "invalid callback_url: {}",
                    new.callback_url
                )));
            }
        }

        let developer = self.find_developer(&new.developer_id).await?;
        if developer.status != DeveloperStatus::Active {
            return Err(RegistryError::DeveloperInactive(developer.id));
        }

        let scopes = new
            .scopes
            .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_APP_SCOPES.to_string());

        let now = OffsetDateTime::now_utc();
        let app = external_app::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            name: Set(name.to_string()),
            description: Set(new.description.unwrap_or_default()),
            developer_id: Set(developer.id),
            status: Set(AppStatus::Active),
            callback_url: Set(new.callback_url),
            scopes: Set(scopes),
            created_at: Set(now),
            updated_at: Set(now),
            revoked_at: Set(None),
        }
        .insert(self.db.as_ref())
        .await?;

        tracing::info!(app_id = %app.id, "registered external application");
        Ok(app)
    }

    pub async fn find_developer(&self, developer_id: &str) -> Result<developer::Model, RegistryError> {
        developer::Entity::find_by_id(developer_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| RegistryError::UnknownDeveloper(developer_id.to_string()))
    }

    pub async fn find_app(&self, app_id: &str) -> Result<external_app::Model, RegistryError> {
        external_app::Entity::find_by_id(app_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| RegistryError::UnknownApp(app_id.to_string()))
    }

    /// Applications of one developer, newest first.
    pub async fn list_developer_apps(
        &self,
        developer_id: &str,
    ) -> Result<Vec<external_app::Model>, RegistryError> {
        self.find_developer(developer_id).await?;
        Ok(external_app::Entity::find()
            .filter(external_app::Column::DeveloperId.eq(developer_id))
            .order_by_desc(external_app::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?)
    }

    /// Every application with its developer's name, newest first.
    pub async fn list_all_apps(&self) -> Result<Vec<AppWithDeveloper>, RegistryError> {
        let rows = external_app::Entity::find()
            .find_also_related(developer::Entity)
            .order_by_desc(external_app::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(rows
            .into_iter()
            .map(|(app, developer)| AppWithDeveloper {
                app,
                developer_name: developer.map(|d| d.name),
            })
            .collect())
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}
