//! Lifecycle of RSA key pairs issued to external applications.
//!
//! Each application gets its own signing identity, independent of the
//! server's key. Keys move from `active` to `revoked` (terminal) or are
//! reported `expired` once past `expires_at`; nothing sweeps them.

use crate::crypto::{RsaKeyPair, random_suffix};
use crate::entity::app_key_pair::{self, KeyAlgorithm, KeyStatus};
use crate::entity::external_app;
use crate::error::KeyPairError;
use async_trait::async_trait;
use jsonwebtoken::{EncodingKey, Header};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder,
};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// Persistence for key pairs and the lookup of the applications owning them.
///
/// Private keys pass through this trait as PEM so an implementation can
/// encrypt them at rest without the manager noticing.
#[async_trait]
pub trait KeyPairStore: Send + Sync {
    async fn insert(&self, record: app_key_pair::Model) -> Result<app_key_pair::Model, DbErr>;
    async fn find_by_key_id(&self, key_id: &str) -> Result<Option<app_key_pair::Model>, DbErr>;
    /// Newest first.
    async fn list_by_app(&self, app_id: &str) -> Result<Vec<app_key_pair::Model>, DbErr>;
    /// Revokes a key that is not yet revoked. Returns the number of rows changed.
    async fn mark_revoked(&self, key_id: &str, at: OffsetDateTime) -> Result<u64, DbErr>;
    async fn touch_last_used(&self, key_id: &str, at: OffsetDateTime) -> Result<(), DbErr>;
    async fn find_app(&self, app_id: &str) -> Result<Option<external_app::Model>, DbErr>;
}

#[derive(Clone)]
pub struct SeaOrmKeyPairStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmKeyPairStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl KeyPairStore for SeaOrmKeyPairStore {
    async fn insert(&self, record: app_key_pair::Model) -> Result<app_key_pair::Model, DbErr> {
        app_key_pair::ActiveModel {
            id: Set(record.id),
            app_id: Set(record.app_id),
            key_id: Set(record.key_id),
            private_key: Set(record.private_key),
            public_key: Set(record.public_key),
            algorithm: Set(record.algorithm),
            status: Set(record.status),
            expires_at: Set(record.expires_at),
            created_at: Set(record.created_at),
            revoked_at: Set(record.revoked_at),
            last_used_at: Set(record.last_used_at),
        }
        .insert(self.db.as_ref())
        .await
    }

    async fn find_by_key_id(&self, key_id: &str) -> Result<Option<app_key_pair::Model>, DbErr> {
        app_key_pair::Entity::find()
            .filter(app_key_pair::Column::KeyId.eq(key_id))
            .one(self.db.as_ref())
            .await
    }

    async fn list_by_app(&self, app_id: &str) -> Result<Vec<app_key_pair::Model>, DbErr> {
        app_key_pair::Entity::find()
            .filter(app_key_pair::Column::AppId.eq(app_id))
            .order_by_desc(app_key_pair::Column::CreatedAt)
            .order_by_desc(app_key_pair::Column::KeyId)
            .all(self.db.as_ref())
            .await
    }

    async fn mark_revoked(&self, key_id: &str, at: OffsetDateTime) -> Result<u64, DbErr> {
        let result = app_key_pair::Entity::update_many()
            .set(app_key_pair::ActiveModel {
                status: Set(KeyStatus::Revoked),
                revoked_at: Set(Some(at)),
                ..Default::default()
            })
            .filter(app_key_pair::Column::KeyId.eq(key_id))
            .filter(app_key_pair::Column::Status.ne(KeyStatus::Revoked))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }

    async fn touch_last_used(&self, key_id: &str, at: OffsetDateTime) -> Result<(), DbErr> {
        app_key_pair::Entity::update_many()
            .set(app_key_pair::ActiveModel {
                last_used_at: Set(Some(at)),
                ..Default::default()
            })
            .filter(app_key_pair::Column::KeyId.eq(key_id))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn find_app(&self, app_id: &str) -> Result<Option<external_app::Model>, DbErr> {
        external_app::Entity::find_by_id(app_id)
            .one(self.db.as_ref())
            .await
    }
}

/// A freshly generated key pair. The only place the private key is ever
/// handed out.
pub struct GeneratedKeyPair {
    pub key_pair: app_key_pair::Model,
    /// PKCS#8 PEM
    pub private_key: String,
}

/// Key material for an application that is allowed to sign right now.
#[derive(Clone)]
pub struct AppSigningKey {
    pub key_id: String,
    pub algorithm: KeyAlgorithm,
    pub encoding_key: EncodingKey,
}

impl AppSigningKey {
    pub fn header(&self) -> Header {
        let mut header = Header::new(self.algorithm.jwt_algorithm());
        header.kid = Some(self.key_id.clone());
        header
    }
}

#[derive(Clone)]
pub struct AppKeyManager {
    store: Arc<dyn KeyPairStore>,
}

impl AppKeyManager {
    pub fn new(store: Arc<dyn KeyPairStore>) -> Self {
        Self { store }
    }

    pub fn with_db(db: Arc<DatabaseConnection>) -> Self {
        Self::new(Arc::new(SeaOrmKeyPairStore::new(db)))
    }

    /// Creates and stores a new RSA-2048 key pair for `app_id`, which must be
    /// a registered and active application.
    ///
    /// Nothing is returned unless the record was persisted.
    #[tracing::instrument(skip(self))]
    pub async fn generate(
        &self,
        app_id: &str,
        algorithm: KeyAlgorithm,
        expires_at: Option<OffsetDateTime>,
    ) -> Result<GeneratedKeyPair, KeyPairError> {
        let app = self
            .store
            .find_app(app_id)
            .await?
            .ok_or_else(|| KeyPairError::UnknownApp(app_id.to_string()))?;
        if !app.is_active() {
            return Err(KeyPairError::AppInactive(app.id));
        }

        let (private_pem, public_pem) = tokio::task::spawn_blocking(|| {
            let pair = RsaKeyPair::generate()?;
            Ok::<_, crate::crypto::CryptoError>((pair.private_key_pem()?, pair.public_key_pem()?))
        })
        .await
        .map_err(|e| KeyPairError::KeyGeneration(e.to_string()))?
        .map_err(|e| KeyPairError::KeyGeneration(e.to_string()))?;

        let now = OffsetDateTime::now_utc();
        let record = app_key_pair::Model {
            id: uuid::Uuid::new_v4().to_string(),
            app_id: app_id.to_string(),
            key_id: format!("key_{app_id}_{}_{}", now.unix_timestamp(), random_suffix()),
            private_key: private_pem.clone(),
            public_key: public_pem,
            algorithm,
            status: KeyStatus::Active,
            expires_at,
            created_at: now,
            revoked_at: None,
            last_used_at: None,
        };

        let stored = self.store.insert(record).await?;
        tracing::info!(key_id = %stored.key_id, %algorithm, "generated application key pair");

        Ok(GeneratedKeyPair {
            key_pair: stored,
            private_key: private_pem,
        })
    }

    /// Revokes a key. Revoking an already revoked key succeeds.
    #[tracing::instrument(skip(self))]
    pub async fn revoke(&self, key_id: &str) -> Result<(), KeyPairError> {
        let changed = self
            .store
            .mark_revoked(key_id, OffsetDateTime::now_utc())
            .await?;
        if changed == 0 {
            // Either unknown or already revoked.
            self.get_by_key_id(key_id).await?;
            tracing::debug!(key_id, "key pair already revoked");
        } else {
            tracing::info!(key_id, "revoked application key pair");
        }
        Ok(())
    }

    pub async fn list_by_app(&self, app_id: &str) -> Result<Vec<app_key_pair::Model>, KeyPairError> {
        Ok(self.store.list_by_app(app_id).await?)
    }

    pub async fn get_by_key_id(&self, key_id: &str) -> Result<app_key_pair::Model, KeyPairError> {
        self.store
            .find_by_key_id(key_id)
            .await?
            .ok_or_else(|| KeyPairError::NotFound(key_id.to_string()))
    }

    /// Records usage in the background; failures are only logged.
    pub fn touch_last_used(&self, key_id: &str) {
        let store = self.store.clone();
        let key_id = key_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = store
                .touch_last_used(&key_id, OffsetDateTime::now_utc())
                .await
            {
                tracing::warn!(%key_id, error = %e, "failed to record key usage");
            }
        });
    }

    /// Signing material for a key whose effective status is `active`.
    pub async fn signing_key(&self, key_id: &str) -> Result<AppSigningKey, KeyPairError> {
        let record = self.get_by_key_id(key_id).await?;
        if !record.is_usable_at(OffsetDateTime::now_utc()) {
            return Err(KeyPairError::Inactive(key_id.to_string()));
        }
        let encoding_key = EncodingKey::from_rsa_pem(record.private_key.as_bytes())
            .map_err(|e| KeyPairError::KeyMaterial(e.to_string()))?;
        self.touch_last_used(key_id);
        Ok(AppSigningKey {
            key_id: record.key_id,
            algorithm: record.algorithm,
            encoding_key,
        })
    }
}

const MAX_KEY_LIFETIME_HOURS: i64 = 24 * 365 * 100;

/// Parses lifetimes like `30d`, `2w`, `6m` (30-day months), `1y` (365 days) or `12h`.
pub fn parse_expires_in(value: &str) -> Result<Duration, KeyPairError> {
    let invalid = || KeyPairError::InvalidExpiry(value.to_string());
    let value = value.trim();
    let split = value.len().checked_sub(1).ok_or_else(invalid)?;
    if !value.is_char_boundary(split) {
        return Err(invalid());
    }
    let (number, unit) = value.split_at(split);
    let n: i64 = number.parse().map_err(|_| invalid())?;
    if n <= 0 {
        return Err(invalid());
    }
    let hours_per_unit = match unit {
        "h" => 1,
        "d" => 24,
        "w" => 24 * 7,
        "m" => 24 * 30,
        "y" => 24 * 365,
        _ => return Err(invalid()),
    };
    n.checked_mul(hours_per_unit)
        .filter(|h| *h <= MAX_KEY_LIFETIME_HOURS)
        .map(Duration::hours)
        .ok_or_else(invalid)
}
