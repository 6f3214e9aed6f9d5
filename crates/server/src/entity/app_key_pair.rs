//! Application key pair entity - RSA signing identities issued to external apps.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use utoipa::ToSchema;

/// Signing algorithm an application key pair is intended for.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum KeyAlgorithm {
    #[default]
    #[sea_orm(string_value = "RS256")]
    #[serde(rename = "RS256")]
    Rs256,
    #[sea_orm(string_value = "RS384")]
    #[serde(rename = "RS384")]
    Rs384,
    #[sea_orm(string_value = "RS512")]
    #[serde(rename = "RS512")]
    Rs512,
}

impl KeyAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyAlgorithm::Rs256 => "RS256",
            KeyAlgorithm::Rs384 => "RS384",
            KeyAlgorithm::Rs512 => "RS512",
        }
    }

    /// The matching `jsonwebtoken` algorithm for consumers signing with this key.
    pub fn jwt_algorithm(&self) -> jsonwebtoken::Algorithm {
        match self {
            KeyAlgorithm::Rs256 => jsonwebtoken::Algorithm::RS256,
            KeyAlgorithm::Rs384 => jsonwebtoken::Algorithm::RS384,
            KeyAlgorithm::Rs512 => jsonwebtoken::Algorithm::RS512,
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RS256" => Ok(KeyAlgorithm::Rs256),
            "RS384" => Ok(KeyAlgorithm::Rs384),
            "RS512" => Ok(KeyAlgorithm::Rs512),
            other => Err(format!("unsupported algorithm: {other}")),
        }
    }
}

/// Lifecycle state of a key pair. `Revoked` is terminal.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "expired")]
    Expired,
    #[sea_orm(string_value = "revoked")]
    Revoked,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "app_key_pair")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Owning external application
    pub app_id: String,
    /// Key identifier (`kid`)
    #[sea_orm(unique)]
    pub key_id: String,
    /// PKCS#8 PEM, only handed out once at generation time
    #[serde(skip_serializing)]
    pub private_key: String,
    /// SPKI PEM
    pub public_key: String,
    pub algorithm: KeyAlgorithm,
    pub status: KeyStatus,
    /// `None` means the key never expires
    pub expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub revoked_at: Option<OffsetDateTime>,
    pub last_used_at: Option<OffsetDateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Status as observed at `now`. Expiry is evaluated lazily: an active key
    /// past its `expires_at` reports `Expired` even though the row still says
    /// `active`.
    pub fn effective_status(&self, now: OffsetDateTime) -> KeyStatus {
        match self.status {
            KeyStatus::Active if self.expires_at.is_some_and(|exp| now > exp) => {
                KeyStatus::Expired
            }
            status => status,
        }
    }

    /// Whether the key may produce new signatures at `now`.
    pub fn is_usable_at(&self, now: OffsetDateTime) -> bool {
        self.effective_status(now) == KeyStatus::Active
    }
}
