use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// OAuth2 protocol failures, named after the RFC 6749 error codes they map to.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("invalid client")]
    InvalidClient,
    #[error("invalid grant: {0}")]
    InvalidGrant(&'static str),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("unauthorized client: {0}")]
    UnauthorizedClient(&'static str),
    #[error("unsupported grant type")]
    UnsupportedGrantType,
    #[error("unsupported response type")]
    UnsupportedResponseType,
    #[error("server error: {0}")]
    ServerError(String),
}

impl OAuthError {
    pub fn invalid_request(description: impl Into<String>) -> Self {
        OAuthError::InvalidRequest(description.into())
    }

    pub fn server_error(detail: impl std::fmt::Display) -> Self {
        OAuthError::ServerError(detail.to_string())
    }

    /// The `error` value placed on the wire.
    pub fn error_code(&self) -> &'static str {
        match self {
            OAuthError::InvalidClient => "invalid_client",
            OAuthError::InvalidGrant(_) => "invalid_grant",
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::UnauthorizedClient(_) => "unauthorized_client",
            OAuthError::UnsupportedGrantType => "unsupported_grant_type",
            OAuthError::UnsupportedResponseType => "unsupported_response_type",
            OAuthError::ServerError(_) => "server_error",
        }
    }

    /// The `error_description` placed on the wire. Server errors carry none.
    pub fn description(&self) -> Option<String> {
        match self {
            OAuthError::InvalidGrant(reason) | OAuthError::UnauthorizedClient(reason) => {
                Some((*reason).to_string())
            }
            OAuthError::InvalidRequest(reason) => Some(reason.clone()),
            OAuthError::InvalidClient
            | OAuthError::UnsupportedGrantType
            | OAuthError::UnsupportedResponseType
            | OAuthError::ServerError(_) => None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            OAuthError::InvalidClient => StatusCode::UNAUTHORIZED,
            OAuthError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<sea_orm::DbErr> for OAuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        OAuthError::ServerError(format!("storage: {err}"))
    }
}

impl From<jsonwebtoken::errors::Error> for OAuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        OAuthError::ServerError(format!("signing: {err}"))
    }
}

/// JSON error body returned by the OAuth2 endpoints.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl From<&OAuthError> for ErrorResponse {
    fn from(err: &OAuthError) -> Self {
        Self {
            error: err.error_code().to_string(),
            error_description: err.description(),
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        if let OAuthError::ServerError(detail) = &self {
            tracing::error!(%detail, "OAuth2 request failed");
        }
        (self.status(), Json(ErrorResponse::from(&self))).into_response()
    }
}

/// Reasons a presented JWT fails verification. Callers outside the server
/// only ever see "invalid"; the variants exist for logging.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token rejected: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("unexpected token_type {0:?}")]
    WrongTokenType(String),
}

/// Failures of the application key-pair lifecycle.
#[derive(Debug, Error)]
pub enum KeyPairError {
    #[error("key pair {0} not found")]
    NotFound(String),
    #[error("application {0} not found")]
    UnknownApp(String),
    #[error("application {0} is not active")]
    AppInactive(String),
    #[error("key pair {0} is not active")]
    Inactive(String),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("invalid expiry: {0}")]
    InvalidExpiry(String),
    #[error("key generation failed: {0}")]
    KeyGeneration(String),
    #[error("stored key material is unusable: {0}")]
    KeyMaterial(String),
    #[error("storage error: {0}")]
    Storage(#[from] sea_orm::DbErr),
}

impl KeyPairError {
    pub fn status(&self) -> StatusCode {
        match self {
            KeyPairError::NotFound(_) | KeyPairError::UnknownApp(_) => StatusCode::NOT_FOUND,
            KeyPairError::Inactive(_) | KeyPairError::AppInactive(_) => StatusCode::CONFLICT,
            KeyPairError::UnsupportedAlgorithm(_) | KeyPairError::InvalidExpiry(_) => {
                StatusCode::BAD_REQUEST
            }
            KeyPairError::KeyGeneration(_)
            | KeyPairError::KeyMaterial(_)
            | KeyPairError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for KeyPairError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error, description) = match &self {
            KeyPairError::NotFound(_) | KeyPairError::UnknownApp(_) => {
                ("not_found", Some(self.to_string()))
            }
            KeyPairError::Inactive(_) => ("key_inactive", Some(self.to_string())),
            KeyPairError::AppInactive(_) => ("app_inactive", Some(self.to_string())),
            KeyPairError::UnsupportedAlgorithm(_) | KeyPairError::InvalidExpiry(_) => {
                ("invalid_request", Some(self.to_string()))
            }
            KeyPairError::KeyGeneration(_)
            | KeyPairError::KeyMaterial(_)
            | KeyPairError::Storage(_) => {
                tracing::error!(error = %self, "key pair operation failed");
                ("server_error", None)
            }
        };
        (
            status,
            Json(ErrorResponse {
                error: error.to_string(),
                error_description: description,
            }),
        )
            .into_response()
    }
}

/// Failures registering or looking up developers and external applications.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("developer {0} not found")]
    UnknownDeveloper(String),
    #[error("developer {0} is not active")]
    DeveloperInactive(String),
    #[error("application {0} not found")]
    UnknownApp(String),
    #[error("a developer with email {0} already exists")]
    DuplicateEmail(String),
    #[error("storage error: {0}")]
    Storage(#[from] sea_orm::DbErr),
}

impl RegistryError {
    pub fn status(&self) -> StatusCode {
        match self {
            RegistryError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RegistryError::UnknownDeveloper(_) | RegistryError::UnknownApp(_) => {
                StatusCode::NOT_FOUND
            }
            RegistryError::DeveloperInactive(_) | RegistryError::DuplicateEmail(_) => {
                StatusCode::CONFLICT
            }
            RegistryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error, description) = match &self {
            RegistryError::InvalidRequest(reason) => ("invalid_request", Some(reason.clone())),
            RegistryError::UnknownDeveloper(_) | RegistryError::UnknownApp(_) => {
                ("not_found", Some(self.to_string()))
            }
            RegistryError::DeveloperInactive(_) => ("developer_inactive", Some(self.to_string())),
            RegistryError::DuplicateEmail(_) => ("conflict", Some(self.to_string())),
            RegistryError::Storage(_) => {
                tracing::error!(error = %self, "registry operation failed");
                ("server_error", None)
            }
        };
        (
            status,
            Json(ErrorResponse {
                error: error.to_string(),
                error_description: description,
            }),
        )
            .into_response()
    }
}
