//! Admin endpoints for developers, their applications and application key pairs.
//!
//! - `POST /developers` - Register a developer
//! - `GET /developers/{developer_id}/apps` - List a developer's applications
//! - `POST /apps` - Register an external application
//! - `GET /apps` - List every application
//! - `POST /apps/{app_id}/keys` - Generate a key pair (private key returned once)
//! - `GET /apps/{app_id}/keys` - List an application's key pairs
//! - `GET /keys/{key_id}` - Fetch one key pair
//! - `POST /keys/{key_id}/revoke` - Revoke a key pair
//!
//! Only reachable from networks listed in `admin_allowed_nets`.

use crate::api::auth::AuthError;
use crate::app_keys::{AppKeyManager, GeneratedKeyPair, parse_expires_in};
use crate::app_registry::{AppRegistry, AppWithDeveloper, NewDeveloper, NewExternalApp};
use crate::config::IpNet;
use crate::entity::app_key_pair::{self, KeyAlgorithm, KeyStatus};
use crate::entity::developer::{self, DeveloperStatus};
use crate::entity::external_app::{self, AppStatus};
use crate::error::{ErrorResponse, KeyPairError, RegistryError};
use axum::{
    Json,
    extract::{ConnectInfo, FromRef, FromRequestParts, Path, State},
    http::{HeaderMap, StatusCode, request::Parts},
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use time::OffsetDateTime;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Tag for OpenAPI documentation.
pub const ADMIN_TAG: &str = "Admin";

#[derive(Clone)]
pub struct AdminState {
    pub keys: AppKeyManager,
    pub apps: AppRegistry,
    pub allowed_nets: Arc<Vec<IpNet>>,
    pub trusted_proxies: Arc<Vec<IpNet>>,
}

impl AdminState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        allowed_nets: Vec<IpNet>,
        trusted_proxies: Vec<IpNet>,
    ) -> Self {
        Self {
            keys: AppKeyManager::with_db(db.clone()),
            apps: AppRegistry::new(db),
            allowed_nets: Arc::new(allowed_nets),
            trusted_proxies: Arc::new(trusted_proxies),
        }
    }
}

/// Creates the admin router, nested under `/api/admin`.
pub fn router(state: AdminState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(register_developer))
        .routes(routes!(list_developer_apps))
        .routes(routes!(register_app, list_apps))
        .routes(routes!(generate_key, list_keys))
        .routes(routes!(get_key))
        .routes(routes!(revoke_key))
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeveloperView {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub status: DeveloperStatus,
    pub api_quota: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<developer::Model> for DeveloperView {
    fn from(d: developer::Model) -> Self {
        Self {
            id: d.id,
            name: d.name,
            email: d.email,
            phone: d.phone,
            status: d.status,
            api_quota: d.api_quota,
            created_at: d.created_at,
            updated_at: d.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ExternalAppView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub developer_id: String,
    /// Present in the all-applications listing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub developer_name: Option<String>,
    pub status: AppStatus,
    pub callback_url: String,
    pub scopes: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub revoked_at: Option<OffsetDateTime>,
}

impl From<external_app::Model> for ExternalAppView {
    fn from(app: external_app::Model) -> Self {
        Self {
            id: app.id,
            name: app.name,
            description: app.description,
            developer_id: app.developer_id,
            developer_name: None,
            status: app.status,
            callback_url: app.callback_url,
            scopes: app.scopes,
            created_at: app.created_at,
            updated_at: app.updated_at,
            revoked_at: app.revoked_at,
        }
    }
}

impl From<AppWithDeveloper> for ExternalAppView {
    fn from(row: AppWithDeveloper) -> Self {
        Self {
            developer_name: row.developer_name,
            ..row.app.into()
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterDeveloperRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterAppRequest {
    pub developer_id: String,
    pub name: String,
    pub description: Option<String>,
    /// Absolute http(s) URL
    pub callback_url: String,
    /// Space-separated; defaults to `openid profile`
    pub scopes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AppListResponse {
    pub apps: Vec<ExternalAppView>,
}

/// Key pair as shown to administrators. Never includes the private key.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct KeyPairView {
    pub id: String,
    pub app_id: String,
    pub key_id: String,
    pub algorithm: KeyAlgorithm,
    /// Effective status; an active key past `expires_at` shows as `expired`
    pub status: KeyStatus,
    /// SPKI PEM
    pub public_key: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub revoked_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_used_at: Option<OffsetDateTime>,
}

impl KeyPairView {
    fn at(key: app_key_pair::Model, now: OffsetDateTime) -> Self {
        Self {
            status: key.effective_status(now),
            id: key.id,
            app_id: key.app_id,
            key_id: key.key_id,
            algorithm: key.algorithm,
            public_key: key.public_key,
            expires_at: key.expires_at,
            created_at: key.created_at,
            revoked_at: key.revoked_at,
            last_used_at: key.last_used_at,
        }
    }
}

impl From<app_key_pair::Model> for KeyPairView {
    fn from(key: app_key_pair::Model) -> Self {
        Self::at(key, OffsetDateTime::now_utc())
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GeneratedKeyResponse {
    #[serde(flatten)]
    pub key_pair: KeyPairView,
    /// PKCS#8 PEM. Returned only in this response.
    pub private_key: String,
}

impl From<GeneratedKeyPair> for GeneratedKeyResponse {
    fn from(generated: GeneratedKeyPair) -> Self {
        Self {
            key_pair: generated.key_pair.into(),
            private_key: generated.private_key,
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct GenerateKeyRequest {
    /// `RS256` (default), `RS384` or `RS512`
    pub algorithm: Option<String>,
    /// Lifetime such as `30d`, `2w`, `6m`, `1y` or `12h`; omit for no expiry
    pub expires_in: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct KeyPairListResponse {
    pub keys: Vec<KeyPairView>,
}

/// Resolves the address access control is decided on.
///
/// The socket peer is authoritative. `X-Forwarded-For` is read only when the
/// peer is a trusted proxy; the client is then the right-most hop that is not
/// itself a trusted proxy. An unparseable hop yields `None`.
pub fn client_ip(
    peer: Option<IpAddr>,
    headers: &HeaderMap,
    trusted_proxies: &[IpNet],
) -> Option<IpAddr> {
    let peer = peer?;
    let is_trusted = |ip: &IpAddr| trusted_proxies.iter().any(|net| net.contains(ip));
    if !is_trusted(&peer) {
        return Some(peer);
    }

    let hops: Vec<&str> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .collect();

    let mut client = peer;
    for hop in hops.iter().rev() {
        let ip = hop.parse::<IpAddr>().ok()?;
        client = ip;
        if !is_trusted(&ip) {
            break;
        }
    }
    Some(client)
}

/// Rejects callers outside `admin_allowed_nets`.
pub struct AdminAccess;

impl<S> FromRequestParts<S> for AdminAccess
where
    AdminState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let admin = AdminState::from_ref(state);

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        match client_ip(peer, &parts.headers, &admin.trusted_proxies) {
            Some(ip) if admin.allowed_nets.iter().any(|net| net.contains(&ip)) => Ok(AdminAccess),
            Some(ip) => {
                tracing::warn!(%ip, "admin request from disallowed address");
                Err(AuthError::forbidden("Access denied"))
            }
            None => {
                tracing::warn!("admin request without a usable client address");
                Err(AuthError::forbidden("Access denied"))
            }
        }
    }
}

/// Register a developer.
#[tracing::instrument(skip(state, _access, request))]
#[utoipa::path(
    post,
    path = "/developers",
    tag = ADMIN_TAG,
    operation_id = "Register Developer",
    summary = "Register a developer who can own external applications",
    request_body(content = RegisterDeveloperRequest, content_type = "application/json"),
    responses(
        (status = 201, description = "Developer registered", body = DeveloperView),
        (status = 400, description = "Missing name or malformed email", body = ErrorResponse),
        (status = 403, description = "Access denied", body = AuthError),
        (status = 409, description = "Email already registered", body = ErrorResponse),
    )
)]
pub async fn register_developer(
    _access: AdminAccess,
    State(state): State<AdminState>,
    Json(request): Json<RegisterDeveloperRequest>,
) -> Result<(StatusCode, Json<DeveloperView>), RegistryError> {
    let developer = state
        .apps
        .register_developer(NewDeveloper {
            name: request.name,
            email: request.email,
            phone: request.phone,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(developer.into())))
}

#[tracing::instrument(skip(state, _access))]
#[utoipa::path(
    get,
    path = "/developers/{developer_id}/apps",
    tag = ADMIN_TAG,
    operation_id = "List Developer Apps",
    summary = "List a developer's applications, newest first",
    params(("developer_id" = String, Path, description = "Developer identifier")),
    responses(
        (status = 200, description = "The developer's applications", body = AppListResponse),
        (status = 403, description = "Access denied", body = AuthError),
        (status = 404, description = "Unknown developer", body = ErrorResponse),
    )
)]
pub async fn list_developer_apps(
    _access: AdminAccess,
    State(state): State<AdminState>,
    Path(developer_id): Path<String>,
) -> Result<Json<AppListResponse>, RegistryError> {
    let apps = state
        .apps
        .list_developer_apps(&developer_id)
        .await?
        .into_iter()
        .map(ExternalAppView::from)
        .collect();
    Ok(Json(AppListResponse { apps }))
}

/// Register an external application.
#[tracing::instrument(skip(state, _access, request))]
#[utoipa::path(
    post,
    path = "/apps",
    tag = ADMIN_TAG,
    operation_id = "Register External App",
    summary = "Register an external application under a developer",
    description = "The application starts out active and can then be issued key pairs.",
    request_body(content = RegisterAppRequest, content_type = "application/json"),
    responses(
        (status = 201, description = "Application registered", body = ExternalAppView),
        (status = 400, description = "Missing name or invalid callback URL", body = ErrorResponse),
        (status = 403, description = "Access denied", body = AuthError),
        (status = 404, description = "Unknown developer", body = ErrorResponse),
        (status = 409, description = "Developer is suspended", body = ErrorResponse),
    )
)]
pub async fn register_app(
    _access: AdminAccess,
    State(state): State<AdminState>,
    Json(request): Json<RegisterAppRequest>,
) -> Result<(StatusCode, Json<ExternalAppView>), RegistryError> {
    let app = state
        .apps
        .register_app(NewExternalApp {
            developer_id: request.developer_id,
            name: request.name,
            description: request.description,
            callback_url: request.callback_url,
            scopes: request.scopes,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(app.into())))
}

#[tracing::instrument(skip(state, _access))]
#[utoipa::path(
    get,
    path = "/apps",
    tag = ADMIN_TAG,
    operation_id = "List All Apps",
    summary = "List every application with its developer's name, newest first",
    responses(
        (status = 200, description = "All applications", body = AppListResponse),
        (status = 403, description = "Access denied", body = AuthError),
    )
)]
pub async fn list_apps(
    _access: AdminAccess,
    State(state): State<AdminState>,
) -> Result<Json<AppListResponse>, RegistryError> {
    let apps = state
        .apps
        .list_all_apps()
        .await?
        .into_iter()
        .map(ExternalAppView::from)
        .collect();
    Ok(Json(AppListResponse { apps }))
}

/// Generate a key pair for an application.
#[tracing::instrument(skip(state, _access, body))]
#[utoipa::path(
    post,
    path = "/apps/{app_id}/keys",
    tag = ADMIN_TAG,
    operation_id = "Generate App Key Pair",
    summary = "Generate an RSA key pair for an application",
    description = "Creates a fresh RSA-2048 key pair owned by a registered, active application. \
                   The private key is part of this response only and cannot be retrieved again.\n\n\
                   **Access control:** Only accessible from allowed networks.",
    params(("app_id" = String, Path, description = "Owning application")),
    request_body(content = GenerateKeyRequest, content_type = "application/json"),
    responses(
        (status = 201, description = "Key pair generated", body = GeneratedKeyResponse),
        (status = 400, description = "Unsupported algorithm or malformed expires_in", body = ErrorResponse),
        (status = 403, description = "Access denied - client IP not in allowed networks", body = AuthError),
        (status = 404, description = "Unknown application", body = ErrorResponse),
        (status = 409, description = "Application is not active", body = ErrorResponse),
    )
)]
pub async fn generate_key(
    _access: AdminAccess,
    State(state): State<AdminState>,
    Path(app_id): Path<String>,
    body: Option<Json<GenerateKeyRequest>>,
) -> Result<(StatusCode, Json<GeneratedKeyResponse>), KeyPairError> {
    let Json(request) = body.unwrap_or_default();

    let algorithm = match request.algorithm.as_deref() {
        None | Some("") => KeyAlgorithm::default(),
        Some(alg) => alg
            .parse::<KeyAlgorithm>()
            .map_err(|_| KeyPairError::UnsupportedAlgorithm(alg.to_string()))?,
    };
    let expires_at = match request.expires_in.as_deref() {
        None | Some("") => None,
        Some(lifetime) => Some(OffsetDateTime::now_utc() + parse_expires_in(lifetime)?),
    };

    let generated = state.keys.generate(&app_id, algorithm, expires_at).await?;
    Ok((StatusCode::CREATED, Json(generated.into())))
}

/// List an application's key pairs.
#[tracing::instrument(skip(state, _access))]
#[utoipa::path(
    get,
    path = "/apps/{app_id}/keys",
    tag = ADMIN_TAG,
    operation_id = "List App Key Pairs",
    summary = "List key pairs of an application, newest first",
    params(("app_id" = String, Path, description = "Owning application")),
    responses(
        (status = 200, description = "Key pairs without private keys", body = KeyPairListResponse),
        (status = 403, description = "Access denied", body = AuthError),
    )
)]
pub async fn list_keys(
    _access: AdminAccess,
    State(state): State<AdminState>,
    Path(app_id): Path<String>,
) -> Result<Json<KeyPairListResponse>, KeyPairError> {
    let now = OffsetDateTime::now_utc();
    let keys = state
        .keys
        .list_by_app(&app_id)
        .await?
        .into_iter()
        .map(|key| KeyPairView::at(key, now))
        .collect();
    Ok(Json(KeyPairListResponse { keys }))
}

#[tracing::instrument(skip(state, _access))]
#[utoipa::path(
    get,
    path = "/keys/{key_id}",
    tag = ADMIN_TAG,
    operation_id = "Get Key Pair",
    summary = "Fetch a key pair by key id",
    params(("key_id" = String, Path, description = "Key identifier (kid)")),
    responses(
        (status = 200, description = "The key pair", body = KeyPairView),
        (status = 403, description = "Access denied", body = AuthError),
        (status = 404, description = "Unknown key id", body = ErrorResponse),
    )
)]
pub async fn get_key(
    _access: AdminAccess,
    State(state): State<AdminState>,
    Path(key_id): Path<String>,
) -> Result<Json<KeyPairView>, KeyPairError> {
    Ok(Json(state.keys.get_by_key_id(&key_id).await?.into()))
}

#[tracing::instrument(skip(state, _access))]
#[utoipa::path(
    post,
    path = "/keys/{key_id}/revoke",
    tag = ADMIN_TAG,
    operation_id = "Revoke Key Pair",
    summary = "Revoke a key pair",
    description = "Marks the key pair revoked. Revoking an already revoked key is not an error.",
    params(("key_id" = String, Path, description = "Key identifier (kid)")),
    responses(
        (status = 200, description = "The revoked key pair", body = KeyPairView),
        (status = 403, description = "Access denied", body = AuthError),
        (status = 404, description = "Unknown key id", body = ErrorResponse),
    )
)]
pub async fn revoke_key(
    _access: AdminAccess,
    State(state): State<AdminState>,
    Path(key_id): Path<String>,
) -> Result<Json<KeyPairView>, KeyPairError> {
    state.keys.revoke(&key_id).await?;
    Ok(Json(state.keys.get_by_key_id(&key_id).await?.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn nets(list: &[&str]) -> Vec<IpNet> {
        list.iter().map(|n| n.parse().unwrap()).collect()
    }

    fn forwarded(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_str(value).unwrap());
        headers
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn peer_wins_without_trusted_proxies() {
        let headers = forwarded("127.0.0.1");
        assert_eq!(
            client_ip(Some(ip("203.0.113.9")), &headers, &[]),
            Some(ip("203.0.113.9"))
        );
    }

    #[test]
    fn no_peer_means_no_client() {
        assert_eq!(client_ip(None, &forwarded("127.0.0.1"), &[]), None);
    }

    #[test]
    fn trusted_proxy_yields_rightmost_untrusted_hop() {
        let trusted = nets(&["10.0.0.0/8"]);
        // Client-supplied first entry is ignored.
        let headers = forwarded("127.0.0.1, 198.51.100.7, 10.0.0.2");
        assert_eq!(
            client_ip(Some(ip("10.0.0.1")), &headers, &trusted),
            Some(ip("198.51.100.7"))
        );
    }

    #[test]
    fn trusted_proxy_without_header_is_the_client() {
        let trusted = nets(&["10.0.0.0/8"]);
        assert_eq!(
            client_ip(Some(ip("10.0.0.1")), &HeaderMap::new(), &trusted),
            Some(ip("10.0.0.1"))
        );
    }

    #[test]
    fn garbage_hop_is_rejected() {
        let trusted = nets(&["10.0.0.0/8"]);
        let headers = forwarded("not-an-ip");
        assert_eq!(client_ip(Some(ip("10.0.0.1")), &headers, &trusted), None);
    }
}
