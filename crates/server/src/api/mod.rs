//! HTTP surface.
//!
//! - `oauth2` endpoints (/oauth2/*, /.well-known/*) live in [`crate::oauth2::endpoints`]
//! - `admin` - Developers, applications and their key pairs (/api/admin/*)
//! - `auth` - Bearer-token extractor
//! - `health` - Health check endpoint (/healthz)
//! - `openapi` - OpenAPI/Utoipa configuration

pub mod admin;
pub mod auth;
pub mod health;
pub mod openapi;

pub use admin::{ADMIN_TAG, AdminState};
pub use health::MISC_TAG;

use crate::AppResources;
use crate::oauth2::{self, OAuth2State};
use axum::Router;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// Assembles every route, the OpenAPI document and the middleware layers.
pub fn build_router(oauth2_state: OAuth2State, admin_state: AdminState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .nest("/oauth2", oauth2::router(oauth2_state.clone()))
        .merge(oauth2::well_known_router(oauth2_state))
        .nest("/api/admin", admin::router(admin_state))
        .routes(routes!(health::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    router.merge(Redoc::with_url("/api-docs", api))
}

/// Starts the web server with all configured routes.
#[tracing::instrument(skip_all)]
pub async fn start_webserver(
    resources: AppResources,
    oauth2_state: OAuth2State,
    admin_state: AdminState,
) -> color_eyre::Result<()> {
    let router = build_router(oauth2_state, admin_state);

    let addr = resources.config.listen_addr.as_str();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, issuer = %resources.config.oauth2.issuer_url, "Server running");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
