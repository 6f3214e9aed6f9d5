//! An OAuth2 / OpenID Connect authorization server.
//!
//! Issues RS256-signed access and ID tokens for registered clients through the
//! authorization-code and refresh-token grants, and manages RSA key pairs that
//! external applications use to sign their own tokens.

use std::sync::Arc;

use crate::config::AppConfig;

pub mod api;
pub mod app_keys;
pub mod app_registry;
pub mod config;
pub mod crypto;
pub mod entity;
pub mod error;
pub mod oauth2;

#[derive(Clone, Debug)]
pub struct AppResources {
    pub config: Arc<AppConfig>,
}
