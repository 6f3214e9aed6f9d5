//! SeaORM entities for the durable store.

pub mod app_key_pair;
pub mod developer;
pub mod external_app;
pub mod oauth2_authorization;
pub mod oauth2_client;
pub mod oauth2_refresh_token;
pub mod oauth2_user;
