//! Shared fixtures: an in-memory schema, one signing key per test binary and
//! a seeded client `c1` / user `42`.
#![allow(dead_code)]

use axum::Extension;
use axum_test::TestServer;
use flash_oauth2::api::{AdminState, build_router};
use flash_oauth2::app_registry::{AppRegistry, NewDeveloper, NewExternalApp};
use flash_oauth2::config::{IpNet, default_admin_allowed_nets};
use flash_oauth2::entity::{external_app, oauth2_user};
use flash_oauth2::oauth2::{NewClient, OAuth2State, SessionUser, SigningKey};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ConnectionTrait, Database, DatabaseConnection, DbBackend,
    Statement,
};
use std::sync::{Arc, OnceLock};
use time::OffsetDateTime;

pub const ISSUER: &str = "https://auth.example.com";
pub const LOGIN_URL: &str = "https://auth.example.com/login";
pub const CLIENT_ID: &str = "c1";
pub const CLIENT_SECRET: &str = "s1";
pub const REDIRECT_URI: &str = "https://x/cb";
pub const USER_ID: &str = "42";
pub const USER_PHONE: &str = "+15550100042";

/// RSA generation is slow; every test in a binary shares this key.
pub fn signing_key() -> Arc<SigningKey> {
    static KEY: OnceLock<Arc<SigningKey>> = OnceLock::new();
    KEY.get_or_init(|| Arc::new(SigningKey::generate("test-key").expect("generate signing key")))
        .clone()
}

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE oauth2_client (
        id TEXT PRIMARY KEY,
        secret TEXT NOT NULL,
        name TEXT NOT NULL,
        redirect_uris TEXT NOT NULL,
        grant_types TEXT NOT NULL,
        response_types TEXT NOT NULL,
        scope TEXT NOT NULL,
        created_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE oauth2_user (
        id TEXT PRIMARY KEY,
        phone TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE oauth2_authorization (
        code TEXT PRIMARY KEY,
        client_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        redirect_uri TEXT NOT NULL,
        scope TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        created_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE oauth2_refresh_token (
        token TEXT PRIMARY KEY,
        client_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        scope TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        created_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE app_key_pair (
        id TEXT PRIMARY KEY,
        app_id TEXT NOT NULL,
        key_id TEXT NOT NULL UNIQUE,
        private_key TEXT NOT NULL,
        public_key TEXT NOT NULL,
        algorithm TEXT NOT NULL,
        status TEXT NOT NULL,
        expires_at TEXT NULL,
        created_at TEXT NOT NULL,
        revoked_at TEXT NULL,
        last_used_at TEXT NULL
    );"#,
    r#"CREATE TABLE developer (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        phone TEXT NULL,
        status TEXT NOT NULL,
        api_quota INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE external_app (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL,
        developer_id TEXT NOT NULL,
        status TEXT NOT NULL,
        callback_url TEXT NOT NULL,
        scopes TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        revoked_at TEXT NULL
    );"#,
];

/// Create a test database with every table the server uses
pub async fn create_test_db() -> Arc<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await.expect("connect");
    for sql in SCHEMA {
        db.execute(Statement::from_string(DbBackend::Sqlite, *sql))
            .await
            .expect("create table");
    }
    Arc::new(db)
}

/// OAuth2 state over a fresh database holding client `c1` and user `42`.
pub async fn create_test_state() -> OAuth2State {
    let db = create_test_db().await;
    let state = OAuth2State::new(db.clone(), signing_key(), ISSUER.into(), LOGIN_URL.into());

    state
        .clients
        .register(NewClient::new(
            CLIENT_ID,
            CLIENT_SECRET,
            vec![REDIRECT_URI.to_string()],
        ))
        .await
        .expect("register client");

    let now = OffsetDateTime::now_utc();
    oauth2_user::ActiveModel {
        id: Set(USER_ID.to_string()),
        phone: Set(USER_PHONE.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db.as_ref())
    .await
    .expect("insert user");

    state
}

pub fn admin_state(
    db: Arc<DatabaseConnection>,
    allowed_nets: Vec<IpNet>,
    trusted_proxies: Vec<IpNet>,
) -> AdminState {
    AdminState::new(db, allowed_nets, trusted_proxies)
}

/// Registers a developer and one active application, returning the app.
pub async fn register_test_app(db: Arc<DatabaseConnection>) -> external_app::Model {
    let registry = AppRegistry::new(db);
    let developer = registry
        .register_developer(NewDeveloper {
            name: "Acme".into(),
            email: format!("dev-{}@acme.example.com", uuid::Uuid::new_v4()),
            phone: None,
        })
        .await
        .expect("register developer");
    registry
        .register_app(NewExternalApp {
            developer_id: developer.id,
            name: "Acme Mobile".into(),
            description: None,
            callback_url: "https://acme.example.com/cb".into(),
            scopes: None,
        })
        .await
        .expect("register app")
}

/// The full router. With `session_user` set, every request looks logged in.
pub fn test_server(state: &OAuth2State, session_user: Option<&str>) -> TestServer {
    let admin = admin_state(state.db.clone(), default_admin_allowed_nets(), Vec::new());
    let mut app = build_router(state.clone(), admin);
    if let Some(user_id) = session_user {
        app = app.layer(Extension(SessionUser {
            user_id: user_id.to_string(),
        }));
    }
    TestServer::new(app).expect("create test server")
}

pub fn basic_auth(client_id: &str, secret: &str) -> String {
    use base64::Engine;
    let encoded =
        base64::engine::general_purpose::STANDARD.encode(format!("{client_id}:{secret}"));
    format!("Basic {encoded}")
}
