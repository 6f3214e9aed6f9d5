use flash_oauth2::AppResources;
use flash_oauth2::api::{AdminState, start_webserver};
use flash_oauth2::config::{AppConfig, load_config};
use flash_oauth2::oauth2::{OAuth2State, SigningKey};
use sea_orm::Database;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "flash_oauth2=info,tower_http=info,sea_orm=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_level(true))
        .init();
}

async fn load_signing_key(config: &AppConfig) -> color_eyre::Result<SigningKey> {
    let kid = config.oauth2.signing_key_id.clone();
    match &config.oauth2.signing_key_path {
        Some(path) => {
            tracing::info!(%path, %kid, "loading signing key");
            Ok(SigningKey::from_file(kid, path)?)
        }
        None => {
            tracing::warn!(
                %kid,
                "no oauth2.signing_key_path configured; generating an ephemeral signing key, \
                 tokens will not survive a restart"
            );
            Ok(tokio::task::spawn_blocking(move || SigningKey::generate(kid)).await??)
        }
    }
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    initialize_tracing();

    let config = Arc::new(load_config()?);

    let db = Arc::new(Database::connect(&config.database_url).await?);
    let signing_key = Arc::new(load_signing_key(&config).await?);

    let oauth2_state = OAuth2State::new(
        db.clone(),
        signing_key,
        config.oauth2.issuer_url.clone(),
        config.oauth2.login_url.clone(),
    );
    let admin_state = AdminState::new(
        db,
        config.admin_allowed_nets.clone(),
        config.trusted_proxies.clone(),
    );

    let resources = AppResources { config };
    start_webserver(resources, oauth2_state, admin_state).await
}
