use config::{Config, File};
use sea_orm_migration::prelude::*;
use std::env;

/// `database_url` from an optional config.yaml, mirroring the server's lookup.
fn database_url_from_config() -> Option<String> {
    Config::builder()
        .add_source(File::with_name("config.yaml").required(false))
        .build()
        .ok()?
        .get_string("database_url")
        .ok()
}

#[tokio::main]
async fn main() {
    // DATABASE_URL or --database-url win over the config file
    if env::var("DATABASE_URL").is_err() {
        if let Some(url) = database_url_from_config() {
            env::set_var("DATABASE_URL", url);
        }
    }
    cli::run_cli(migration::Migrator).await;
}
