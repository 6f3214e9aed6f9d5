pub use sea_orm_migration::prelude::*;

mod m20251016_000001_create_oauth2_tables;
mod m20251016_000002_create_app_key_pair;
mod m20251016_000003_create_app_registry;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20251016_000001_create_oauth2_tables::Migration),
            Box::new(m20251016_000002_create_app_key_pair::Migration),
            Box::new(m20251016_000003_create_app_registry::Migration),
        ]
    }
}
