use sea_orm_migration::prelude::*;

mod m20250601_create_accounts;
mod m20250601_create_refresh_tokens;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601_create_accounts::Migration),
            Box::new(m20250601_create_refresh_tokens::Migration),
        ]
    }
}
