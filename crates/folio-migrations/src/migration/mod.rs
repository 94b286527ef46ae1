pub use sea_orm_migration::prelude::*;

mod m20250601_000001_create_request_logs;
mod m20250601_000002_create_ip_metadata;
mod m20250615_000001_add_bot_claimed_at_to_request_logs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601_000001_create_request_logs::Migration),
            Box::new(m20250601_000002_create_ip_metadata::Migration),
            Box::new(m20250615_000001_add_bot_claimed_at_to_request_logs::Migration),
        ]
    }
}
