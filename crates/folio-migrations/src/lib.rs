//! Database migrations for the Folio application

pub use sea_orm_migration::prelude::*;

mod migration;

pub use migration::Migrator;

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ConnectionTrait, Database};

    #[tokio::test]
    async fn test_migrations_apply_on_sqlite() -> anyhow::Result<()> {
        let db = Database::connect("sqlite::memory:").await?;

        Migrator::up(&db, None).await?;
        let manager = SchemaManager::new(&db);
        assert!(manager.has_table("request_logs").await?);
        assert!(manager.has_table("ip_metadata").await?);

        // Claim column from the follow-up migration is queryable
        db.execute_unprepared("SELECT bot_claimed_at FROM request_logs")
            .await?;

        // Re-running is a no-op
        Migrator::up(&db, None).await?;

        Ok(())
    }
}
