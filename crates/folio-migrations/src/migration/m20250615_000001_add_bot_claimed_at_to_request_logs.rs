use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Batch runs claim rows here before analyzing them
        manager
            .alter_table(
                Table::alter()
                    .table(Alias::new("request_logs"))
                    .add_column(
                        ColumnDef::new(Alias::new("bot_claimed_at"))
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(Alias::new("request_logs"))
                    .drop_column(Alias::new("bot_claimed_at"))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}
