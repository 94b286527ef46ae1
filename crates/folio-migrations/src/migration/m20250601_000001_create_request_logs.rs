use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("request_logs"))
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alias::new("id"))
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Alias::new("client_ip")).string_len(45).not_null())
                    .col(ColumnDef::new(Alias::new("user_agent")).text().null())
                    .col(ColumnDef::new(Alias::new("url")).text().null())
                    .col(ColumnDef::new(Alias::new("method")).string_len(10).not_null())
                    .col(ColumnDef::new(Alias::new("status_code")).small_integer().not_null())
                    .col(ColumnDef::new(Alias::new("user_id")).integer().null())
                    .col(
                        ColumnDef::new(Alias::new("created_at"))
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("is_bot_by_frequency"))
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Alias::new("is_bot_by_user_agent"))
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Alias::new("is_bot_by_parameters"))
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Alias::new("bot_detection_metadata")).json().null())
                    .col(
                        ColumnDef::new(Alias::new("bot_analyzed_at"))
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Frequency windows scan one address over a time range
        manager
            .create_index(
                Index::create()
                    .name("idx_request_logs_client_ip_created_at")
                    .table(Alias::new("request_logs"))
                    .col(Alias::new("client_ip"))
                    .col(Alias::new("created_at"))
                    .to_owned(),
            )
            .await?;

        // Backlog selection: unanalyzed rows, newest first
        manager
            .create_index(
                Index::create()
                    .name("idx_request_logs_bot_analyzed_at_created_at")
                    .table(Alias::new("request_logs"))
                    .col(Alias::new("bot_analyzed_at"))
                    .col(Alias::new("created_at"))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(Alias::new("request_logs"))
                    .if_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}
