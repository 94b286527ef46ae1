use clap::Args;
use colored::Colorize;
use folio_migrations::Migrator;
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use tracing::{debug, info};

#[derive(Args)]
pub struct MigrateCommand {
    /// Database connection URL
    #[arg(long, env = "FOLIO_DATABASE_URL")]
    pub database_url: String,
}

impl MigrateCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        info!("Applying database migrations");

        let rt = tokio::runtime::Runtime::new()?;
        let applied = rt.block_on(async {
            debug!("Initializing database connection...");
            let db = Database::connect(self.database_url.as_str()).await?;

            let pending: Vec<String> = Migrator::get_pending_migrations(&db)
                .await?
                .iter()
                .map(|migration| migration.name().to_string())
                .collect();
            Migrator::up(&db, None).await?;

            anyhow::Ok(pending)
        })?;

        if applied.is_empty() {
            println!("{}", "Database is up to date.".bright_green());
        } else {
            for name in &applied {
                println!("{} {}", "Applied".bright_green().bold(), name.bright_white());
            }
        }
        Ok(())
    }
}
