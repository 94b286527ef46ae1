pub mod analyze;
pub mod migrate;
mod output;
pub mod schedule;

pub use analyze::{AnalyzeCommand, BacklogCommand, ReanalyzeCommand};
pub use migrate::MigrateCommand;
pub use schedule::ScheduleCommand;

use clap::Args;
use folio_bot_detection::{BotDetectionConfig, BotDetectionEngine, RouteParameterCatalog};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Connection and configuration shared by every analysis command
#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    /// Database connection URL
    #[arg(long, env = "FOLIO_DATABASE_URL")]
    pub database_url: String,

    /// YAML file with detection thresholds and the route manifest
    #[arg(long, env = "FOLIO_BOT_CONFIG")]
    pub config: Option<PathBuf>,
}

impl EngineArgs {
    pub fn load_config(&self) -> anyhow::Result<BotDetectionConfig> {
        match &self.config {
            Some(path) => {
                info!("Loading bot detection configuration from {}", path.display());
                Ok(BotDetectionConfig::from_yaml_file(path)?)
            }
            None => {
                debug!("No configuration file given, using defaults");
                Ok(BotDetectionConfig::default())
            }
        }
    }

    /// Connect (applying migrations) and build an engine with a warmed catalog
    pub async fn build_engine(&self) -> anyhow::Result<Arc<BotDetectionEngine>> {
        let config = self.load_config()?;

        debug!("Initializing database connection...");
        let db = folio_database::establish_connection(&self.database_url).await?;

        let catalog = Arc::new(RouteParameterCatalog::from_config(&config.catalog));
        catalog.rebuild();

        Ok(Arc::new(BotDetectionEngine::new(db, catalog, config)))
    }
}
