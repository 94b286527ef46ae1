use super::EngineArgs;
use clap::Args;
use folio_bot_detection::BotDetectionScheduler;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Args)]
pub struct ScheduleCommand {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Seconds between runs (defaults to scheduler.interval_secs)
    #[arg(long)]
    pub interval_secs: Option<u64>,
}

impl ScheduleCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(async {
            let engine = self.engine.build_engine().await?;
            let mut config = engine.config().scheduler.clone();
            if let Some(interval_secs) = self.interval_secs {
                config.interval_secs = interval_secs;
            }

            let scheduler = BotDetectionScheduler::with_config(engine, config);
            let cancellation_token = CancellationToken::new();

            let signal_token = cancellation_token.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        info!("Received Ctrl+C, stopping scheduler");
                        signal_token.cancel();
                    }
                    Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
                }
            });

            scheduler.start(cancellation_token).await;
            anyhow::Ok(())
        })
    }
}
