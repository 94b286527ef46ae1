use super::engine::{BotDetectionEngine, BotDetectionError};
use crate::config::SchedulerConfig;
use crate::verdict::BatchReport;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Outcome of one scheduler tick
#[derive(Debug, Clone, Default)]
pub struct SchedulerRun {
    pub backlog: BatchReport,
    pub stale: BatchReport,
}

/// Periodically drains the backlog and refreshes stale sources
pub struct BotDetectionScheduler {
    engine: Arc<BotDetectionEngine>,
    config: SchedulerConfig,
}

impl BotDetectionScheduler {
    pub fn new(engine: Arc<BotDetectionEngine>) -> Self {
        let config = engine.config().scheduler.clone();
        Self { engine, config }
    }

    pub fn with_config(engine: Arc<BotDetectionEngine>, config: SchedulerConfig) -> Self {
        Self { engine, config }
    }

    /// Backlog first, so fresh traffic is classified before sources are refreshed
    pub async fn run_once(&self) -> Result<SchedulerRun, BotDetectionError> {
        let backlog = self.engine.analyze_backlog(self.config.backlog_limit).await?;
        let stale = self
            .engine
            .reanalyze_stale(self.config.stale_after_hours, self.config.stale_limit)
            .await?;

        Ok(SchedulerRun { backlog, stale })
    }

    /// Run until `cancellation_token` is cancelled. A failing tick is logged and
    /// the loop continues with the next one.
    pub async fn start(&self, cancellation_token: CancellationToken) {
        info!(
            interval_secs = self.config.interval_secs,
            "Starting bot detection scheduler"
        );
        let mut interval = time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = cancellation_token.cancelled() => {
                    info!("Bot detection scheduler received cancellation signal");
                    return;
                }
            }

            tokio::select! {
                result = self.run_once() => match result {
                    Ok(run) => debug!(
                        "Scheduler tick finished: backlog {}, stale {}",
                        run.backlog.summary(),
                        run.stale.summary()
                    ),
                    Err(e) => error!(retryable = e.is_retryable(), "Scheduler tick failed: {}", e),
                },
                _ = cancellation_token.cancelled() => {
                    info!("Bot detection scheduler cancelled during a run");
                    return;
                }
            }
        }
    }
}
