use super::output::{print_report, print_verdict};
use super::EngineArgs;
use clap::Args;
use tracing::info;

#[derive(Args)]
pub struct AnalyzeCommand {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// ID of the logged request
    #[arg(long)]
    pub request_id: i32,

    /// Print the verdict as JSON
    #[arg(long)]
    pub json: bool,
}

impl AnalyzeCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        info!("Analyzing request {}", self.request_id);

        let rt = tokio::runtime::Runtime::new()?;
        let verdict = rt.block_on(async {
            let engine = self.engine.build_engine().await?;
            anyhow::Ok(engine.analyze_request_by_id(self.request_id).await?)
        })?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&verdict)?);
        } else {
            print_verdict(self.request_id, &verdict);
        }
        Ok(())
    }
}

#[derive(Args)]
pub struct BacklogCommand {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Maximum number of requests to analyze (defaults to scheduler.backlog_limit)
    #[arg(long)]
    pub limit: Option<u64>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl BacklogCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        let report = rt.block_on(async {
            let engine = self.engine.build_engine().await?;
            let limit = self
                .limit
                .unwrap_or(engine.config().scheduler.backlog_limit);

            info!("Analyzing up to {} unanalyzed requests", limit);
            anyhow::Ok(engine.analyze_backlog(limit).await?)
        })?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report("Backlog analysis", &report);
        }
        Ok(())
    }
}

#[derive(Args)]
pub struct ReanalyzeCommand {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Sources analyzed longer ago than this are stale (defaults to scheduler.stale_after_hours)
    #[arg(long)]
    pub older_than_hours: Option<i64>,

    /// Maximum number of requests to analyze (defaults to scheduler.stale_limit)
    #[arg(long)]
    pub limit: Option<u64>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl ReanalyzeCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        let report = rt.block_on(async {
            let engine = self.engine.build_engine().await?;
            let scheduler = &engine.config().scheduler;
            let older_than_hours = self.older_than_hours.unwrap_or(scheduler.stale_after_hours);
            let limit = self.limit.unwrap_or(scheduler.stale_limit);

            info!(
                "Reanalyzing up to {} requests from sources older than {}h",
                limit, older_than_hours
            );
            anyhow::Ok(engine.reanalyze_stale(older_than_hours, limit).await?)
        })?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report("Stale source reanalysis", &report);
        }
        Ok(())
    }
}
