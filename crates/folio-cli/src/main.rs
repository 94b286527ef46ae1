//! folio-bot - command-line entrypoint for bot detection
//!
//! Runs migrations, one-off analyses and the periodic scheduler against the
//! request log database.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AnalyzeCommand, BacklogCommand, MigrateCommand, ReanalyzeCommand, ScheduleCommand};
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "FOLIO_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "FOLIO_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply database migrations
    Migrate(MigrateCommand),
    /// Analyze a single logged request
    Analyze(AnalyzeCommand),
    /// Analyze the newest unanalyzed requests
    Backlog(BacklogCommand),
    /// Re-run analysis for sources not analyzed recently
    Reanalyze(ReanalyzeCommand),
    /// Run backlog and stale-source analysis periodically until Ctrl+C
    Schedule(ScheduleCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = cli.log_level.clone();

    // RUST_LOG takes precedence over --log-level
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .map_err(|e| anyhow::anyhow!("Invalid RUST_LOG environment variable: {}", e))?
    } else {
        tracing_subscriber::EnvFilter::new(format!(
            "folio_cli={level},\
             folio_bot_detection={level},\
             folio_core={level},\
             folio_database={level},\
             folio_migrations={level},\
             sqlx=warn,\
             sea_orm=warn,\
             sea_orm_migration=warn",
            level = log_level
        ))
    };

    let fmt_layer = match cli.log_format.as_str() {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set global default subscriber: {}", e))?;

    match cli.command {
        Commands::Migrate(cmd) => cmd.execute(),
        Commands::Analyze(cmd) => cmd.execute(),
        Commands::Backlog(cmd) => cmd.execute(),
        Commands::Reanalyze(cmd) => cmd.execute(),
        Commands::Schedule(cmd) => cmd.execute(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backlog_with_overrides() {
        let cli = Cli::try_parse_from([
            "folio-bot",
            "--log-level",
            "debug",
            "backlog",
            "--database-url",
            "sqlite::memory:",
            "--limit",
            "25",
        ])
        .unwrap();

        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Commands::Backlog(cmd) => {
                assert_eq!(cmd.limit, Some(25));
                assert!(cmd.engine.config.is_none());
            }
            _ => panic!("Expected backlog command"),
        }
    }

    #[test]
    fn test_analyze_requires_request_id() {
        let result = Cli::try_parse_from([
            "folio-bot",
            "analyze",
            "--database-url",
            "sqlite::memory:",
        ]);
        assert!(result.is_err());
    }
}
