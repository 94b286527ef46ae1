use chrono::{Duration, TimeZone, Utc};
use folio_bot_detection::{
    BotDetectionConfig, BotDetectionEngine, CreateRequestLog, ParsedUserAgent, RequestLogService,
    RouteDeclaration, RouteParameterCatalog, SourceMetadataStore, UserAgentParser,
    WootheeUserAgentParser,
};
use folio_core::DBDateTime;
use folio_database::test_utils::TestDatabase;
use std::sync::Arc;

const CHROME: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

struct Harness {
    db: TestDatabase,
    engine: Arc<BotDetectionEngine>,
    logs: RequestLogService,
    sources: SourceMetadataStore,
}

async fn harness_with(
    config: BotDetectionConfig,
    parser: Option<Arc<dyn UserAgentParser>>,
) -> anyhow::Result<Harness> {
    let db = TestDatabase::new().await?;
    let catalog = Arc::new(RouteParameterCatalog::from_config(&config.catalog));
    let mut engine = BotDetectionEngine::new(db.connection_arc(), catalog, config);
    if let Some(parser) = parser {
        engine = engine.with_user_agent_parser(parser);
    }

    Ok(Harness {
        engine: Arc::new(engine),
        logs: RequestLogService::new(db.connection_arc()),
        sources: SourceMetadataStore::new(db.connection_arc()),
        db,
    })
}

async fn harness() -> anyhow::Result<Harness> {
    harness_with(BotDetectionConfig::default(), None).await
}

fn base() -> DBDateTime {
    Utc.with_ymd_and_hms(2025, 6, 1, 14, 0, 0).unwrap()
}

/// Make the database refuse to store a verdict for request `id`
async fn reject_verdicts_for(db: &TestDatabase, id: i32) -> anyhow::Result<()> {
    db.execute_sql(&format!(
        "CREATE TRIGGER reject_verdict BEFORE UPDATE OF bot_analyzed_at ON request_logs \
         WHEN NEW.id = {} AND NEW.bot_analyzed_at IS NOT NULL \
         BEGIN SELECT RAISE(ABORT, 'verdict rejected'); END",
        id
    ))
    .await?;
    Ok(())
}

struct FixedParser(ParsedUserAgent);

impl UserAgentParser for FixedParser {
    fn parse(&self, _user_agent: &str) -> ParsedUserAgent {
        self.0.clone()
    }
}

#[tokio::test]
async fn test_one_request_per_second_is_a_frequency_bot() -> anyhow::Result<()> {
    let h = harness().await?;

    let mut last_id = 0;
    for second in 0..50 {
        let log = h
            .logs
            .record(
                CreateRequestLog::new("192.168.1.1")
                    .user_agent("Mozilla/5.0")
                    .url("/blog/hello-world")
                    .created_at(base() + Duration::seconds(second)),
            )
            .await?;
        last_id = log.id;
    }

    let verdict = h.engine.analyze_request_by_id(last_id).await?;
    assert!(verdict.is_bot);
    assert!(verdict.flags.by_frequency);
    assert!(verdict.reasons[0].contains("High request frequency"));
    assert!(verdict.reasons[0].contains("60.00"));

    let stored = h.logs.get(last_id).await?;
    assert!(stored.is_bot_by_frequency);
    let frequency = &stored.bot_detection_metadata.unwrap()["frequency_analysis"];
    let rpm = frequency["requests_per_minute"].as_f64().unwrap();
    assert!((rpm - 60.0).abs() < 0.01);
    Ok(())
}

#[tokio::test]
async fn test_suspicious_parameters_on_undeclared_route() -> anyhow::Result<()> {
    let h = harness().await?;
    let log = h
        .logs
        .record(
            CreateRequestLog::new("192.168.1.2")
                .user_agent(CHROME)
                .url("/landing?a1b2c3d4e5f6g7h8i9j0=randomvalue32charslongabcdefghijk&debug=1")
                .created_at(base()),
        )
        .await?;

    let verdict = h.engine.analyze_request(&log).await?;
    assert!(verdict.is_bot);
    assert!(verdict.flags.by_parameters);
    assert!(!verdict.flags.by_frequency);
    assert!(h.logs.get(log.id).await?.is_bot_by_parameters);
    Ok(())
}

#[tokio::test]
async fn test_declared_route_parameters_are_accepted() -> anyhow::Result<()> {
    let mut config = BotDetectionConfig::default();
    config
        .catalog
        .routes
        .push(RouteDeclaration::new("downloads/{slug}", ["signature"]));
    let h = harness_with(config, None).await?;

    // A high-entropy value is fine when the route expects the parameter
    let log = h
        .logs
        .record(
            CreateRequestLog::new("192.168.1.3")
                .user_agent(CHROME)
                .url("/downloads/report?signature=Zx8Qw2Lp9Rt4Vn7Bk3Hs6Jd1Fg5Mc0Ya")
                .created_at(base()),
        )
        .await?;

    let verdict = h.engine.analyze_request(&log).await?;
    assert!(!verdict.flags.by_parameters);
    Ok(())
}

#[tokio::test]
async fn test_single_curl_request_depends_on_parser() -> anyhow::Result<()> {
    let recognizes_curl = harness_with(
        BotDetectionConfig::default(),
        Some(Arc::new(FixedParser(ParsedUserAgent {
            bot_name: Some("curl".to_string()),
            ..ParsedUserAgent::default()
        }))),
    )
    .await?;
    let log = recognizes_curl
        .logs
        .record(CreateRequestLog::new("10.0.0.1").user_agent("curl/7.68.0").created_at(base()))
        .await?;
    let verdict = recognizes_curl.engine.analyze_request(&log).await?;
    assert!(verdict.is_bot);
    assert!(verdict.flags.by_user_agent);

    let unaware = harness_with(
        BotDetectionConfig::default(),
        Some(Arc::new(FixedParser(ParsedUserAgent::default()))),
    )
    .await?;
    let log = unaware
        .logs
        .record(CreateRequestLog::new("10.0.0.1").user_agent("curl/7.68.0").created_at(base()))
        .await?;
    let verdict = unaware.engine.analyze_request(&log).await?;
    assert!(!verdict.is_bot);

    // The default parser decides based on its own crawler database
    let default = harness().await?;
    let log = default
        .logs
        .record(CreateRequestLog::new("10.0.0.1").user_agent("curl/7.68.0").created_at(base()))
        .await?;
    let verdict = default.engine.analyze_request(&log).await?;
    let known = WootheeUserAgentParser.parse("curl/7.68.0").bot_name.is_some();
    assert_eq!(verdict.is_bot, known);
    Ok(())
}

#[tokio::test]
async fn test_human_paced_browsing_is_clean() -> anyhow::Result<()> {
    let h = harness().await?;

    for step in 0..4 {
        let log = h
            .logs
            .record(
                CreateRequestLog::new("172.16.0.10")
                    .user_agent(CHROME)
                    .url("/blog?page=2&sort=date")
                    .created_at(base() + Duration::minutes(10 * step)),
            )
            .await?;

        let verdict = h.engine.analyze_request(&log).await?;
        assert!(!verdict.is_bot);
        assert!(!verdict.flags.by_frequency);
        assert!(!verdict.flags.by_user_agent);
        assert!(!verdict.flags.by_parameters);
    }

    let source = h.sources.get("172.16.0.10").await?.unwrap();
    assert_eq!(source.total_requests, 4);
    // Fewer than five requests: no average yet
    assert!(source.avg_request_interval.is_none());
    Ok(())
}

#[tokio::test]
async fn test_authenticated_users_are_never_classified() -> anyhow::Result<()> {
    let h = harness().await?;

    // Enough rapid traffic to trip the frequency analyzer for anonymous requests
    for second in 0..20 {
        h.logs
            .record(
                CreateRequestLog::new("192.168.50.1")
                    .user_agent("python-requests/2.31")
                    .url("/admin?debug=1")
                    .created_at(base() + Duration::seconds(second)),
            )
            .await?;
    }

    let inputs = [
        ("curl/7.68.0", "/?hack=1"),
        ("Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)", "/"),
        (CHROME, "/search?token=1700000000000000"),
    ];
    for (offset, (user_agent, url)) in inputs.iter().enumerate() {
        let log = h
            .logs
            .record(
                CreateRequestLog::new("192.168.50.1")
                    .user_agent(*user_agent)
                    .url(*url)
                    .user_id(1)
                    .created_at(base() + Duration::seconds(20 + offset as i64)),
            )
            .await?;

        let verdict = h.engine.analyze_request(&log).await?;
        assert!(!verdict.is_bot);
        assert!(verdict.skipped);
        assert!(verdict.reasons.is_empty());
        assert!(!h.logs.get(log.id).await?.is_bot());
    }
    Ok(())
}

#[tokio::test]
async fn test_backlog_prefers_newest_and_makes_progress() -> anyhow::Result<()> {
    let h = harness().await?;

    let mut ids = Vec::new();
    for minute in 0..10 {
        let log = h
            .logs
            .record(
                CreateRequestLog::new(format!("203.0.113.{}", minute + 1))
                    .created_at(base() + Duration::minutes(minute)),
            )
            .await?;
        ids.push(log.id);
    }

    assert!(h.engine.analyze_backlog(0).await?.is_empty());
    assert_eq!(h.logs.count_unanalyzed().await?, 10);

    let first = h.engine.analyze_backlog(3).await?;
    let processed: Vec<i32> = first.processed.iter().map(|p| p.request_id).collect();
    assert_eq!(processed, vec![ids[9], ids[8], ids[7]]);
    assert_eq!(h.logs.count_unanalyzed().await?, 7);

    let second = h.engine.analyze_backlog(3).await?;
    let processed: Vec<i32> = second.processed.iter().map(|p| p.request_id).collect();
    assert_eq!(processed, vec![ids[6], ids[5], ids[4]]);

    let rest = h.engine.analyze_backlog(100).await?;
    assert_eq!(rest.summary().processed, 4);
    assert_eq!(h.logs.count_unanalyzed().await?, 0);
    assert!(h.engine.analyze_backlog(100).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_backlog_routes_authenticated_rows_through_bypass() -> anyhow::Result<()> {
    let h = harness().await?;
    h.logs
        .record(CreateRequestLog::new("198.51.100.7").user_id(3).created_at(base()))
        .await?;
    h.logs
        .record(CreateRequestLog::new("198.51.100.8").created_at(base()))
        .await?;

    let summary = h.engine.analyze_backlog(10).await?.summary();
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);
    Ok(())
}

#[tokio::test]
async fn test_reanalyze_only_stale_sources() -> anyhow::Result<()> {
    let h = harness().await?;
    let now = Utc::now();

    let fresh = h
        .logs
        .record(CreateRequestLog::new("192.0.2.100").created_at(now - Duration::minutes(5)))
        .await?;
    let stale_recent = h
        .logs
        .record(CreateRequestLog::new("192.0.2.200").created_at(now - Duration::minutes(3)))
        .await?;
    let stale_old = h
        .logs
        .record(CreateRequestLog::new("192.0.2.200").created_at(now - Duration::hours(30)))
        .await?;

    h.engine.analyze_backlog(100).await?;
    h.sources.mark_analyzed(&["192.0.2.100".to_string()], now).await?;
    h.sources
        .mark_analyzed(&["192.0.2.200".to_string()], now - Duration::hours(48))
        .await?;

    let report = h.engine.reanalyze_stale(24, 100).await?;
    let processed: Vec<i32> = report.processed.iter().map(|p| p.request_id).collect();
    assert_eq!(processed, vec![stale_recent.id]);
    assert!(!processed.contains(&fresh.id));
    assert!(!processed.contains(&stale_old.id));

    let stale_source = h.sources.get("192.0.2.200").await?.unwrap();
    assert!(stale_source.last_bot_analysis_at.unwrap() > now - Duration::hours(1));
    // Every analysis counts towards the total, reanalysis included
    assert_eq!(stale_source.total_requests, 3);

    let fresh_source = h.sources.get("192.0.2.100").await?.unwrap();
    assert_eq!(fresh_source.total_requests, 1);

    assert!(h.engine.reanalyze_stale(24, 0).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_concurrent_analyses_of_one_source_do_not_lose_updates() -> anyhow::Result<()> {
    let h = harness().await?;

    let mut logs = Vec::new();
    for minute in 0..12 {
        logs.push(
            h.logs
                .record(
                    CreateRequestLog::new("198.18.0.1")
                        .user_agent(CHROME)
                        .created_at(base() + Duration::minutes(minute)),
                )
                .await?,
        );
    }

    let mut handles = Vec::new();
    for log in logs {
        let engine = h.engine.clone();
        handles.push(tokio::spawn(async move { engine.analyze_request(&log).await }));
    }
    for handle in handles {
        handle.await??;
    }

    let source = h.sources.get("198.18.0.1").await?.unwrap();
    assert_eq!(source.total_requests, 12);
    assert_eq!(h.logs.count_unanalyzed().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_overlapping_stale_runs_count_each_request_once() -> anyhow::Result<()> {
    let h = harness().await?;
    let now = Utc::now();

    for minutes in [9, 6, 3] {
        h.logs
            .record(
                CreateRequestLog::new("192.0.2.150").created_at(now - Duration::minutes(minutes)),
            )
            .await?;
    }
    h.engine.analyze_backlog(100).await?;
    assert_eq!(h.sources.get("192.0.2.150").await?.unwrap().total_requests, 3);

    let (run_a, run_b) = tokio::join!(
        h.engine.reanalyze_stale(24, 100),
        h.engine.reanalyze_stale(24, 100)
    );
    let (run_a, run_b) = (run_a?, run_b?);

    assert_eq!(run_a.processed.len() + run_b.processed.len(), 3);
    assert!(run_a.failures.is_empty() && run_b.failures.is_empty());
    let source = h.sources.get("192.0.2.150").await?.unwrap();
    assert_eq!(source.total_requests, 6);
    assert!(source.last_bot_analysis_at.is_some());
    Ok(())
}

#[tokio::test]
async fn test_backlog_failure_releases_claim_and_continues() -> anyhow::Result<()> {
    let h = harness().await?;

    let mut ids = Vec::new();
    for minute in 0..3 {
        let log = h
            .logs
            .record(
                CreateRequestLog::new(format!("198.51.100.{}", 60 + minute))
                    .created_at(base() + Duration::minutes(minute)),
            )
            .await?;
        ids.push(log.id);
    }
    reject_verdicts_for(&h.db, ids[1]).await?;

    let report = h.engine.analyze_backlog(10).await?;
    let processed: Vec<i32> = report.processed.iter().map(|p| p.request_id).collect();
    assert_eq!(processed, vec![ids[2], ids[0]]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].request_id, ids[1]);
    assert!(report.failures[0].retryable);
    assert!(!report.failures[0].error.is_empty());
    assert_eq!(report.summary().failed, 1);

    let failed = h.logs.get(ids[1]).await?;
    assert!(!failed.is_analyzed());
    assert!(failed.bot_claimed_at.is_none());
    assert!(failed.bot_detection_metadata.is_none());
    // The rolled-back analysis did not count towards the source
    assert!(h.sources.get("198.51.100.61").await?.is_none());

    // Once the database accepts writes again the row is picked up
    h.db.execute_sql("DROP TRIGGER reject_verdict").await?;
    let retry = h.engine.analyze_backlog(10).await?;
    let processed: Vec<i32> = retry.processed.iter().map(|p| p.request_id).collect();
    assert_eq!(processed, vec![ids[1]]);
    assert_eq!(h.logs.count_unanalyzed().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_stale_source_is_stamped_despite_failures() -> anyhow::Result<()> {
    let h = harness().await?;
    let now = Utc::now();

    let older = h
        .logs
        .record(CreateRequestLog::new("192.0.2.160").created_at(now - Duration::minutes(10)))
        .await?;
    let newer = h
        .logs
        .record(CreateRequestLog::new("192.0.2.160").created_at(now - Duration::minutes(5)))
        .await?;
    h.engine.analyze_backlog(100).await?;
    h.sources
        .mark_analyzed(&["192.0.2.160".to_string()], now - Duration::hours(48))
        .await?;
    reject_verdicts_for(&h.db, older.id).await?;

    let report = h.engine.reanalyze_stale(24, 10).await?;
    let processed: Vec<i32> = report.processed.iter().map(|p| p.request_id).collect();
    assert_eq!(processed, vec![newer.id]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].request_id, older.id);
    assert!(report.failures[0].retryable);

    let source = h.sources.get("192.0.2.160").await?.unwrap();
    assert!(source.last_bot_analysis_at.unwrap() > now - Duration::hours(1));
    assert_eq!(source.total_requests, 3);
    Ok(())
}
