//! Detection engine.
//!
//! Runs the analyzers for one logged request, persists the verdict on the
//! request row and updates the source's metadata in one transaction. Batch
//! entry points work through the unanalyzed backlog and through sources whose
//! last analysis is stale.

use super::request_log_service::request_times;
use super::source_metadata_store::{self, SourceMetadataStore};
use crate::analyzers::{
    parameters::request_path, FrequencyAnalysis, FrequencyAnalyzer, ParameterAnalysis,
    ParameterAnomalyAnalyzer, UserAgentAnalysis, UserAgentAnalyzer, UserAgentParser,
};
use crate::catalog::RouteParameterCatalog;
use crate::config::BotDetectionConfig;
use crate::locks::KeyedLocks;
use crate::verdict::{AnalysisVerdict, BatchReport, BotFlags, FailedRequest, ProcessedRequest};
use chrono::{Duration, Utc};
use folio_core::{truncate_to_seconds, DBDateTime};
use folio_entities::{ip_metadata, request_logs};
use sea_orm::sea_query::Expr;
use sea_orm::*;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const AUTHENTICATED_USER_REASON: &str = "Authenticated user";

#[derive(Error, Debug)]
pub enum BotDetectionError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Request {0} not found")]
    RequestNotFound(i32),

    #[error("Failed to serialize analysis metadata: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid look-back window: {0}")]
    InvalidWindow(String),
}

impl BotDetectionError {
    /// Whether running the same analysis again may succeed. The request keeps
    /// `bot_analyzed_at = NULL` and is picked up by the next backlog run.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BotDetectionError::Database(_))
    }
}

pub struct BotDetectionEngine {
    db: Arc<DatabaseConnection>,
    catalog: Arc<RouteParameterCatalog>,
    config: BotDetectionConfig,
    frequency: FrequencyAnalyzer,
    user_agent: UserAgentAnalyzer,
    parameters: ParameterAnomalyAnalyzer,
    metadata: SourceMetadataStore,
    locks: KeyedLocks,
}

impl BotDetectionEngine {
    pub fn new(
        db: Arc<DatabaseConnection>,
        catalog: Arc<RouteParameterCatalog>,
        config: BotDetectionConfig,
    ) -> Self {
        Self {
            frequency: FrequencyAnalyzer::new(config.frequency.clone()),
            user_agent: UserAgentAnalyzer::new(config.user_agent.clone()),
            parameters: ParameterAnomalyAnalyzer::new(config.parameters.clone()),
            metadata: SourceMetadataStore::new(db.clone()),
            locks: KeyedLocks::new(),
            db,
            catalog,
            config,
        }
    }

    /// Replace the woothee-backed user-agent parser
    pub fn with_user_agent_parser(mut self, parser: Arc<dyn UserAgentParser>) -> Self {
        self.user_agent = UserAgentAnalyzer::with_parser(self.config.user_agent.clone(), parser);
        self
    }

    pub fn config(&self) -> &BotDetectionConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<RouteParameterCatalog> {
        &self.catalog
    }

    pub async fn analyze_request_by_id(
        &self,
        id: i32,
    ) -> Result<AnalysisVerdict, BotDetectionError> {
        let request = request_logs::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or(BotDetectionError::RequestNotFound(id))?;

        self.analyze_request(&request).await
    }

    /// Analyze one request and persist the verdict on its row
    pub async fn analyze_request(
        &self,
        request: &request_logs::Model,
    ) -> Result<AnalysisVerdict, BotDetectionError> {
        let now = truncate_to_seconds(Utc::now());

        let result = if request.user_id.is_some() {
            self.skip_authenticated(request, now).await
        } else {
            self.analyze_anonymous(request, now).await
        };

        if let Err(e) = &result {
            error!(
                request_id = request.id,
                ip = %request.client_ip,
                retryable = e.is_retryable(),
                "Failed to persist bot analysis: {}", e
            );
        }
        result
    }

    async fn skip_authenticated(
        &self,
        request: &request_logs::Model,
        now: DBDateTime,
    ) -> Result<AnalysisVerdict, BotDetectionError> {
        let metadata = json!({ "skipped": true, "reason": AUTHENTICATED_USER_REASON });
        persist_verdict(self.db.as_ref(), request, BotFlags::default(), metadata, now).await?;

        debug!(request_id = request.id, "Skipped bot analysis for authenticated user");
        Ok(AnalysisVerdict::skipped(AUTHENTICATED_USER_REASON))
    }

    async fn analyze_anonymous(
        &self,
        request: &request_logs::Model,
        now: DBDateTime,
    ) -> Result<AnalysisVerdict, BotDetectionError> {
        let _guard = self.locks.lock(&request.client_ip).await;
        let txn = self.db.begin().await?;

        let history = request_times(
            &txn,
            &request.client_ip,
            request.created_at - self.frequency.window(),
            request.created_at,
        )
        .await?;
        let baseline = source_metadata_store::find(&txn, &request.client_ip)
            .await?
            .and_then(|source| source.avg_request_interval);

        let frequency = self.frequency.analyze(&history, baseline);
        let user_agent = request
            .user_agent
            .as_deref()
            .filter(|ua| !ua.trim().is_empty())
            .map(|ua| self.user_agent.analyze(ua, frequency.requests_per_minute));
        let parameters = request
            .url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .map(|url| self.analyze_parameters(url));

        let flags = BotFlags {
            by_frequency: frequency.is_suspicious,
            by_user_agent: user_agent.as_ref().is_some_and(|a| a.is_suspicious),
            by_parameters: parameters.as_ref().is_some_and(|a| a.is_suspicious),
        };
        let reasons = collect_reasons(&frequency, user_agent.as_ref(), parameters.as_ref());
        let metadata = json!({
            "reasons": reasons,
            "frequency_analysis": serde_json::to_value(&frequency)?,
            "user_agent_analysis": serde_json::to_value(&user_agent)?,
            "parameter_analysis": serde_json::to_value(&parameters)?,
        });

        persist_verdict(&txn, request, flags, metadata, now).await?;
        self.metadata
            .record_observation(
                &txn,
                &request.client_ip,
                request.created_at,
                frequency.avg_interval,
                now,
            )
            .await?;
        txn.commit().await?;

        let verdict = AnalysisVerdict::from_flags(flags, reasons);
        if verdict.is_bot {
            info!(
                request_id = request.id,
                ip = %request.client_ip,
                reasons = ?verdict.reasons,
                "Request classified as bot"
            );
        } else {
            debug!(
                request_id = request.id,
                ip = %request.client_ip,
                "Request classified as human"
            );
        }
        Ok(verdict)
    }

    fn analyze_parameters(&self, url: &str) -> ParameterAnalysis {
        let path = request_path(url).unwrap_or_default();
        let whitelist = self.catalog.whitelist_for(&path);
        self.parameters.analyze(url, &whitelist)
    }

    /// Analyze up to `limit` unanalyzed requests, newest first.
    ///
    /// Each row is claimed with a conditional update before it is analyzed, so
    /// overlapping runs do not process the same request twice. Claims older
    /// than `claim_ttl_secs` are treated as abandoned.
    pub async fn analyze_backlog(&self, limit: u64) -> Result<BatchReport, BotDetectionError> {
        let mut report = BatchReport::default();
        if limit == 0 {
            return Ok(report);
        }

        let now = truncate_to_seconds(Utc::now());
        let ttl_secs = self.config.scheduler.claim_ttl_secs;
        let claim_expiry = look_back(
            now,
            Duration::try_seconds(ttl_secs),
            ttl_secs,
            "claim_ttl_secs",
        )?;

        let candidates = request_logs::Entity::find()
            .filter(request_logs::Column::BotAnalyzedAt.is_null())
            .filter(claimable(claim_expiry))
            .order_by_desc(request_logs::Column::CreatedAt)
            .order_by_desc(request_logs::Column::Id)
            .limit(limit)
            .all(self.db.as_ref())
            .await?;

        debug!("Found {} unanalyzed requests", candidates.len());

        for request in candidates {
            if !self.claim(request.id, now, claim_expiry).await? {
                debug!(request_id = request.id, "Request already claimed by another run");
                continue;
            }

            match self.analyze_request(&request).await {
                Ok(verdict) => report.processed.push(ProcessedRequest {
                    request_id: request.id,
                    verdict,
                }),
                Err(e) => {
                    self.release_claim(request.id).await;
                    report.failures.push(failure(request.id, &e));
                }
            }
        }

        info!("Backlog analysis finished: {}", report.summary());
        Ok(report)
    }

    /// Re-run analysis for recent traffic of sources whose last analysis is
    /// older than `older_than_hours`.
    ///
    /// Each selected source is stamped with a conditional update before its
    /// requests are analyzed. A source stamped by an overlapping run is
    /// skipped, and a stamped source stays stamped even if some of its
    /// requests fail.
    pub async fn reanalyze_stale(
        &self,
        older_than_hours: i64,
        limit: u64,
    ) -> Result<BatchReport, BotDetectionError> {
        let mut report = BatchReport::default();
        if limit == 0 {
            return Ok(report);
        }

        let now = truncate_to_seconds(Utc::now());
        let cutoff = look_back(
            now,
            Duration::try_hours(older_than_hours),
            older_than_hours,
            "older_than_hours",
        )?;

        let requests = request_logs::Entity::find()
            .inner_join(ip_metadata::Entity)
            .filter(
                Condition::any()
                    .add(ip_metadata::Column::LastBotAnalysisAt.is_null())
                    .add(ip_metadata::Column::LastBotAnalysisAt.lt(cutoff)),
            )
            .filter(request_logs::Column::CreatedAt.gte(cutoff))
            .order_by_desc(request_logs::Column::CreatedAt)
            .order_by_desc(request_logs::Column::Id)
            .limit(limit)
            .all(self.db.as_ref())
            .await?;

        debug!("Found {} requests from stale sources", requests.len());

        let sources: BTreeSet<&str> = requests.iter().map(|r| r.client_ip.as_str()).collect();
        let mut claimed = BTreeSet::new();
        for ip in sources {
            if self.metadata.claim_stale(ip, cutoff, now).await? {
                claimed.insert(ip.to_string());
            } else {
                debug!(ip = %ip, "Source already reanalyzed by another run");
            }
        }

        for request in requests {
            if !claimed.contains(&request.client_ip) {
                continue;
            }
            match self.analyze_request(&request).await {
                Ok(verdict) => report.processed.push(ProcessedRequest {
                    request_id: request.id,
                    verdict,
                }),
                Err(e) => report.failures.push(failure(request.id, &e)),
            }
        }

        info!(
            sources = claimed.len(),
            "Stale source reanalysis finished: {}",
            report.summary()
        );
        Ok(report)
    }

    async fn claim(
        &self,
        id: i32,
        now: DBDateTime,
        claim_expiry: DBDateTime,
    ) -> Result<bool, BotDetectionError> {
        let result = request_logs::Entity::update_many()
            .col_expr(request_logs::Column::BotClaimedAt, Expr::value(now))
            .filter(request_logs::Column::Id.eq(id))
            .filter(request_logs::Column::BotAnalyzedAt.is_null())
            .filter(claimable(claim_expiry))
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected == 1)
    }

    async fn release_claim(&self, id: i32) {
        let result = request_logs::Entity::update_many()
            .col_expr(
                request_logs::Column::BotClaimedAt,
                Expr::value(Option::<DBDateTime>::None),
            )
            .filter(request_logs::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await;

        if let Err(e) = result {
            warn!(request_id = id, "Failed to release claim, it will expire: {}", e);
        }
    }
}

/// `now - span`, rejecting negative or out-of-range spans instead of panicking
fn look_back(
    now: DBDateTime,
    span: Option<Duration>,
    value: i64,
    name: &str,
) -> Result<DBDateTime, BotDetectionError> {
    span.filter(|_| value >= 0)
        .and_then(|span| now.checked_sub_signed(span))
        .ok_or_else(|| BotDetectionError::InvalidWindow(format!("{} = {}", name, value)))
}

fn claimable(claim_expiry: DBDateTime) -> Condition {
    Condition::any()
        .add(request_logs::Column::BotClaimedAt.is_null())
        .add(request_logs::Column::BotClaimedAt.lt(claim_expiry))
}

fn failure(request_id: i32, error: &BotDetectionError) -> FailedRequest {
    FailedRequest {
        request_id,
        error: error.to_string(),
        retryable: error.is_retryable(),
    }
}

fn collect_reasons(
    frequency: &FrequencyAnalysis,
    user_agent: Option<&UserAgentAnalysis>,
    parameters: Option<&ParameterAnalysis>,
) -> Vec<String> {
    [
        frequency.reason.as_ref(),
        user_agent.and_then(|a| a.reason.as_ref()),
        parameters.and_then(|a| a.reason.as_ref()),
    ]
    .into_iter()
    .flatten()
    .cloned()
    .collect()
}

/// Write all detection outputs of one request in a single row update
async fn persist_verdict<C: ConnectionTrait>(
    conn: &C,
    request: &request_logs::Model,
    flags: BotFlags,
    metadata: serde_json::Value,
    now: DBDateTime,
) -> Result<(), DbErr> {
    let mut row = request.clone().into_active_model();
    row.is_bot_by_frequency = Set(flags.by_frequency);
    row.is_bot_by_user_agent = Set(flags.by_user_agent);
    row.is_bot_by_parameters = Set(flags.by_parameters);
    row.bot_detection_metadata = Set(Some(metadata));
    row.bot_analyzed_at = Set(Some(now));
    row.bot_claimed_at = Set(None);
    row.update(conn).await?;
    Ok(())
}
