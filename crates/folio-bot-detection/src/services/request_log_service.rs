use chrono::Utc;
use folio_core::DBDateTime;
use folio_entities::request_logs;
use sea_orm::*;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RequestLogServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),

    #[error("Invalid client IP address: {0}")]
    InvalidIpAddress(String),

    #[error("Request log {0} not found")]
    NotFound(i32),
}

/// Request to create a request log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequestLog {
    pub client_ip: String,
    pub user_agent: Option<String>,
    pub url: Option<String>,
    pub method: String,
    pub status_code: i16,
    pub user_id: Option<i32>,
    /// Defaults to the current time
    pub created_at: Option<DBDateTime>,
}

impl CreateRequestLog {
    pub fn new(client_ip: impl Into<String>) -> Self {
        Self {
            client_ip: client_ip.into(),
            user_agent: None,
            url: None,
            method: "GET".to_string(),
            status_code: 200,
            user_id: None,
            created_at: None,
        }
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn user_id(mut self, user_id: i32) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn created_at(mut self, created_at: DBDateTime) -> Self {
        self.created_at = Some(created_at);
        self
    }
}

/// Write and read side of the request log used by the detection engine
pub struct RequestLogService {
    db: Arc<DatabaseConnection>,
}

impl RequestLogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Store a logged request with its detection outputs unset
    pub async fn record(
        &self,
        request: CreateRequestLog,
    ) -> Result<request_logs::Model, RequestLogServiceError> {
        let client_ip = request
            .client_ip
            .trim()
            .parse::<IpAddr>()
            .map_err(|_| RequestLogServiceError::InvalidIpAddress(request.client_ip.clone()))?;

        let log = request_logs::ActiveModel {
            client_ip: Set(client_ip.to_string()),
            user_agent: Set(request.user_agent.filter(|ua| !ua.trim().is_empty())),
            url: Set(request.url.filter(|url| !url.trim().is_empty())),
            method: Set(request.method.to_uppercase()),
            status_code: Set(request.status_code),
            user_id: Set(request.user_id),
            created_at: Set(request.created_at.unwrap_or_else(Utc::now)),
            is_bot_by_frequency: Set(false),
            is_bot_by_user_agent: Set(false),
            is_bot_by_parameters: Set(false),
            bot_detection_metadata: Set(None),
            bot_analyzed_at: Set(None),
            bot_claimed_at: Set(None),
            ..Default::default()
        };

        Ok(log.insert(self.db.as_ref()).await?)
    }

    pub async fn get(&self, id: i32) -> Result<request_logs::Model, RequestLogServiceError> {
        request_logs::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or(RequestLogServiceError::NotFound(id))
    }

    /// Creation times of requests from `client_ip` within `[from, to]`, ascending
    pub async fn history_window(
        &self,
        client_ip: &str,
        from: DBDateTime,
        to: DBDateTime,
    ) -> Result<Vec<DBDateTime>, RequestLogServiceError> {
        Ok(request_times(self.db.as_ref(), client_ip, from, to).await?)
    }

    /// Requests that have never been analyzed
    pub async fn count_unanalyzed(&self) -> Result<u64, RequestLogServiceError> {
        Ok(request_logs::Entity::find()
            .filter(request_logs::Column::BotAnalyzedAt.is_null())
            .count(self.db.as_ref())
            .await?)
    }
}

pub(crate) async fn request_times<C: ConnectionTrait>(
    conn: &C,
    client_ip: &str,
    from: DBDateTime,
    to: DBDateTime,
) -> Result<Vec<DBDateTime>, DbErr> {
    request_logs::Entity::find()
        .select_only()
        .column(request_logs::Column::CreatedAt)
        .filter(request_logs::Column::ClientIp.eq(client_ip))
        .filter(request_logs::Column::CreatedAt.gte(from))
        .filter(request_logs::Column::CreatedAt.lte(to))
        .order_by_asc(request_logs::Column::CreatedAt)
        .order_by_asc(request_logs::Column::Id)
        .into_tuple::<DBDateTime>()
        .all(conn)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use folio_database::test_utils::TestDatabase;

    #[tokio::test]
    async fn test_record_and_get() -> anyhow::Result<()> {
        let test_db = TestDatabase::new().await?;
        let service = RequestLogService::new(test_db.connection_arc());

        let created_at = Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap();
        let log = service
            .record(
                CreateRequestLog::new(" 203.0.113.7 ")
                    .user_agent("Mozilla/5.0")
                    .url("/blog?page=2")
                    .created_at(created_at),
            )
            .await?;

        assert_eq!(log.client_ip, "203.0.113.7");
        assert_eq!(log.method, "GET");
        assert!(!log.is_analyzed());
        assert!(!log.is_bot());

        let fetched = service.get(log.id).await?;
        assert_eq!(fetched.created_at, created_at);
        assert_eq!(fetched.url.as_deref(), Some("/blog?page=2"));
        Ok(())
    }

    #[tokio::test]
    async fn test_blank_optional_fields_are_stored_as_null() -> anyhow::Result<()> {
        let test_db = TestDatabase::new().await?;
        let service = RequestLogService::new(test_db.connection_arc());

        let log = service
            .record(CreateRequestLog::new("::1").user_agent("  ").url(""))
            .await?;
        assert!(log.user_agent.is_none());
        assert!(log.url.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_ip_is_rejected() -> anyhow::Result<()> {
        let test_db = TestDatabase::new().await?;
        let service = RequestLogService::new(test_db.connection_arc());

        let result = service.record(CreateRequestLog::new("not-an-ip")).await;
        assert!(matches!(
            result,
            Err(RequestLogServiceError::InvalidIpAddress(ip)) if ip == "not-an-ip"
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_get_missing_request() -> anyhow::Result<()> {
        let test_db = TestDatabase::new().await?;
        let service = RequestLogService::new(test_db.connection_arc());

        assert!(matches!(
            service.get(42).await,
            Err(RequestLogServiceError::NotFound(42))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_history_window_is_bounded_and_ordered() -> anyhow::Result<()> {
        let test_db = TestDatabase::new().await?;
        let service = RequestLogService::new(test_db.connection_arc());
        let base = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

        // Inserted out of order, one outside the window, one from another IP
        for minutes in [30, -90, 0, 45, 10] {
            service
                .record(
                    CreateRequestLog::new("198.51.100.1")
                        .created_at(base + Duration::minutes(minutes)),
                )
                .await?;
        }
        service
            .record(CreateRequestLog::new("198.51.100.2").created_at(base + Duration::minutes(5)))
            .await?;

        let history = service
            .history_window("198.51.100.1", base, base + Duration::hours(1))
            .await?;
        let offsets: Vec<i64> = history.iter().map(|t| (*t - base).num_minutes()).collect();
        assert_eq!(offsets, vec![0, 10, 30, 45]);

        assert_eq!(service.count_unanalyzed().await?, 6);
        Ok(())
    }
}
