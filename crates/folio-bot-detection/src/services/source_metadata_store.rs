use folio_core::DBDateTime;
use folio_entities::ip_metadata;
use sea_orm::sea_query::{Alias, Expr, OnConflict, SimpleExpr};
use sea_orm::*;
use std::sync::Arc;
use tracing::debug;

/// Per-source aggregates keyed by IP address
pub struct SourceMetadataStore {
    db: Arc<DatabaseConnection>,
}

impl SourceMetadataStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn get(&self, ip_address: &str) -> Result<Option<ip_metadata::Model>, DbErr> {
        find(self.db.as_ref(), ip_address).await
    }

    /// Count one analyzed request from `ip_address`.
    ///
    /// The first observation creates the row with `total_requests = 1`. Later
    /// ones increment the counter in the database and widen the
    /// `first_seen_at..last_seen_at` span to include `seen_at`, whatever order
    /// requests are analyzed in. `avg_interval` replaces the stored average
    /// only when one was computed.
    /// Runs on `conn` so it can join the caller's transaction.
    pub async fn record_observation<C: ConnectionTrait>(
        &self,
        conn: &C,
        ip_address: &str,
        seen_at: DBDateTime,
        avg_interval: Option<f64>,
        now: DBDateTime,
    ) -> Result<(), DbErr> {
        let row = ip_metadata::ActiveModel {
            ip_address: Set(ip_address.to_string()),
            country_code: Set(None),
            first_seen_at: Set(seen_at),
            last_seen_at: Set(seen_at),
            total_requests: Set(1),
            avg_request_interval: Set(avg_interval),
            last_bot_analysis_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let mut update_columns = vec![ip_metadata::Column::UpdatedAt];
        if avg_interval.is_some() {
            update_columns.push(ip_metadata::Column::AvgRequestInterval);
        }

        ip_metadata::Entity::insert(row)
            .on_conflict(
                OnConflict::column(ip_metadata::Column::IpAddress)
                    .value(
                        ip_metadata::Column::TotalRequests,
                        Expr::col((ip_metadata::Entity, ip_metadata::Column::TotalRequests))
                            .add(1),
                    )
                    .value(
                        ip_metadata::Column::FirstSeenAt,
                        earliest(ip_metadata::Column::FirstSeenAt),
                    )
                    .value(
                        ip_metadata::Column::LastSeenAt,
                        latest(ip_metadata::Column::LastSeenAt),
                    )
                    .update_columns(update_columns)
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;

        debug!(ip = %ip_address, avg_interval = ?avg_interval, "Recorded source observation");
        Ok(())
    }

    /// Stamp `last_bot_analysis_at` on `ip_address` if its last analysis is
    /// missing or older than `cutoff`.
    ///
    /// Returns whether this caller took the source. A concurrent run that
    /// already stamped it makes the update match nothing.
    pub async fn claim_stale(
        &self,
        ip_address: &str,
        cutoff: DBDateTime,
        now: DBDateTime,
    ) -> Result<bool, DbErr> {
        let result = ip_metadata::Entity::update_many()
            .col_expr(ip_metadata::Column::LastBotAnalysisAt, Expr::value(now))
            .col_expr(ip_metadata::Column::UpdatedAt, Expr::value(now))
            .filter(ip_metadata::Column::IpAddress.eq(ip_address))
            .filter(
                Condition::any()
                    .add(ip_metadata::Column::LastBotAnalysisAt.is_null())
                    .add(ip_metadata::Column::LastBotAnalysisAt.lt(cutoff)),
            )
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected == 1)
    }

    /// Stamp `last_bot_analysis_at` on every listed source
    pub async fn mark_analyzed(
        &self,
        ip_addresses: &[String],
        now: DBDateTime,
    ) -> Result<u64, DbErr> {
        if ip_addresses.is_empty() {
            return Ok(0);
        }

        let result = ip_metadata::Entity::update_many()
            .col_expr(ip_metadata::Column::LastBotAnalysisAt, Expr::value(now))
            .col_expr(ip_metadata::Column::UpdatedAt, Expr::value(now))
            .filter(ip_metadata::Column::IpAddress.is_in(ip_addresses.iter().cloned()))
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected)
    }
}

fn stored(column: ip_metadata::Column) -> Expr {
    Expr::col((ip_metadata::Entity, column))
}

fn incoming(column: ip_metadata::Column) -> Expr {
    Expr::col((Alias::new("excluded"), column))
}

/// `MIN(stored, incoming)` written as CASE so it runs on SQLite and PostgreSQL
fn earliest(column: ip_metadata::Column) -> SimpleExpr {
    Expr::case(stored(column).gt(incoming(column)), incoming(column))
        .finally(stored(column))
        .into()
}

fn latest(column: ip_metadata::Column) -> SimpleExpr {
    Expr::case(stored(column).lt(incoming(column)), incoming(column))
        .finally(stored(column))
        .into()
}

pub(crate) async fn find<C: ConnectionTrait>(
    conn: &C,
    ip_address: &str,
) -> Result<Option<ip_metadata::Model>, DbErr> {
    ip_metadata::Entity::find()
        .filter(ip_metadata::Column::IpAddress.eq(ip_address))
        .one(conn)
        .await
}
