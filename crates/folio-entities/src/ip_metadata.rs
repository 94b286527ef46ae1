use folio_core::DBDateTime;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Aggregate counters for one source IP address
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ip_metadata")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub ip_address: String,

    /// ISO country code, best effort
    pub country_code: Option<String>,

    pub first_seen_at: DBDateTime,
    pub last_seen_at: DBDateTime,

    /// Number of analyzed requests observed from this address
    pub total_requests: i64,

    /// Mean seconds between requests in the latest analysis window
    pub avg_request_interval: Option<f64>,

    pub last_bot_analysis_at: Option<DBDateTime>,

    pub created_at: DBDateTime,
    pub updated_at: DBDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::request_logs::Entity")]
    RequestLogs,
}

impl Related<super::request_logs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RequestLogs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
