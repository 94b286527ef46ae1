use folio_core::DBDateTime;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One logged HTTP request handed over by the access-log collaborator.
///
/// The `is_bot_by_*`, `bot_detection_metadata` and `bot_analyzed_at` columns
/// are owned by the bot-detection engine and written in a single update.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "request_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Client IP address
    pub client_ip: String,

    /// Raw user agent string
    pub user_agent: Option<String>,

    /// Full request URL including the query string
    pub url: Option<String>,

    /// Request method (GET, POST, etc.)
    pub method: String,

    /// HTTP status code
    pub status_code: i16,

    /// Authenticated user that issued the request, if any
    pub user_id: Option<i32>,

    /// Timestamp of the request
    pub created_at: DBDateTime,

    pub is_bot_by_frequency: bool,
    pub is_bot_by_user_agent: bool,
    pub is_bot_by_parameters: bool,

    /// Reasons and per-analyzer detail (JSON)
    pub bot_detection_metadata: Option<Json>,

    /// Null until the request went through the detection engine
    pub bot_analyzed_at: Option<DBDateTime>,

    /// Set by a batch run that claimed this row for processing
    pub bot_claimed_at: Option<DBDateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::ip_metadata::Entity",
        from = "Column::ClientIp",
        to = "super::ip_metadata::Column::IpAddress"
    )]
    IpMetadata,
}

impl Related<super::ip_metadata::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::IpMetadata.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether any of the three heuristics flagged this request.
    pub fn is_bot(&self) -> bool {
        self.is_bot_by_frequency || self.is_bot_by_user_agent || self.is_bot_by_parameters
    }

    pub fn is_analyzed(&self) -> bool {
        self.bot_analyzed_at.is_some()
    }
}
