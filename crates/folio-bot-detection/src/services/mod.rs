mod engine;
mod request_log_service;
mod scheduler;
mod source_metadata_store;

pub use engine::{BotDetectionEngine, BotDetectionError, AUTHENTICATED_USER_REASON};
pub use request_log_service::{CreateRequestLog, RequestLogService, RequestLogServiceError};
pub use scheduler::{BotDetectionScheduler, SchedulerRun};
pub use source_metadata_store::SourceMetadataStore;
