//! Bot detection for logged HTTP requests
//!
//! Classifies requests as human or automated traffic with three independent
//! heuristics and records an explainable verdict on each request row:
//!
//! - **Frequency**: request rate and inter-request interval over the trailing
//!   hour of traffic from the same source IP, compared against absolute
//!   thresholds and the source's own baseline.
//! - **User agent**: known crawler signatures, old budget Android devices under
//!   load, and browser-less clients under load.
//! - **Parameters**: query parameters a route does not expect whose names or
//!   values look machine generated (token shapes, debug prefixes, high
//!   Shannon entropy).
//!
//! [`BotDetectionEngine`] runs the analyzers for one request, for the backlog
//! of unanalyzed requests, or for sources whose last analysis is stale.
//! Requests from authenticated users are never classified.

pub mod analyzers;
pub mod catalog;
pub mod config;
pub mod entropy;
pub mod locks;
pub mod services;
pub mod verdict;

pub use analyzers::{
    FrequencyAnalysis, FrequencyAnalyzer, ParameterAnalysis, ParameterAnomalyAnalyzer,
    ParsedUserAgent, UserAgentAnalysis, UserAgentAnalyzer, UserAgentParser,
    WootheeUserAgentParser,
};
pub use catalog::{RouteDeclaration, RouteParameterCatalog};
pub use config::{BotDetectionConfig, ConfigError};
pub use entropy::shannon_entropy;
pub use services::{
    BotDetectionEngine, BotDetectionError, BotDetectionScheduler, CreateRequestLog,
    RequestLogService, RequestLogServiceError, SchedulerRun, SourceMetadataStore,
    AUTHENTICATED_USER_REASON,
};
pub use verdict::{
    AnalysisVerdict, BatchReport, BatchSummary, BotFlags, FailedRequest, ProcessedRequest,
};
