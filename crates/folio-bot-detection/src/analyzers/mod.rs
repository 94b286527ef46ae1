//! Bot detection heuristics.
//!
//! Each analyzer is a pure function of the request data it is handed; reading
//! history and persisting results is the engine's job.

pub mod frequency;
pub mod parameters;
pub mod user_agent;

pub use frequency::{FrequencyAnalysis, FrequencyAnalyzer, FrequencyRule, FrequencyStatus};
pub use parameters::{ParameterAnalysis, ParameterAnomalyAnalyzer, ParameterTrigger};
pub use user_agent::{
    ParsedUserAgent, UserAgentAnalysis, UserAgentAnalyzer, UserAgentParser, UserAgentRule,
    WootheeUserAgentParser,
};
