//! Outcomes of the detection engine

use serde::{Deserialize, Serialize};

/// The three independently persisted heuristics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotFlags {
    pub by_frequency: bool,
    pub by_user_agent: bool,
    pub by_parameters: bool,
}

impl BotFlags {
    pub fn is_bot(&self) -> bool {
        self.by_frequency || self.by_user_agent || self.by_parameters
    }
}

/// Result of analyzing one request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisVerdict {
    pub is_bot: bool,
    pub flags: BotFlags,
    /// Human-readable reasons in analyzer order: frequency, user agent, parameters
    pub reasons: Vec<String>,
    pub skipped: bool,
    pub skip_reason: Option<String>,
}

impl AnalysisVerdict {
    pub fn from_flags(flags: BotFlags, reasons: Vec<String>) -> Self {
        Self {
            is_bot: flags.is_bot(),
            flags,
            reasons,
            skipped: false,
            skip_reason: None,
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            skipped: true,
            skip_reason: Some(reason.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRequest {
    pub request_id: i32,
    pub verdict: AnalysisVerdict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedRequest {
    pub request_id: i32,
    pub error: String,
    pub retryable: bool,
}

/// Everything a batch run did, in processing order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub processed: Vec<ProcessedRequest>,
    pub failures: Vec<FailedRequest>,
}

impl BatchReport {
    pub fn is_empty(&self) -> bool {
        self.processed.is_empty() && self.failures.is_empty()
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            processed: self.processed.len(),
            bots: self.processed.iter().filter(|p| p.verdict.is_bot).count(),
            skipped: self.processed.iter().filter(|p| p.verdict.skipped).count(),
            failed: self.failures.len(),
        }
    }
}

/// Counters for logging and CLI output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub bots: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl std::fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} processed, {} bots, {} skipped, {} failed",
            self.processed, self.bots, self.skipped, self.failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_bot_is_or_of_flags() {
        assert!(!BotFlags::default().is_bot());
        let flags = BotFlags {
            by_parameters: true,
            ..BotFlags::default()
        };
        let verdict = AnalysisVerdict::from_flags(flags, vec!["reason".to_string()]);
        assert!(verdict.is_bot);
        assert!(!verdict.skipped);
    }

    #[test]
    fn test_skipped_verdict_is_never_a_bot() {
        let verdict = AnalysisVerdict::skipped("Authenticated user");
        assert!(!verdict.is_bot);
        assert!(verdict.skipped);
        assert!(verdict.reasons.is_empty());
        assert_eq!(verdict.skip_reason.as_deref(), Some("Authenticated user"));
    }

    #[test]
    fn test_summary_counts() {
        let bot = AnalysisVerdict::from_flags(
            BotFlags {
                by_frequency: true,
                ..BotFlags::default()
            },
            vec![],
        );
        let report = BatchReport {
            processed: vec![
                ProcessedRequest {
                    request_id: 3,
                    verdict: bot,
                },
                ProcessedRequest {
                    request_id: 2,
                    verdict: AnalysisVerdict::skipped("Authenticated user"),
                },
                ProcessedRequest {
                    request_id: 1,
                    verdict: AnalysisVerdict::default(),
                },
            ],
            failures: vec![FailedRequest {
                request_id: 4,
                error: "database is locked".to_string(),
                retryable: true,
            }],
        };

        let summary = report.summary();
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.bots, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.to_string(), "3 processed, 1 bots, 1 skipped, 1 failed");
    }
}
