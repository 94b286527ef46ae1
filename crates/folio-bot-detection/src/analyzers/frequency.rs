//! Request frequency analysis.
//!
//! Looks at the trailing window of requests from one source IP and derives
//! the average inter-request interval and the implied requests per minute.
//! Traffic is suspicious when it is fast in absolute terms or much faster than
//! the source's own stored baseline.

use crate::config::FrequencyConfig;
use chrono::Duration;
use folio_core::DBDateTime;
use serde::{Deserialize, Serialize};

/// Why a window was or was not scored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyStatus {
    InsufficientData,
    NoIntervals,
    Analyzed,
}

/// Which suspicion rule fired, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyRule {
    HighRate,
    ShortInterval,
    AboveBaseline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyAnalysis {
    pub status: FrequencyStatus,
    pub is_suspicious: bool,
    pub requests_per_minute: f64,
    /// Mean of the positive intervals, in seconds
    pub avg_interval: Option<f64>,
    /// Requests in the window, current one included
    pub sample_size: usize,
    /// Positive intervals the average was computed from
    pub interval_count: usize,
    /// Baseline interval the rate was compared against
    pub baseline_interval: Option<f64>,
    pub rule: Option<FrequencyRule>,
    pub reason: Option<String>,
}

impl FrequencyAnalysis {
    fn not_scored(status: FrequencyStatus, sample_size: usize) -> Self {
        Self {
            status,
            is_suspicious: false,
            requests_per_minute: 0.0,
            avg_interval: None,
            sample_size,
            interval_count: 0,
            baseline_interval: None,
            rule: None,
            reason: None,
        }
    }
}

pub struct FrequencyAnalyzer {
    config: FrequencyConfig,
}

impl Default for FrequencyAnalyzer {
    fn default() -> Self {
        Self::new(FrequencyConfig::default())
    }
}

impl FrequencyAnalyzer {
    pub fn new(config: FrequencyConfig) -> Self {
        Self { config }
    }

    /// Length of the trailing window of history the analyzer expects
    pub fn window(&self) -> Duration {
        Duration::seconds(self.config.window_secs)
    }

    /// Score a window of request timestamps.
    ///
    /// `history` holds the creation times of every request from the source in
    /// `[created_at - window, created_at]`, ascending, the analyzed request
    /// included. `stored_baseline` is the source's previously stored average
    /// interval, if any.
    pub fn analyze(
        &self,
        history: &[DBDateTime],
        stored_baseline: Option<f64>,
    ) -> FrequencyAnalysis {
        let sample_size = history.len();
        if sample_size < self.config.min_sample_size {
            return FrequencyAnalysis::not_scored(FrequencyStatus::InsufficientData, sample_size);
        }

        // Zero-length intervals still count towards the sample size above
        let intervals: Vec<f64> = history
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).num_milliseconds().abs() as f64 / 1000.0)
            .filter(|interval| *interval > 0.0)
            .collect();

        if intervals.is_empty() {
            return FrequencyAnalysis::not_scored(FrequencyStatus::NoIntervals, sample_size);
        }

        let avg_interval = intervals.iter().sum::<f64>() / intervals.len() as f64;
        let requests_per_minute = if avg_interval > 0.0 {
            60.0 / avg_interval
        } else {
            0.0
        };
        let baseline_interval =
            stored_baseline.unwrap_or(self.config.default_baseline_interval_secs);

        let rule = self.matching_rule(requests_per_minute, avg_interval, baseline_interval);
        let reason = rule.map(|rule| match rule {
            FrequencyRule::HighRate => format!(
                "High request frequency: {:.2} requests/minute (avg interval {:.2}s)",
                requests_per_minute, avg_interval
            ),
            FrequencyRule::ShortInterval => format!(
                "Very short request interval: {:.2}s avg ({:.2} requests/minute)",
                avg_interval, requests_per_minute
            ),
            FrequencyRule::AboveBaseline => format!(
                "Request rate far above baseline: {:.2} requests/minute \
                 (avg interval {:.2}s vs baseline {:.2}s)",
                requests_per_minute, avg_interval, baseline_interval
            ),
        });

        FrequencyAnalysis {
            status: FrequencyStatus::Analyzed,
            is_suspicious: rule.is_some(),
            requests_per_minute,
            avg_interval: Some(avg_interval),
            sample_size,
            interval_count: intervals.len(),
            baseline_interval: Some(baseline_interval),
            rule,
            reason,
        }
    }

    fn matching_rule(
        &self,
        requests_per_minute: f64,
        avg_interval: f64,
        baseline_interval: f64,
    ) -> Option<FrequencyRule> {
        let config = &self.config;

        if requests_per_minute > config.high_rpm && avg_interval < config.high_rpm_max_interval_secs
        {
            Some(FrequencyRule::HighRate)
        } else if avg_interval <= config.min_interval_secs {
            Some(FrequencyRule::ShortInterval)
        } else if avg_interval < baseline_interval * config.baseline_ratio
            && requests_per_minute > config.baseline_min_rpm
        {
            Some(FrequencyRule::AboveBaseline)
        } else {
            None
        }
    }
}
