//! Bot detection configuration.
//!
//! Every threshold has a built-in default, so an empty YAML document (or no
//! file at all) yields a working configuration.

use crate::catalog::RouteDeclaration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Top-level configuration for the detection engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotDetectionConfig {
    pub frequency: FrequencyConfig,
    pub user_agent: UserAgentConfig,
    pub parameters: ParameterConfig,
    pub catalog: CatalogConfig,
    pub scheduler: SchedulerConfig,
}

impl BotDetectionConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }
}

/// Thresholds for request-rate analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencyConfig {
    /// Trailing window of prior requests considered, in seconds
    pub window_secs: i64,
    /// Minimum requests in the window, current one included
    pub min_sample_size: usize,
    /// Requests per minute above which a short interval is suspicious
    pub high_rpm: f64,
    pub high_rpm_max_interval_secs: f64,
    /// Average intervals at or below this are suspicious on their own
    pub min_interval_secs: f64,
    /// Fraction of the stored baseline interval below which traffic is suspicious
    pub baseline_ratio: f64,
    pub baseline_min_rpm: f64,
    /// Baseline used for sources with no stored average interval
    pub default_baseline_interval_secs: f64,
}

impl Default for FrequencyConfig {
    fn default() -> Self {
        Self {
            window_secs: 3600,
            min_sample_size: 5,
            high_rpm: 30.0,
            high_rpm_max_interval_secs: 2.0,
            min_interval_secs: 1.5,
            baseline_ratio: 0.3,
            baseline_min_rpm: 20.0,
            default_baseline_interval_secs: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Requests per minute above which a client without a browser is suspicious
    pub no_browser_rpm: f64,
    pub suspicious_devices: Vec<SuspiciousDevicePattern>,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            no_browser_rpm: 20.0,
            suspicious_devices: vec![SuspiciousDevicePattern::default()],
        }
    }
}

/// Old OS versions on budget hardware that scraping farms favour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuspiciousDevicePattern {
    pub os: String,
    /// Version prefixes; `4.4` matches `4.4` and `4.4.2`
    pub versions: Vec<String>,
    /// Case-insensitive substrings of the device model
    pub devices: Vec<String>,
    pub rpm_threshold: f64,
}

impl Default for SuspiciousDevicePattern {
    fn default() -> Self {
        Self {
            os: "Android".to_string(),
            versions: ["4.0", "4.1", "4.2", "4.3", "4.4"]
                .iter()
                .map(|v| v.to_string())
                .collect(),
            devices: [
                "GT-I9300", "GT-S7562", "GT-S7582", "GT-I8190", "GT-S5360", "SM-G350",
                "SM-G355H", "SM-J100H", "SM-T110", "Lenovo A319", "Lenovo A536", "HUAWEI Y300",
                "ALCATEL ONE TOUCH", "Micromax", "Nexus 4",
            ]
            .iter()
            .map(|d| d.to_string())
            .collect(),
            rpm_threshold: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterConfig {
    /// Values above this many bits per character look random
    pub entropy_threshold: f64,
    /// Values must be longer than this for the entropy check
    pub entropy_min_length: usize,
}

impl Default for ParameterConfig {
    fn default() -> Self {
        Self {
            entropy_threshold: 4.5,
            entropy_min_length: 10,
        }
    }
}

/// Inputs of the route parameter catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Registered routes and the input fields their handlers validate
    pub routes: Vec<RouteDeclaration>,
    /// Extra parameter names for paths whose inputs are not declared
    pub manual_overrides: BTreeMap<String, Vec<String>>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        let overrides: [(&str, &[&str]); 5] = [
            ("blog", &["category", "tag", "author", "year"]),
            ("portfolio", &["technology", "category", "year"]),
            ("contact", &["subject", "ref"]),
            ("auth/callback", &["code", "state", "error", "error_description"]),
            ("feed", &["format", "category"]),
        ];

        Self {
            routes: Vec::new(),
            manual_overrides: overrides
                .iter()
                .map(|(path, names)| {
                    (
                        path.to_string(),
                        names.iter().map(|n| n.to_string()).collect(),
                    )
                })
                .collect(),
        }
    }
}

/// Periodic batch runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub interval_secs: u64,
    pub backlog_limit: u64,
    pub stale_after_hours: i64,
    pub stale_limit: u64,
    /// Claims older than this are considered abandoned by a crashed run
    pub claim_ttl_secs: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            backlog_limit: 500,
            stale_after_hours: 24,
            stale_limit: 500,
            claim_ttl_secs: 600,
        }
    }
}
