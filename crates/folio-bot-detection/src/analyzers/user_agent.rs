//! User-agent analysis.
//!
//! Flags self-identified crawlers, outdated budget Android devices hitting the
//! site at a high rate, and clients that cannot be matched to any browser while
//! requesting quickly.

use crate::config::{SuspiciousDevicePattern, UserAgentConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use woothee::parser::{Parser, WootheeResult};

/// Fields extracted from a user-agent string. Missing values are `None`,
/// never empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedUserAgent {
    pub browser: Option<String>,
    pub browser_version: Option<String>,
    pub os: Option<String>,
    pub os_version: Option<String>,
    pub device: Option<String>,
    /// Set when the client identifies itself as a crawler
    pub bot_name: Option<String>,
}

/// Parses raw user-agent strings
pub trait UserAgentParser: Send + Sync {
    fn parse(&self, user_agent: &str) -> ParsedUserAgent;
}

/// Parser backed by the woothee project database
#[derive(Debug, Clone, Copy, Default)]
pub struct WootheeUserAgentParser;

impl WootheeUserAgentParser {
    fn from_woothee_result(user_agent: &str, result: &WootheeResult) -> ParsedUserAgent {
        if result.category == "crawler" {
            return ParsedUserAgent {
                bot_name: Some(clean(result.name).unwrap_or_else(|| "crawler".to_string())),
                ..ParsedUserAgent::default()
            };
        }

        ParsedUserAgent {
            browser: clean(result.name),
            browser_version: clean(result.version),
            os: clean(result.os),
            os_version: clean(&result.os_version),
            device: device_model(user_agent),
            bot_name: None,
        }
    }
}

impl UserAgentParser for WootheeUserAgentParser {
    fn parse(&self, user_agent: &str) -> ParsedUserAgent {
        if user_agent.trim().is_empty() {
            return ParsedUserAgent::default();
        }

        let parser = Parser::new();
        match parser.parse(user_agent) {
            Some(result) => Self::from_woothee_result(user_agent, &result),
            None => ParsedUserAgent {
                device: device_model(user_agent),
                ..ParsedUserAgent::default()
            },
        }
    }
}

fn clean(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value == "UNKNOWN" {
        None
    } else {
        Some(value.to_string())
    }
}

/// Device model from the first parenthesized comment of an Android UA, e.g.
/// `GT-I9300` from `(Linux; Android 4.4.2; GT-I9300 Build/KOT49H)`.
fn device_model(user_agent: &str) -> Option<String> {
    let start = user_agent.find('(')?;
    let end = start + user_agent[start..].find(')')?;
    let segments: Vec<&str> = user_agent[start + 1..end]
        .split(';')
        .map(str::trim)
        .collect();

    if let Some(segment) = segments.iter().find(|s| s.contains("Build/")) {
        let model = segment.split("Build/").next().unwrap_or_default().trim();
        if !model.is_empty() {
            return Some(model.to_string());
        }
    }

    let android_at = segments.iter().position(|s| s.starts_with("Android"))?;
    segments[android_at + 1..]
        .iter()
        .find(|s| !s.is_empty() && !matches!(**s, "U" | "wv") && !is_locale(s))
        .map(|s| s.to_string())
}

fn is_locale(segment: &str) -> bool {
    let mut parts = segment.split(|c: char| c == '-' || c == '_');
    let language = parts.next().unwrap_or_default();
    let region = parts.next();
    parts.next().is_none()
        && language.len() == 2
        && language.chars().all(|c| c.is_ascii_lowercase())
        && region.map_or(true, |r| {
            r.len() == 2 && r.chars().all(|c| c.is_ascii_alphabetic())
        })
}

/// Which rule flagged the user agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserAgentRule {
    KnownBot,
    SuspiciousDevice,
    NoBrowser,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAgentAnalysis {
    pub is_suspicious: bool,
    pub parsed: ParsedUserAgent,
    pub requests_per_minute: f64,
    pub rule: Option<UserAgentRule>,
    pub reason: Option<String>,
}

pub struct UserAgentAnalyzer {
    config: UserAgentConfig,
    parser: Arc<dyn UserAgentParser>,
}

impl Default for UserAgentAnalyzer {
    fn default() -> Self {
        Self::new(UserAgentConfig::default())
    }
}

impl UserAgentAnalyzer {
    pub fn new(config: UserAgentConfig) -> Self {
        Self::with_parser(config, Arc::new(WootheeUserAgentParser))
    }

    pub fn with_parser(config: UserAgentConfig, parser: Arc<dyn UserAgentParser>) -> Self {
        Self { config, parser }
    }

    /// Score a user-agent string given the source's current request rate
    pub fn analyze(&self, user_agent: &str, requests_per_minute: f64) -> UserAgentAnalysis {
        let parsed = self.parser.parse(user_agent);
        let (rule, reason) = match self.evaluate(&parsed, requests_per_minute) {
            Some((rule, reason)) => (Some(rule), Some(reason)),
            None => (None, None),
        };

        UserAgentAnalysis {
            is_suspicious: rule.is_some(),
            parsed,
            requests_per_minute,
            rule,
            reason,
        }
    }

    fn evaluate(
        &self,
        parsed: &ParsedUserAgent,
        requests_per_minute: f64,
    ) -> Option<(UserAgentRule, String)> {
        if let Some(bot_name) = parsed.bot_name.as_deref().filter(|n| !n.is_empty()) {
            return Some((
                UserAgentRule::KnownBot,
                format!("Known bot detected: {}", bot_name),
            ));
        }

        if let Some(pattern) = self
            .config
            .suspicious_devices
            .iter()
            .find(|pattern| matches_device(pattern, parsed, requests_per_minute))
        {
            tracing::debug!(os = %pattern.os, "Matched suspicious device pattern");
            return Some((
                UserAgentRule::SuspiciousDevice,
                format!(
                    "Suspicious old device {} on {} {} at {:.2} requests/minute",
                    parsed.device.as_deref().unwrap_or_default(),
                    parsed.os.as_deref().unwrap_or_default(),
                    parsed.os_version.as_deref().unwrap_or_default(),
                    requests_per_minute
                ),
            ));
        }

        if parsed.browser.is_none() && requests_per_minute > self.config.no_browser_rpm {
            return Some((
                UserAgentRule::NoBrowser,
                format!(
                    "No browser identified with high request rate ({:.2} requests/minute)",
                    requests_per_minute
                ),
            ));
        }

        None
    }
}

fn matches_device(
    pattern: &SuspiciousDevicePattern,
    parsed: &ParsedUserAgent,
    requests_per_minute: f64,
) -> bool {
    let (Some(os), Some(os_version), Some(device)) = (
        parsed.os.as_deref(),
        parsed.os_version.as_deref(),
        parsed.device.as_deref(),
    ) else {
        return false;
    };

    if !os.eq_ignore_ascii_case(&pattern.os) {
        return false;
    }

    let version_matches = pattern.versions.iter().any(|version| {
        os_version == version
            || os_version
                .strip_prefix(version.as_str())
                .is_some_and(|rest| rest.starts_with('.'))
    });
    if !version_matches {
        return false;
    }

    let device = device.to_lowercase();
    let device_matches = pattern
        .devices
        .iter()
        .any(|candidate| device.contains(&candidate.to_lowercase()));

    device_matches && requests_per_minute > pattern.rpm_threshold
}
