//! Query parameter anomaly analysis.
//!
//! Parameters the route does not expect are inspected for scanner signatures:
//! long opaque tokens, long numeric strings, probing names, and random-looking
//! values.

use crate::config::ParameterConfig;
use crate::entropy::shannon_entropy;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

static LONG_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9]{32,}$").expect("token regex is valid"));

static LONG_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{10,}$").expect("number regex is valid"));

static PROBE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(test|debug|admin|hack)").expect("probe regex is valid"));

/// What made an unexpected parameter suspicious
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterTrigger {
    LongToken,
    LongNumber,
    ProbeName,
    HighEntropy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterAnalysis {
    pub is_suspicious: bool,
    /// Parameter names outside the route's whitelist, in order of appearance
    pub unexpected_parameters: Vec<String>,
    /// The first unexpected parameter that matched a criterion
    pub triggered_by: Option<String>,
    pub trigger: Option<ParameterTrigger>,
    /// Entropy of the triggering value, when entropy was the trigger
    pub entropy: Option<f64>,
    pub reason: Option<String>,
}

pub struct ParameterAnomalyAnalyzer {
    config: ParameterConfig,
}

impl Default for ParameterAnomalyAnalyzer {
    fn default() -> Self {
        Self::new(ParameterConfig::default())
    }
}

impl ParameterAnomalyAnalyzer {
    pub fn new(config: ParameterConfig) -> Self {
        Self { config }
    }

    /// Inspect the query string of `url` against the parameters expected on its path
    pub fn analyze(&self, url: &str, whitelist: &HashSet<String>) -> ParameterAnalysis {
        let Some(parsed) = parse_url(url) else {
            tracing::debug!(url = %url, "Skipping parameter analysis for malformed URL");
            return ParameterAnalysis::default();
        };

        let parameters = query_parameters(&parsed);
        let unexpected: Vec<&(String, String)> = parameters
            .iter()
            .filter(|(name, _)| !whitelist.contains(name))
            .collect();

        if unexpected.is_empty() {
            return ParameterAnalysis::default();
        }

        let mut analysis = ParameterAnalysis {
            unexpected_parameters: unexpected.iter().map(|(name, _)| name.clone()).collect(),
            ..ParameterAnalysis::default()
        };

        for (name, value) in &unexpected {
            if let Some((trigger, entropy)) = self.inspect(name, value) {
                analysis.is_suspicious = true;
                analysis.triggered_by = Some(name.clone());
                analysis.trigger = Some(trigger);
                analysis.entropy = entropy;
                analysis.reason = Some(format!(
                    "Unexpected parameters with suspicious patterns: {}",
                    analysis.unexpected_parameters.join(", ")
                ));
                break;
            }
        }

        analysis
    }

    fn inspect(&self, name: &str, value: &str) -> Option<(ParameterTrigger, Option<f64>)> {
        for candidate in [name, value] {
            if LONG_TOKEN.is_match(candidate) {
                return Some((ParameterTrigger::LongToken, None));
            }
            if LONG_NUMBER.is_match(candidate) {
                return Some((ParameterTrigger::LongNumber, None));
            }
            if PROBE_NAME.is_match(candidate) {
                return Some((ParameterTrigger::ProbeName, None));
            }
        }

        if value.chars().count() > self.config.entropy_min_length {
            let entropy = shannon_entropy(value);
            if entropy > self.config.entropy_threshold {
                return Some((ParameterTrigger::HighEntropy, Some(entropy)));
            }
        }

        None
    }
}

/// Path component of a logged URL, which may be absolute or origin-relative
pub fn request_path(url: &str) -> Option<String> {
    parse_url(url).map(|parsed| parsed.path().to_string())
}

fn parse_url(url: &str) -> Option<Url> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    match Url::parse(url) {
        Ok(parsed) => Some(parsed),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse("http://localhost")
            .and_then(|base| base.join(url))
            .ok(),
        Err(_) => None,
    }
}

/// Decoded query parameters, one entry per logical name.
///
/// Repeated keys and PHP-style array keys (`tags[]`, `filter[year]`) collapse
/// into their base name with values joined by commas.
fn query_parameters(url: &Url) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = Vec::new();

    for (raw_name, value) in url.query_pairs() {
        let name = raw_name
            .split('[')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        if name.is_empty() {
            continue;
        }

        match merged.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, values)) => {
                values.push(',');
                values.push_str(&value);
            }
            None => merged.push((name, value.into_owned())),
        }
    }

    merged
}
