//! Route parameter catalog
//!
//! Resolves, for a request path, the set of query parameter names legitimate
//! clients are expected to send. The catalog is built from a static manifest
//! of routes and the input fields their handlers validate, plus a table of
//! manual overrides for paths whose inputs cannot be declared statically.
//!
//! ## Lookup order
//!
//! 1. Exact match of the normalized path against a declared route
//! 2. First declared route pattern whose placeholders (`{slug}`) match the path
//! 3. The baseline set accepted everywhere (pagination, sorting, search, ...)
//!
//! The built index is cached for the lifetime of the catalog; call
//! [`RouteParameterCatalog::clear_cache`] after the manifest changes.

use crate::config::CatalogConfig;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Parameter names accepted on every route
pub const BASELINE_PARAMETERS: &[&str] = &[
    // Pagination
    "page", "per_page", "limit", "offset",
    // Sorting
    "sort", "order", "order_by", "sort_by", "direction",
    // Filtering
    "search", "q", "query", "filter", "filters",
    // Format
    "format", "type",
    // Locale
    "locale", "lang", "language",
    // Auth and method spoofing
    "token", "api_key", "_token", "_method",
    // Identifiers
    "id", "uuid", "slug",
];

static BASELINE: Lazy<Arc<HashSet<String>>> = Lazy::new(|| {
    Arc::new(
        BASELINE_PARAMETERS
            .iter()
            .map(|name| name.to_string())
            .collect(),
    )
});

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[^{}/]+\}").expect("placeholder regex is valid"));

static FIELD_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_\-]+$").expect("field name regex is valid"));

/// One registered route and the input fields its handler validates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDeclaration {
    /// Path pattern, e.g. `blog/{slug}` or `/api/posts/{id}/comments`
    pub pattern: String,
    /// Validation rule keys, e.g. `title`, `items.*.name`, `tags[]`
    #[serde(default)]
    pub fields: Vec<String>,
}

impl RouteDeclaration {
    pub fn new<I, S>(pattern: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pattern: pattern.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug)]
struct PatternRoute {
    pattern: String,
    matcher: Regex,
    parameters: Arc<HashSet<String>>,
}

#[derive(Debug, Default)]
struct CatalogIndex {
    exact: HashMap<String, Arc<HashSet<String>>>,
    /// Placeholder routes in manifest order
    patterns: Vec<PatternRoute>,
}

/// Cached mapping from route pattern to accepted parameter names
pub struct RouteParameterCatalog {
    routes: Vec<RouteDeclaration>,
    manual_overrides: BTreeMap<String, Vec<String>>,
    index: RwLock<Option<Arc<CatalogIndex>>>,
}

impl RouteParameterCatalog {
    pub fn new(
        routes: Vec<RouteDeclaration>,
        manual_overrides: BTreeMap<String, Vec<String>>,
    ) -> Self {
        Self {
            routes,
            manual_overrides,
            index: RwLock::new(None),
        }
    }

    pub fn from_config(config: &CatalogConfig) -> Self {
        Self::new(config.routes.clone(), config.manual_overrides.clone())
    }

    /// The parameter set accepted when no route matches
    pub fn baseline() -> Arc<HashSet<String>> {
        Arc::clone(&BASELINE)
    }

    /// Accepted parameter names for a request path
    pub fn whitelist_for(&self, path: &str) -> Arc<HashSet<String>> {
        let index = self.index();
        let normalized = normalize_path(path);

        if let Some(parameters) = index.exact.get(normalized) {
            return Arc::clone(parameters);
        }

        for route in &index.patterns {
            if route.matcher.is_match(normalized) {
                debug!("Path '{}' matched route pattern '{}'", normalized, route.pattern);
                return Arc::clone(&route.parameters);
            }
        }

        Self::baseline()
    }

    /// Drop the cached index; the next lookup rebuilds it
    pub fn clear_cache(&self) {
        *self.index.write() = None;
        debug!("Route parameter catalog cache cleared");
    }

    /// Rebuild the index immediately
    pub fn rebuild(&self) {
        let index = Arc::new(self.build_index());
        *self.index.write() = Some(index);
    }

    pub fn is_built(&self) -> bool {
        self.index.read().is_some()
    }

    fn index(&self) -> Arc<CatalogIndex> {
        if let Some(index) = self.index.read().as_ref() {
            return Arc::clone(index);
        }

        let mut guard = self.index.write();
        // Another caller may have built it while we waited for the lock
        if let Some(index) = guard.as_ref() {
            return Arc::clone(index);
        }
        let index = Arc::new(self.build_index());
        *guard = Some(Arc::clone(&index));
        index
    }

    fn build_index(&self) -> CatalogIndex {
        // Manifest order is kept so the first declared pattern wins on overlap
        let mut order: Vec<String> = Vec::new();
        let mut parameters: HashMap<String, HashSet<String>> = HashMap::new();

        for route in &self.routes {
            let pattern = normalize_path(&route.pattern).to_string();
            let entry = parameters.entry(pattern.clone()).or_insert_with(|| {
                order.push(pattern.clone());
                BASELINE.as_ref().clone()
            });

            for field in &route.fields {
                match flatten_field(field) {
                    Some(name) => {
                        entry.insert(name);
                    }
                    None => warn!(
                        "Ignoring unusable field '{}' declared on route '{}'",
                        field, route.pattern
                    ),
                }
            }
        }

        for (path, extra) in &self.manual_overrides {
            let pattern = normalize_path(path).to_string();
            let entry = parameters.entry(pattern.clone()).or_insert_with(|| {
                order.push(pattern.clone());
                BASELINE.as_ref().clone()
            });
            entry.extend(
                extra
                    .iter()
                    .map(|name| name.trim())
                    .filter(|name| !name.is_empty())
                    .map(str::to_string),
            );
        }

        let mut index = CatalogIndex::default();
        for pattern in order {
            let Some(set) = parameters.remove(&pattern) else {
                continue;
            };
            let set = Arc::new(set);

            if PLACEHOLDER.is_match(&pattern) {
                match compile_pattern(&pattern) {
                    Ok(matcher) => index.patterns.push(PatternRoute {
                        pattern: pattern.clone(),
                        matcher,
                        parameters: Arc::clone(&set),
                    }),
                    Err(e) => warn!(
                        "Route pattern '{}' could not be compiled, exact matches only: {}",
                        pattern, e
                    ),
                }
            }
            index.exact.insert(pattern, set);
        }

        info!(
            "Built route parameter catalog: {} routes, {} with placeholders",
            index.exact.len(),
            index.patterns.len()
        );
        index
    }
}

/// Trim leading and trailing separators
pub fn normalize_path(path: &str) -> &str {
    path.trim_matches('/')
}

/// Reduce a validation key to the query parameter name it arrives under.
///
/// `items.*.name` and `items[0][name]` both arrive as `items`.
fn flatten_field(field: &str) -> Option<String> {
    let base = field
        .trim()
        .split(|c| c == '.' || c == '[')
        .next()
        .unwrap_or_default();

    if FIELD_NAME.is_match(base) {
        Some(base.to_string())
    } else {
        None
    }
}

/// Turn `blog/{slug}` into `^blog/[^/]+$`
fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    let mut expression = String::from("^");
    let mut last = 0;
    for placeholder in PLACEHOLDER.find_iter(pattern) {
        expression.push_str(&regex::escape(&pattern[last..placeholder.start()]));
        expression.push_str("[^/]+");
        last = placeholder.end();
    }
    expression.push_str(&regex::escape(&pattern[last..]));
    expression.push('$');
    Regex::new(&expression)
}
