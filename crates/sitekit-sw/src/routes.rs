//! Route table selecting a fetch strategy per request URL.

use serde::{Deserialize, Serialize};
use tracing::trace;
use url::Url;

/// How a request is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Serve from the bucket; on a miss go to the network without caching.
    #[default]
    CacheFirst,
    /// Try the network and refresh the bucket; on failure serve from the bucket.
    NetworkFirst,
}

/// Type of URL pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Exact URL match.
    Exact,
    /// Prefix match.
    Prefix,
    /// Suffix match (e.g., file extension).
    Suffix,
    /// Contains substring.
    Contains,
}

/// URL pattern for matching, applied to the full serialized URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlPattern {
    pub kind: PatternKind,
    pub value: String,
}

impl UrlPattern {
    /// Create an exact match pattern.
    pub fn exact(url: &str) -> Self {
        Self {
            kind: PatternKind::Exact,
            value: url.to_string(),
        }
    }

    /// Create a prefix match pattern.
    pub fn prefix(prefix: &str) -> Self {
        Self {
            kind: PatternKind::Prefix,
            value: prefix.to_string(),
        }
    }

    /// Create a suffix match pattern.
    pub fn suffix(suffix: &str) -> Self {
        Self {
            kind: PatternKind::Suffix,
            value: suffix.to_string(),
        }
    }

    /// Create a contains pattern.
    pub fn contains(substring: &str) -> Self {
        Self {
            kind: PatternKind::Contains,
            value: substring.to_string(),
        }
    }

    /// Check if a URL matches this pattern.
    pub fn matches(&self, url: &Url) -> bool {
        let url_str = url.as_str();
        match self.kind {
            PatternKind::Exact => url_str == self.value,
            PatternKind::Prefix => url_str.starts_with(&self.value),
            PatternKind::Suffix => url_str.ends_with(&self.value),
            PatternKind::Contains => url_str.contains(&self.value),
        }
    }
}

/// A pattern paired with the strategy it selects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub pattern: UrlPattern,
    pub strategy: Strategy,
}

impl Route {
    pub fn new(pattern: UrlPattern, strategy: Strategy) -> Self {
        Self { pattern, strategy }
    }

    pub fn network_first(pattern: UrlPattern) -> Self {
        Self::new(pattern, Strategy::NetworkFirst)
    }

    pub fn cache_first(pattern: UrlPattern) -> Self {
        Self::new(pattern, Strategy::CacheFirst)
    }
}

/// Ordered routes; the first matching route wins.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Table with no routes, answering everything with cache-first.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route after the existing ones.
    pub fn push(&mut self, route: Route) {
        self.routes.push(route);
    }

    /// Builder form of [`RouteTable::push`].
    pub fn with_route(mut self, route: Route) -> Self {
        self.push(route);
        self
    }

    /// Pick the strategy for `url`. Unmatched URLs are cache-first.
    pub fn resolve(&self, url: &Url) -> Strategy {
        for route in &self.routes {
            if route.pattern.matches(url) {
                trace!(url = %url, pattern = %route.pattern.value, strategy = ?route.strategy, "Route matched");
                return route.strategy;
            }
        }
        Strategy::CacheFirst
    }
}

impl FromIterator<Route> for RouteTable {
    fn from_iter<I: IntoIterator<Item = Route>>(iter: I) -> Self {
        Self {
            routes: iter.into_iter().collect(),
        }
    }
}
