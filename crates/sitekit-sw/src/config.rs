//! Worker configuration: cache version, precache manifest and routes.

use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

use crate::routes::{Route, RouteTable, UrlPattern};
use crate::{Result, ServiceWorkerError};

/// Bump whenever the manifest or caching logic changes.
pub const CACHE_VERSION: &str = "v3";

/// Cache name prefix; the version is appended.
pub const CACHE_PREFIX: &str = "journal-pwa-cache";

/// Substring identifying the journal feed served network-first.
pub const DYNAMIC_MARKER: &str = "reflections";

const DEFAULT_ORIGIN: &str = "http://localhost:5000/";

const DEFAULT_ASSETS: &[&str] = &[
    "/",
    "/index.html",
    "/about.html",
    "/journal.html",
    "/projects.html",
    "/css/style.css",
    "/js/script.js",
    "/manifest.json",
    "/images/icon-192.png",
    "/images/icon-512.png",
];

/// Ordered list of paths fetched at install time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetManifest {
    paths: Vec<String>,
}

impl AssetManifest {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Resolve every path against `origin`, keeping order.
    pub fn resolve(&self, origin: &Url) -> Result<Vec<Url>> {
        self.paths
            .iter()
            .map(|path| {
                origin.join(path).map_err(|e| {
                    ServiceWorkerError::Config(format!("asset '{}': {}", path, e))
                })
            })
            .collect()
    }
}

impl Default for AssetManifest {
    fn default() -> Self {
        Self::new(DEFAULT_ASSETS.iter().copied())
    }
}

/// Everything a [`crate::CacheWorker`] is built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Origin the manifest paths are resolved against.
    pub origin: Url,

    /// Version-qualified name of the current cache.
    pub cache_name: String,

    /// Precache manifest.
    pub assets: AssetManifest,

    /// Routes checked in order; unmatched requests are cache-first.
    pub routes: Vec<Route>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            origin: Url::parse(DEFAULT_ORIGIN).expect("default origin is a valid URL"),
            cache_name: format!("{}-{}", CACHE_PREFIX, CACHE_VERSION),
            assets: AssetManifest::default(),
            routes: vec![Route::network_first(UrlPattern::contains(DYNAMIC_MARKER))],
        }
    }
}

impl WorkerConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Pretty JSON form, as accepted by [`WorkerConfig::load`].
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_origin(mut self, origin: Url) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = name.into();
        self
    }

    pub fn with_assets(mut self, assets: AssetManifest) -> Self {
        self.assets = assets;
        self
    }

    pub fn with_routes(mut self, routes: Vec<Route>) -> Self {
        self.routes = routes;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_name.trim().is_empty() {
            return Err(ServiceWorkerError::Config(
                "cache_name must not be empty".to_string(),
            ));
        }
        if let Some(bad) = self.assets.paths().iter().find(|p| !p.starts_with('/')) {
            return Err(ServiceWorkerError::Config(format!(
                "asset '{}' must be an absolute path",
                bad
            )));
        }
        Ok(())
    }

    pub fn route_table(&self) -> RouteTable {
        self.routes.iter().cloned().collect()
    }
}
