//! # SiteKit Service Worker
//!
//! Offline asset cache for the personal-site PWA, modelled on the service
//! worker lifecycle.
//!
//! ## Features
//!
//! - **Lifecycle**: install, activate, fetch as an explicit state machine
//! - **Cache API**: version-qualified buckets, all-or-nothing precache
//! - **Routing**: ordered route table selecting cache-first or network-first
//! - **Clients API**: claim already-open pages on activation
//! - **Host injection**: cache storage, network and clients are traits
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorkerRegistration (scope)
//!     │
//!     ├── waiting (CacheWorker)
//!     └── active (CacheWorker)
//!             ├── cache_name ("journal-pwa-cache-v3")
//!             ├── manifest (precached URLs)
//!             ├── routes (RouteTable)
//!             └── host (WorkerHost)
//!                     ├── CacheStore    → CacheStorage → Cache → RequestKey → CacheEntry
//!                     ├── NetworkFetcher
//!                     └── ClientControl
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

pub mod cache;
pub mod clients;
pub mod config;
pub mod event;
pub mod host;
pub mod registration;
pub mod request;
pub mod routes;
pub mod worker;

pub use cache::{Cache, CacheEntry, CacheStorage, CacheStore, MemoryCacheStore};
pub use clients::{Client, ClientControl, ClientMatchOptions, ClientType, Clients};
pub use config::{AssetManifest, WorkerConfig, CACHE_PREFIX, CACHE_VERSION, DYNAMIC_MARKER};
pub use event::{ExtendableEvent, FetchEvent};
pub use host::{NetworkFetcher, WorkerHost};
pub use registration::ServiceWorkerRegistration;
pub use request::{FetchRequest, FetchResponse, RequestKey};
pub use routes::{PatternKind, Route, RouteTable, Strategy, UrlPattern};
pub use worker::{ActivationReport, CacheWorker, WorkerState};

// ==================== Errors ====================

/// Errors that can occur in service worker operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceWorkerError {
    #[error("Install failed for {url}: {reason}")]
    InstallFailed { url: String, reason: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("State error: {0}")]
    State(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for ServiceWorkerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceWorkerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for ServiceWorkerError {
    fn from(err: url::ParseError) -> Self {
        Self::Config(format!("invalid URL: {}", err))
    }
}

/// Result type alias for service worker operations.
pub type Result<T> = std::result::Result<T, ServiceWorkerError>;

// ==================== Types ====================

/// Unique identifier for a service worker instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ServiceWorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sw-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_id_uniqueness() {
        let a = ServiceWorkerId::new();
        let b = ServiceWorkerId::new();
        assert_ne!(a, b);
        assert_eq!(format!("{}", a), format!("sw-{}", a.raw()));
    }

    #[test]
    fn test_error_conversions() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(matches!(ServiceWorkerError::from(io), ServiceWorkerError::Io(_)));

        let parse = url::Url::parse("not a url").unwrap_err();
        assert!(matches!(
            ServiceWorkerError::from(parse),
            ServiceWorkerError::Config(_)
        ));
    }
}
