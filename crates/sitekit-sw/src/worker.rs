//! The offline asset cache manager and its lifecycle.

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::CacheEntry;
use crate::config::WorkerConfig;
use crate::event::FetchEvent;
use crate::host::WorkerHost;
use crate::request::{FetchRequest, FetchResponse};
use crate::routes::{RouteTable, Strategy};
use crate::{Result, ServiceWorkerError, ServiceWorkerId};

/// Lifecycle state of a worker instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerState {
    /// Created, install not yet finished.
    Installing,
    /// Installed, waiting to be promoted.
    Waiting,
    /// Controlling pages and intercepting fetches.
    Active,
    /// Install failed or replaced by a newer worker.
    Redundant,
}

impl Default for WorkerState {
    fn default() -> Self {
        Self::Installing
    }
}

/// Outcome of [`CacheWorker::activate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// Stale caches that were deleted.
    pub removed_caches: Vec<String>,
    /// Clients newly placed under this worker's control.
    pub claimed_clients: usize,
}

/// A worker instance owning one version-qualified cache bucket.
#[derive(Debug)]
pub struct CacheWorker {
    id: ServiceWorkerId,
    cache_name: String,
    manifest: Vec<Url>,
    routes: RouteTable,
    host: WorkerHost,
    state: WorkerState,
    state_changed_at: Instant,
}

impl CacheWorker {
    /// Build a worker in the `Installing` state.
    pub fn new(config: &WorkerConfig, host: WorkerHost) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            id: ServiceWorkerId::new(),
            cache_name: config.cache_name.clone(),
            manifest: config.assets.resolve(&config.origin)?,
            routes: config.route_table(),
            host,
            state: WorkerState::Installing,
            state_changed_at: Instant::now(),
        })
    }

    pub fn id(&self) -> ServiceWorkerId {
        self.id
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn manifest(&self) -> &[Url] {
        &self.manifest
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Time of last state change.
    pub fn state_changed_at(&self) -> Instant {
        self.state_changed_at
    }

    pub fn is_active(&self) -> bool {
        self.state == WorkerState::Active
    }

    pub fn is_redundant(&self) -> bool {
        self.state == WorkerState::Redundant
    }

    pub(crate) fn set_state(&mut self, state: WorkerState) {
        debug!(worker = %self.id, from = ?self.state, to = ?state, "Worker state change");
        self.state = state;
        self.state_changed_at = Instant::now();
    }

    fn expect_state(&self, expected: WorkerState, operation: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ServiceWorkerError::State(format!(
                "cannot {} worker {} in state {:?}",
                operation, self.id, self.state
            )))
        }
    }

    // ==================== Install ====================

    /// Precache every manifest entry into this worker's bucket.
    ///
    /// All entries are fetched before the bucket is created, so a single
    /// failure leaves no bucket behind and the worker redundant.
    pub async fn install(&mut self) -> Result<usize> {
        self.expect_state(WorkerState::Installing, "install")?;
        info!(worker = %self.id, cache = %self.cache_name, assets = self.manifest.len(), "Installing");

        match self.precache().await {
            Ok(count) => {
                self.set_state(WorkerState::Waiting);
                info!(worker = %self.id, cache = %self.cache_name, cached = count, "Install complete");
                Ok(count)
            }
            Err(e) => {
                self.set_state(WorkerState::Redundant);
                error!(worker = %self.id, cache = %self.cache_name, error = %e, "Install failed");
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<usize> {
        let entries = try_join_all(self.manifest.iter().map(|url| self.fetch_asset(url))).await?;
        let count = entries.len();
        self.host.caches.put_all(&self.cache_name, entries).await?;
        Ok(count)
    }

    async fn fetch_asset(&self, url: &Url) -> Result<CacheEntry> {
        let request = FetchRequest::get(url.clone());
        let response = self.host.network.fetch(&request).await.map_err(|e| {
            ServiceWorkerError::InstallFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;

        if !response.ok() {
            return Err(ServiceWorkerError::InstallFailed {
                url: url.to_string(),
                reason: format!("HTTP {} {}", response.status, response.status_text),
            });
        }

        debug!(url = %url, bytes = response.body.len(), "Asset fetched");
        Ok(CacheEntry::from_response(&request, &response))
    }

    // ==================== Activate ====================

    /// Delete every cache but the current one, then claim open clients.
    ///
    /// Cleanup is best effort: a failed listing or delete is logged and does
    /// not keep the worker from activating or claiming.
    pub async fn activate(&mut self) -> Result<ActivationReport> {
        self.expect_state(WorkerState::Waiting, "activate")?;
        info!(worker = %self.id, cache = %self.cache_name, "Activating");

        let names = match self.host.caches.keys().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Could not list caches, skipping cleanup");
                Vec::new()
            }
        };

        let mut report = ActivationReport::default();
        for name in names.into_iter().filter(|name| *name != self.cache_name) {
            match self.host.caches.delete(&name).await {
                Ok(true) => {
                    info!(cache = %name, "Deleted stale cache");
                    report.removed_caches.push(name);
                }
                Ok(false) => debug!(cache = %name, "Stale cache already gone"),
                Err(e) => warn!(cache = %name, error = %e, "Failed to delete stale cache"),
            }
        }

        self.set_state(WorkerState::Active);

        report.claimed_clients = match self.host.clients.claim(self.id).await {
            Ok(claimed) => claimed,
            Err(e) => {
                warn!(worker = %self.id, error = %e, "Failed to claim clients");
                0
            }
        };

        info!(
            worker = %self.id,
            removed = report.removed_caches.len(),
            claimed = report.claimed_clients,
            "Activated"
        );
        Ok(report)
    }

    // ==================== Fetch ====================

    /// Answer an intercepted request.
    ///
    /// `Ok(None)` means the network failed and the cache had nothing either;
    /// the page has to treat it as a failed load.
    pub async fn handle_fetch(&self, event: &mut FetchEvent) -> Result<Option<FetchResponse>> {
        if !self.is_active() {
            return Err(ServiceWorkerError::State(format!(
                "worker {} is not active ({:?})",
                self.id, self.state
            )));
        }

        let strategy = self.routes.resolve(&event.request.url);
        debug!(url = %event.request.url, method = %event.request.method, strategy = ?strategy, "Fetch intercepted");

        match strategy {
            Strategy::CacheFirst => self.cache_first(&event.request).await.map(Some),
            Strategy::NetworkFirst => self.network_first(event).await,
        }
    }

    async fn lookup(&self, request: &FetchRequest) -> Option<FetchResponse> {
        match self
            .host
            .caches
            .match_request(&self.cache_name, &request.key())
            .await
        {
            Ok(entry) => entry.map(|entry| FetchResponse::from_cache(&entry)),
            Err(e) => {
                warn!(url = %request.url, error = %e, "Cache lookup failed");
                None
            }
        }
    }

    async fn cache_first(&self, request: &FetchRequest) -> Result<FetchResponse> {
        if let Some(cached) = self.lookup(request).await {
            debug!(url = %request.url, "Cache hit");
            return Ok(cached);
        }

        debug!(url = %request.url, "Cache miss, fetching from network");
        self.host.network.fetch(request).await
    }

    async fn network_first(&self, event: &mut FetchEvent) -> Result<Option<FetchResponse>> {
        let request = event.request.clone();

        match self.host.network.fetch(&request).await {
            Ok(response) => {
                if request.is_get() {
                    let entry = CacheEntry::from_response(&request, &response);
                    let caches = Arc::clone(&self.host.caches);
                    let cache_name = self.cache_name.clone();
                    event.wait_until(async move {
                        let key = entry.key();
                        match caches.put(&cache_name, entry).await {
                            Ok(()) => {}
                            // Bucket deleted by a newer worker's activation.
                            Err(ServiceWorkerError::NotFound(_)) => {
                                debug!(cache = %cache_name, key = %key, "Cache gone, dropping refresh")
                            }
                            Err(e) => {
                                warn!(cache = %cache_name, key = %key, error = %e, "Failed to refresh cached response")
                            }
                        }
                    });
                } else {
                    debug!(url = %request.url, method = %request.method, "Not caching non-GET response");
                }
                Ok(Some(response))
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Network failed, falling back to cache");
                let cached = self.lookup(&request).await;
                if cached.is_none() {
                    debug!(url = %request.url, "No cached fallback");
                }
                Ok(cached)
            }
        }
    }
}
