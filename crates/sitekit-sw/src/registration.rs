//! Registration: the waiting and active worker slots of one scope.

use std::time::Instant;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::WorkerConfig;
use crate::event::FetchEvent;
use crate::host::WorkerHost;
use crate::request::FetchResponse;
use crate::worker::{ActivationReport, CacheWorker, WorkerState};
use crate::{Result, ServiceWorkerError};

/// A service worker registration.
///
/// Installing and activating run against `&self`: the slots are locked only
/// to swap workers in, so the active worker keeps answering fetches while a
/// newer one precaches.
#[derive(Debug)]
pub struct ServiceWorkerRegistration {
    /// Scope URL.
    pub scope: Url,

    /// Capabilities handed to every worker of this registration.
    host: WorkerHost,

    /// Waiting worker (installed but not active).
    waiting: RwLock<Option<CacheWorker>>,

    /// Active worker.
    active: RwLock<Option<CacheWorker>>,

    /// Last update time.
    last_update: RwLock<Option<Instant>>,
}

impl ServiceWorkerRegistration {
    /// Create a new registration.
    pub fn new(scope: Url, host: WorkerHost) -> Self {
        Self {
            scope,
            host,
            waiting: RwLock::new(None),
            active: RwLock::new(None),
            last_update: RwLock::new(None),
        }
    }

    pub fn host(&self) -> &WorkerHost {
        &self.host
    }

    pub async fn waiting(&self) -> Option<RwLockReadGuard<'_, CacheWorker>> {
        RwLockReadGuard::try_map(self.waiting.read().await, Option::as_ref).ok()
    }

    pub async fn active(&self) -> Option<RwLockReadGuard<'_, CacheWorker>> {
        RwLockReadGuard::try_map(self.active.read().await, Option::as_ref).ok()
    }

    pub async fn last_update(&self) -> Option<Instant> {
        *self.last_update.read().await
    }

    /// Install a worker built from `config`.
    ///
    /// On success it becomes the waiting worker, replacing any previous
    /// waiting one. On failure it is discarded and the active worker keeps
    /// serving.
    pub async fn update(&self, config: &WorkerConfig) -> Result<usize> {
        *self.last_update.write().await = Some(Instant::now());

        let mut worker = CacheWorker::new(config, self.host.clone())?;
        info!(scope = %self.scope, worker = %worker.id(), cache = %worker.cache_name(), "Update found");

        let cached = match worker.install().await {
            Ok(cached) => cached,
            Err(e) => {
                if let Some(active) = self.active().await {
                    warn!(scope = %self.scope, active = %active.id(), "Install failed, keeping active worker");
                }
                return Err(e);
            }
        };

        if let Some(mut stale) = self.waiting.write().await.replace(worker) {
            debug!(worker = %stale.id(), "Replacing waiting worker");
            stale.set_state(WorkerState::Redundant);
        }
        Ok(cached)
    }

    /// Promote the waiting worker to active.
    ///
    /// The previous active worker serves until the new one has finished its
    /// activate step.
    pub async fn activate(&self) -> Result<ActivationReport> {
        let mut worker = self.waiting.write().await.take().ok_or_else(|| {
            ServiceWorkerError::NotFound(format!("no waiting worker for {}", self.scope))
        })?;

        match worker.activate().await {
            Ok(report) => {
                if let Some(mut old) = self.active.write().await.replace(worker) {
                    old.set_state(WorkerState::Redundant);
                }
                Ok(report)
            }
            Err(e) => {
                let mut waiting = self.waiting.write().await;
                if waiting.is_none() {
                    *waiting = Some(worker);
                }
                Err(e)
            }
        }
    }

    /// Install and immediately activate, as on a first visit.
    pub async fn install_and_activate(&self, config: &WorkerConfig) -> Result<ActivationReport> {
        self.update(config).await?;
        self.activate().await
    }

    /// Route a request through the active worker.
    ///
    /// Without an active worker the page is uncontrolled and the request goes
    /// straight to the network.
    pub async fn handle_fetch(&self, event: &mut FetchEvent) -> Result<Option<FetchResponse>> {
        match self.active().await {
            Some(worker) => worker.handle_fetch(event).await,
            None => {
                debug!(url = %event.request.url, "No active worker, passing through");
                self.host.network.fetch(&event.request).await.map(Some)
            }
        }
    }

    /// Drop every worker.
    pub async fn unregister(&self) {
        for slot in [&self.active, &self.waiting] {
            if let Some(mut worker) = slot.write().await.take() {
                worker.set_state(WorkerState::Redundant);
            }
        }
    }
}
