//! Capabilities the hosting runtime lends to a worker.

use async_trait::async_trait;
use std::sync::Arc;

use crate::cache::{CacheStore, MemoryCacheStore};
use crate::clients::{ClientControl, Clients};
use crate::request::{FetchRequest, FetchResponse};
use crate::Result;

/// Network capability offered by the host.
///
/// A resolved response is a success whatever its status; only transport
/// failures are errors.
#[async_trait]
pub trait NetworkFetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse>;
}

/// Host capabilities shared by every worker of a registration.
#[derive(Clone)]
pub struct WorkerHost {
    pub caches: Arc<dyn CacheStore>,
    pub network: Arc<dyn NetworkFetcher>,
    pub clients: Arc<dyn ClientControl>,
}

impl WorkerHost {
    pub fn new(
        caches: Arc<dyn CacheStore>,
        network: Arc<dyn NetworkFetcher>,
        clients: Arc<dyn ClientControl>,
    ) -> Self {
        Self {
            caches,
            network,
            clients,
        }
    }

    /// Host with in-memory cache storage and client registry.
    pub fn in_memory(network: Arc<dyn NetworkFetcher>) -> Self {
        Self::new(
            Arc::new(MemoryCacheStore::new()),
            network,
            Arc::new(Clients::new()),
        )
    }
}

impl std::fmt::Debug for WorkerHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHost").finish_non_exhaustive()
    }
}
