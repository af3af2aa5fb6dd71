//! Cache buckets and the storage that holds them.

use async_trait::async_trait;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::request::{FetchRequest, FetchResponse, RequestKey};
use crate::{Result, ServiceWorkerError};

// ==================== Cache Entry ====================

/// A cached request/response pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL.
    pub url: String,

    /// Request method.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response status text.
    #[serde(default)]
    pub status_text: String,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Copy a response into an entry for `request`.
    pub fn from_response(request: &FetchRequest, response: &FetchResponse) -> Self {
        Self {
            url: request.url.as_str().to_string(),
            method: request.method.to_ascii_uppercase(),
            status: response.status,
            status_text: response.status_text.clone(),
            headers: response.headers.clone(),
            body: response.body.clone(),
            cached_at: now_millis(),
        }
    }

    /// Key this entry is stored under.
    pub fn key(&self) -> RequestKey {
        RequestKey::from_parts(&self.method, &self.url)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ==================== Cache ====================

/// A named cache bucket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    /// Cached entries.
    entries: HashMap<RequestKey, CacheEntry>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a request key.
    pub fn match_request(&self, key: &RequestKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Insert or overwrite an entry.
    pub fn put(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.key(), entry);
    }

    /// Delete entry.
    pub fn delete(&mut self, key: &RequestKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<RequestKey> {
        let mut keys: Vec<_> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==================== Cache Storage ====================

/// Every cache bucket known to the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStorage {
    caches: HashMap<String, Cache>,
}

impl CacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a cache (creates if doesn't exist).
    pub fn open(&mut self, name: &str) -> &mut Cache {
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
    }

    /// Get a cache without creating it.
    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Cache> {
        self.caches.get_mut(name)
    }

    /// Check if cache exists.
    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Delete a cache.
    pub fn delete(&mut self, name: &str) -> bool {
        self.caches.remove(name).is_some()
    }

    /// All cache names, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut names: Vec<_> = self.caches.keys().cloned().collect();
        names.sort();
        names
    }

    /// Write the whole storage to `path` as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, json)?;
        debug!(path = %path.display(), caches = self.caches.len(), "Cache storage saved");
        Ok(())
    }

    /// Read storage previously written by [`CacheStorage::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let storage: Self = serde_json::from_slice(&bytes)?;
        debug!(path = %path.display(), caches = storage.caches.len(), "Cache storage loaded");
        Ok(storage)
    }

    /// Like [`CacheStorage::load`], but a missing file yields empty storage.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

// ==================== Cache Store ====================

/// Cache storage capability offered by the host.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Open a cache, creating it when absent.
    async fn open(&self, name: &str) -> Result<()>;

    /// Store one entry in an existing cache, overwriting any previous entry
    /// under the same key. Fails with `NotFound` if the cache is gone.
    async fn put(&self, name: &str, entry: CacheEntry) -> Result<()>;

    /// Store a batch of entries, creating the cache when absent. Either all
    /// are written or none are.
    async fn put_all(&self, name: &str, entries: Vec<CacheEntry>) -> Result<()>;

    /// Look up a key in one cache.
    async fn match_request(&self, name: &str, key: &RequestKey) -> Result<Option<CacheEntry>>;

    /// Names of all caches.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Delete a cache. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Keys stored in one cache.
    async fn entries(&self, name: &str) -> Result<Vec<RequestKey>>;
}

/// In-process [`CacheStore`] backed by [`CacheStorage`].
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    storage: RwLock<CacheStorage>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap existing storage, e.g. one loaded from disk.
    pub fn from_storage(storage: CacheStorage) -> Self {
        Self {
            storage: RwLock::new(storage),
        }
    }

    /// Copy of the current storage.
    pub async fn snapshot(&self) -> CacheStorage {
        self.storage.read().await.clone()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn open(&self, name: &str) -> Result<()> {
        self.storage.write().await.open(name);
        Ok(())
    }

    async fn put(&self, name: &str, entry: CacheEntry) -> Result<()> {
        trace!(cache = name, key = %entry.key(), "Cache put");
        match self.storage.write().await.get_mut(name) {
            Some(cache) => {
                cache.put(entry);
                Ok(())
            }
            None => Err(ServiceWorkerError::NotFound(format!("cache '{}'", name))),
        }
    }

    async fn put_all(&self, name: &str, entries: Vec<CacheEntry>) -> Result<()> {
        let mut storage = self.storage.write().await;
        let cache = storage.open(name);
        for entry in entries {
            cache.put(entry);
        }
        Ok(())
    }

    async fn match_request(&self, name: &str, key: &RequestKey) -> Result<Option<CacheEntry>> {
        let storage = self.storage.read().await;
        Ok(storage
            .get(name)
            .and_then(|cache| cache.match_request(key))
            .cloned())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.storage.read().await.keys())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.storage.write().await.delete(name))
    }

    async fn entries(&self, name: &str) -> Result<Vec<RequestKey>> {
        self.storage
            .read()
            .await
            .get(name)
            .map(Cache::keys)
            .ok_or_else(|| ServiceWorkerError::NotFound(format!("cache '{}'", name)))
    }
}
