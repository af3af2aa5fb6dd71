//! Lifecycle and fetch-strategy tests against a scripted network.

use async_trait::async_trait;
use futures::future::join_all;
use sitekit_sw::{
    AssetManifest, CacheStore, Clients, ClientMatchOptions, FetchEvent, FetchRequest,
    FetchResponse, MemoryCacheStore, NetworkFetcher, RequestKey, ServiceWorkerError,
    ServiceWorkerRegistration, WorkerConfig, WorkerHost, WorkerState,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

const ORIGIN: &str = "https://site.example/";
const FEED: &str = "https://site.example/reflections";

/// Network double: serves scripted bodies, fails on demand, counts calls.
#[derive(Default)]
struct ScriptedNetwork {
    bodies: Mutex<HashMap<String, String>>,
    failing: Mutex<HashSet<String>>,
    offline: Mutex<bool>,
    calls: AtomicUsize,
}

impl ScriptedNetwork {
    fn serve(&self, url: &str, body: &str) {
        self.bodies
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_string());
    }

    fn fail(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }

    fn set_offline(&self, offline: bool) {
        *self.offline.lock().unwrap() = offline;
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn reset_calls(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl NetworkFetcher for ScriptedNetwork {
    async fn fetch(&self, request: &FetchRequest) -> sitekit_sw::Result<FetchResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let url = request.url.as_str().to_string();

        if *self.offline.lock().unwrap() || self.failing.lock().unwrap().contains(&url) {
            return Err(ServiceWorkerError::Network(format!("unreachable: {}", url)));
        }

        match self.bodies.lock().unwrap().get(&url) {
            Some(body) => Ok(FetchResponse::new(200, body.as_bytes().to_vec())
                .with_header("content-type", "text/plain")),
            None => Ok(FetchResponse::new(200, format!("default body for {}", url).into_bytes())),
        }
    }
}

struct Harness {
    network: Arc<ScriptedNetwork>,
    caches: Arc<MemoryCacheStore>,
    clients: Arc<Clients>,
    registration: ServiceWorkerRegistration,
}

impl Harness {
    fn new() -> Self {
        let network = Arc::new(ScriptedNetwork::default());
        let caches = Arc::new(MemoryCacheStore::new());
        let clients = Arc::new(Clients::new());
        let host = WorkerHost::new(caches.clone(), network.clone(), clients.clone());
        let registration = ServiceWorkerRegistration::new(Url::parse(ORIGIN).unwrap(), host);
        Self {
            network,
            caches,
            clients,
            registration,
        }
    }

    async fn fetch(&self, url: &str) -> (sitekit_sw::Result<Option<FetchResponse>>, FetchEvent) {
        let mut event = FetchEvent::new(FetchRequest::get(Url::parse(url).unwrap()));
        let result = self.registration.handle_fetch(&mut event).await;
        (result, event)
    }

    async fn cached(&self, cache: &str, url: &str) -> Option<Vec<u8>> {
        let key = RequestKey::get(&Url::parse(url).unwrap());
        self.caches
            .match_request(cache, &key)
            .await
            .unwrap()
            .map(|entry| entry.body)
    }
}

fn site_config(cache_name: &str) -> WorkerConfig {
    WorkerConfig::default()
        .with_origin(Url::parse(ORIGIN).unwrap())
        .with_cache_name(cache_name)
}

fn manifest_urls(config: &WorkerConfig) -> Vec<Url> {
    config.assets.resolve(&config.origin).unwrap()
}

#[tokio::test]
async fn install_caches_every_manifest_entry() {
    let h = Harness::new();
    let config = site_config("site-v1");

    let cached = h.registration.update(&config).await.unwrap();
    assert_eq!(cached, config.assets.len());

    for url in manifest_urls(&config) {
        let body = h.cached("site-v1", url.as_str()).await;
        assert!(
            body.map(|b| !b.is_empty()).unwrap_or(false),
            "missing cached body for {}",
            url
        );
    }
}

#[tokio::test]
async fn failed_manifest_fetch_commits_nothing() {
    let h = Harness::new();
    h.network.fail("https://site.example/projects.html");

    let err = h.registration.update(&site_config("site-v1")).await.unwrap_err();
    assert!(matches!(err, ServiceWorkerError::InstallFailed { ref url, .. } if url.ends_with("/projects.html")));

    assert!(h.registration.waiting().await.is_none());
    assert!(h.caches.keys().await.unwrap().is_empty());
    assert!(matches!(
        h.caches.entries("site-v1").await,
        Err(ServiceWorkerError::NotFound(_))
    ));
}

#[tokio::test]
async fn failed_install_keeps_previous_worker_serving() {
    let h = Harness::new();
    h.network.serve("https://site.example/about.html", "about v1");
    h.registration
        .install_and_activate(&site_config("site-v1"))
        .await
        .unwrap();

    h.network.fail("https://site.example/css/style.css");
    assert!(h.registration.update(&site_config("site-v2")).await.is_err());

    {
        let active = h.registration.active().await.unwrap();
        assert_eq!(active.cache_name(), "site-v1");
        assert_eq!(active.state(), WorkerState::Active);
    }

    let (result, _) = h.fetch("https://site.example/about.html").await;
    let response = result.unwrap().unwrap();
    assert!(response.from_cache);
    assert_eq!(response.text(), "about v1");
}

#[tokio::test]
async fn activation_leaves_only_current_cache() {
    let h = Harness::new();
    h.caches.open("site-v0").await.unwrap();
    h.caches.open("unrelated-cache").await.unwrap();

    h.registration.update(&site_config("site-v1")).await.unwrap();
    let report = h.registration.activate().await.unwrap();

    assert_eq!(h.caches.keys().await.unwrap(), vec!["site-v1".to_string()]);
    assert_eq!(
        report.removed_caches,
        vec!["site-v0".to_string(), "unrelated-cache".to_string()]
    );
}

#[tokio::test]
async fn activation_claims_open_pages() {
    let h = Harness::new();
    h.clients.open_window("https://site.example/journal.html").await.unwrap();

    let report = h
        .registration
        .install_and_activate(&site_config("site-v1"))
        .await
        .unwrap();
    assert_eq!(report.claimed_clients, 1);

    let controlled = h.clients.match_all(ClientMatchOptions::default()).await;
    assert_eq!(controlled.len(), 1);
    assert_eq!(
        controlled[0].controller,
        Some(h.registration.active().await.unwrap().id())
    );
}

#[tokio::test]
async fn feed_response_matches_stored_copy_and_overwrites() {
    let h = Harness::new();
    h.registration
        .install_and_activate(&site_config("site-v1"))
        .await
        .unwrap();

    h.network.serve(FEED, r#"[{"title":"first"}]"#);
    let (result, mut event) = h.fetch(FEED).await;
    let first = result.unwrap().unwrap();
    assert!(!first.from_cache);
    assert_eq!(event.settle().await, 1);

    let key = RequestKey::get(&Url::parse(FEED).unwrap());
    let stored = h.caches.match_request("site-v1", &key).await.unwrap().unwrap();
    assert!(first.same_content(&FetchResponse::from_cache(&stored)));

    h.network.serve(FEED, r#"[{"title":"second"}]"#);
    let (result, mut event) = h.fetch(FEED).await;
    assert_eq!(result.unwrap().unwrap().text(), r#"[{"title":"second"}]"#);
    event.settle().await;

    assert_eq!(
        h.cached("site-v1", FEED).await.unwrap(),
        br#"[{"title":"second"}]"#.to_vec()
    );
}

#[tokio::test]
async fn feed_falls_back_to_cache_when_offline() {
    let h = Harness::new();
    h.registration
        .install_and_activate(&site_config("site-v1"))
        .await
        .unwrap();

    h.network.serve(FEED, "[1,2,3]");
    let (_, mut event) = h.fetch(FEED).await;
    event.settle().await;

    h.network.set_offline(true);
    let (result, event) = h.fetch(FEED).await;
    let response = result.unwrap().unwrap();
    assert!(response.from_cache);
    assert_eq!(response.text(), "[1,2,3]");
    assert_eq!(event.pending(), 0);
}

#[tokio::test]
async fn feed_offline_without_cache_returns_nothing() {
    let h = Harness::new();
    h.registration
        .install_and_activate(&site_config("site-v1"))
        .await
        .unwrap();

    h.network.set_offline(true);
    let (result, _) = h.fetch(FEED).await;
    assert!(result.unwrap().is_none());
}

#[tokio::test]
async fn cached_static_asset_skips_network() {
    let h = Harness::new();
    h.registration
        .install_and_activate(&site_config("site-v1"))
        .await
        .unwrap();
    h.network.reset_calls();

    let (result, _) = h.fetch("https://site.example/index.html").await;
    assert!(result.unwrap().unwrap().from_cache);
    assert_eq!(h.network.calls(), 0);
}

#[tokio::test]
async fn uncached_static_asset_fetched_but_not_stored() {
    let h = Harness::new();
    h.registration
        .install_and_activate(&site_config("site-v1"))
        .await
        .unwrap();
    h.network.reset_calls();
    let before = h.caches.entries("site-v1").await.unwrap();

    h.network.serve("https://site.example/images/photo.jpg", "jpeg");
    let (result, event) = h.fetch("https://site.example/images/photo.jpg").await;
    let response = result.unwrap().unwrap();

    assert_eq!(h.network.calls(), 1);
    assert_eq!(response.text(), "jpeg");
    assert!(!response.from_cache);
    assert_eq!(event.pending(), 0);
    assert_eq!(h.caches.entries("site-v1").await.unwrap(), before);
}

#[tokio::test]
async fn uncached_static_asset_network_failure_is_surfaced() {
    let h = Harness::new();
    h.registration
        .install_and_activate(&site_config("site-v1"))
        .await
        .unwrap();

    h.network.fail("https://site.example/missing.css");
    let (result, _) = h.fetch("https://site.example/missing.css").await;
    assert!(matches!(result, Err(ServiceWorkerError::Network(_))));
}

#[tokio::test]
async fn version_bump_replaces_cache() {
    let h = Harness::new();
    h.registration
        .install_and_activate(&site_config("v2"))
        .await
        .unwrap();
    assert!(h.caches.keys().await.unwrap().contains(&"v2".to_string()));

    let config = site_config("v3");
    h.registration.update(&config).await.unwrap();
    // v2 still serves while v3 waits.
    assert_eq!(h.registration.active().await.unwrap().cache_name(), "v2");

    h.registration.activate().await.unwrap();

    assert_eq!(h.caches.keys().await.unwrap(), vec!["v3".to_string()]);
    for url in manifest_urls(&config) {
        assert!(h.cached("v3", url.as_str()).await.is_some());
    }
    assert_eq!(h.registration.active().await.unwrap().cache_name(), "v3");
}

#[tokio::test]
async fn late_feed_write_does_not_revive_deleted_cache() {
    let h = Harness::new();
    h.registration
        .install_and_activate(&site_config("v2"))
        .await
        .unwrap();

    h.network.serve(FEED, "[]");
    let (result, event) = h.fetch(FEED).await;
    assert!(result.unwrap().is_some());
    assert_eq!(event.pending(), 1);
    // The host never settles this event; its write is left running.
    drop(event);

    h.registration
        .install_and_activate(&site_config("v3"))
        .await
        .unwrap();
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert_eq!(h.caches.keys().await.unwrap(), vec!["v3".to_string()]);
    assert!(h.cached("v3", FEED).await.is_none());
}

#[tokio::test]
async fn concurrent_fetches_are_independent() {
    let h = Harness::new();
    h.registration
        .install_and_activate(&site_config("site-v1"))
        .await
        .unwrap();
    h.network.serve(FEED, "[]");
    h.network.reset_calls();

    let urls = [
        "https://site.example/",
        "https://site.example/about.html",
        FEED,
        "https://site.example/journal.html",
        FEED,
    ];
    let results = join_all(urls.iter().map(|url| h.fetch(url))).await;

    let mut writes = 0;
    for (result, mut event) in results {
        assert!(result.unwrap().is_some());
        writes += event.settle().await;
    }
    assert_eq!(writes, 2);
    assert_eq!(h.network.calls(), 2);
    assert_eq!(h.cached("site-v1", FEED).await.unwrap(), b"[]".to_vec());
}
