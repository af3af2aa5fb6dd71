//! Precache tool for the SiteKit offline cache.
//!
//! Runs the worker lifecycle against a live origin and keeps the resulting
//! cache storage in a JSON snapshot.
//!
//! ## Usage
//!
//! ```bash
//! # Install and activate the default manifest from a local dev server
//! sitekit-precache install --origin http://localhost:5000/ --store caches.json
//!
//! # Same, with an explicit config file
//! sitekit-precache install --config worker.json --store caches.json
//!
//! # Show what is cached
//! sitekit-precache list --store caches.json
//!
//! # Print the default config as a starting point
//! sitekit-precache config > worker.json
//! ```

use clap::{Parser, Subcommand};
use sitekit_common::{init_logging, LogConfig};
use sitekit_net::{LoaderConfig, ResourceLoader};
use sitekit_sw::{
    CacheStorage, Clients, MemoryCacheStore, ServiceWorkerRegistration, WorkerConfig, WorkerHost,
};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

#[derive(Parser)]
#[command(name = "sitekit-precache")]
#[command(about = "Precache the site's offline assets into a cache snapshot")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install the worker's manifest and activate it
    Install {
        /// Worker config file (JSON); defaults are used when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the config's origin
        #[arg(long)]
        origin: Option<Url>,
        /// Cache storage snapshot to update
        #[arg(short, long, default_value = "caches.json")]
        store: PathBuf,
        /// Per-request timeout in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,
    },

    /// List caches and their entries
    List {
        /// Cache storage snapshot to read
        #[arg(short, long, default_value = "caches.json")]
        store: PathBuf,
    },

    /// Print the default worker config
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(LogConfig::from_flags(cli.verbose, cli.json_logs))?;

    match cli.command {
        Commands::Install {
            config,
            origin,
            store,
            timeout,
        } => {
            let config = load_config(config.as_deref(), origin)?;
            install(&config, &store, Duration::from_secs(timeout)).await?;
        }

        Commands::List { store } => {
            let storage = CacheStorage::load(&store)?;
            print!("{}", describe_storage(&storage));
        }

        Commands::Config => {
            println!("{}", WorkerConfig::default().to_json()?);
        }
    }

    Ok(())
}

fn load_config(
    path: Option<&Path>,
    origin: Option<Url>,
) -> Result<WorkerConfig, Box<dyn std::error::Error>> {
    let mut config = match path {
        Some(path) => WorkerConfig::load(path)?,
        None => WorkerConfig::default(),
    };
    if let Some(origin) = origin {
        config = config.with_origin(origin);
    }
    Ok(config)
}

async fn install(
    config: &WorkerConfig,
    store: &Path,
    timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let caches = Arc::new(MemoryCacheStore::from_storage(CacheStorage::load_or_default(
        store,
    )?));
    let loader = ResourceLoader::new(LoaderConfig::default().with_timeout(timeout))?;
    let host = WorkerHost::new(caches.clone(), Arc::new(loader), Arc::new(Clients::new()));

    let registration = ServiceWorkerRegistration::new(config.origin.clone(), host);
    let cached = registration.update(config).await?;
    let report = registration.activate().await?;

    caches.snapshot().await.save(store)?;

    info!(store = %store.display(), "Snapshot written");
    println!("Cached {} assets into '{}'", cached, config.cache_name);
    for name in &report.removed_caches {
        println!("Removed stale cache '{}'", name);
    }
    Ok(())
}

fn describe_storage(storage: &CacheStorage) -> String {
    let mut out = String::new();
    for name in storage.keys() {
        let Some(cache) = storage.get(&name) else {
            continue;
        };
        let _ = writeln!(out, "{} ({} entries)", name, cache.len());
        for key in cache.keys() {
            let _ = writeln!(out, "  {}", key);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitekit_sw::{CacheEntry, FetchRequest, FetchResponse};

    #[test]
    fn test_parse_install() {
        let cli = Cli::try_parse_from([
            "sitekit-precache",
            "install",
            "--origin",
            "http://localhost:5000/",
            "--store",
            "out.json",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Install {
                origin,
                store,
                timeout,
                config,
            } => {
                assert_eq!(origin.unwrap().as_str(), "http://localhost:5000/");
                assert_eq!(store, PathBuf::from("out.json"));
                assert_eq!(timeout, 30);
                assert!(config.is_none());
            }
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn test_load_config_origin_override() {
        let origin = Url::parse("https://site.example/").unwrap();
        let config = load_config(None, Some(origin.clone())).unwrap();
        assert_eq!(config.origin, origin);
        assert_eq!(config.cache_name, WorkerConfig::default().cache_name);
    }

    #[test]
    fn test_describe_storage() {
        let mut storage = CacheStorage::new();
        let request = FetchRequest::get(Url::parse("https://site.example/").unwrap());
        storage
            .open("site-v1")
            .put(CacheEntry::from_response(&request, &FetchResponse::new(200, "home")));
        storage.open("site-v0");

        let text = describe_storage(&storage);
        assert_eq!(
            text,
            "site-v0 (0 entries)\nsite-v1 (1 entries)\n  https://site.example/\n"
        );
    }

    #[test]
    fn test_list_reads_saved_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("caches.json");
        let mut storage = CacheStorage::new();
        storage.open("journal-pwa-cache-v3");
        storage.save(&path).unwrap();

        let loaded = CacheStorage::load(&path).unwrap();
        assert!(describe_storage(&loaded).starts_with("journal-pwa-cache-v3"));
    }
}
