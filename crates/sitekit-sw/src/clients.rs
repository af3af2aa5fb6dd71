//! Pages controlled by the worker.

use async_trait::async_trait;
use hashbrown::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use crate::{Result, ServiceWorkerId};

// ==================== Client ====================

/// A client (open page or worker).
#[derive(Debug, Clone)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Client URL.
    pub url: Url,

    /// Client type.
    pub client_type: ClientType,

    /// Worker currently controlling this client.
    pub controller: Option<ServiceWorkerId>,
}

/// Client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientType {
    #[default]
    Window,
    All,
}

impl Client {
    /// An uncontrolled window client.
    pub fn window(url: Url) -> Self {
        Self {
            id: next_client_id(),
            url,
            client_type: ClientType::Window,
            controller: None,
        }
    }

    pub fn is_controlled(&self) -> bool {
        self.controller.is_some()
    }
}

fn next_client_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Options for [`Clients::match_all`].
#[derive(Debug, Clone, Default)]
pub struct ClientMatchOptions {
    pub include_uncontrolled: bool,
    pub client_type: ClientType,
}

// ==================== Client Control ====================

/// Client-control capability offered by the host.
#[async_trait]
pub trait ClientControl: Send + Sync {
    /// Make `worker` the controller of every open client without a reload.
    /// Returns the number of clients claimed.
    async fn claim(&self, worker: ServiceWorkerId) -> Result<usize>;
}

// ==================== Clients ====================

/// In-process client registry.
#[derive(Debug, Default)]
pub struct Clients {
    clients: RwLock<HashMap<String, Client>>,
}

impl Clients {
    /// Create new clients manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client.
    pub async fn add(&self, client: Client) {
        self.clients.write().await.insert(client.id.clone(), client);
    }

    /// Remove a client.
    pub async fn remove(&self, id: &str) -> Option<Client> {
        self.clients.write().await.remove(id)
    }

    /// Get a client by ID.
    pub async fn get(&self, id: &str) -> Option<Client> {
        self.clients.read().await.get(id).cloned()
    }

    /// Open a window client.
    pub async fn open_window(&self, url: &str) -> Result<Client> {
        let url = Url::parse(url)?;
        let client = Client::window(url);
        self.add(client.clone()).await;
        Ok(client)
    }

    /// Match all clients.
    pub async fn match_all(&self, options: ClientMatchOptions) -> Vec<Client> {
        let mut matched: Vec<_> = self
            .clients
            .read()
            .await
            .values()
            .filter(|c| options.include_uncontrolled || c.is_controlled())
            .filter(|c| match options.client_type {
                ClientType::All => true,
                t => c.client_type == t,
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        matched
    }
}

#[async_trait]
impl ClientControl for Clients {
    async fn claim(&self, worker: ServiceWorkerId) -> Result<usize> {
        let mut clients = self.clients.write().await;
        let mut claimed = 0;
        for client in clients.values_mut() {
            if client.controller != Some(worker) {
                client.controller = Some(worker);
                claimed += 1;
            }
        }
        debug!(worker = %worker, claimed, "Clients claimed");
        Ok(claimed)
    }
}
