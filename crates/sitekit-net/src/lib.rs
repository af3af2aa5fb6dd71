//! # SiteKit Net
//!
//! HTTP networking for the SiteKit offline cache.
//!
//! [`ResourceLoader`] is the network capability handed to a worker: it sends
//! intercepted requests to the origin with `reqwest` and turns the reply into
//! a [`FetchResponse`]. Any HTTP status counts as a response; only transport
//! failures are errors.

use std::time::Duration;

use async_trait::async_trait;
use hashbrown::HashMap;
use reqwest::{Client, Method};
use sitekit_sw::{FetchRequest, FetchResponse, NetworkFetcher, ServiceWorkerError};
use thiserror::Error;
use tracing::{debug, info, trace};

/// Errors that can occur in networking.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid method: {0}")]
    InvalidMethod(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl From<NetError> for ServiceWorkerError {
    fn from(err: NetError) -> Self {
        ServiceWorkerError::Network(err.to_string())
    }
}

/// Resource loader configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// User agent string.
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum redirects.
    pub max_redirects: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("SiteKit/{}", env!("CARGO_PKG_VERSION")),
            timeout: Duration::from_secs(30),
            max_redirects: 10,
        }
    }
}

impl LoaderConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Resource loader for fetching URLs.
#[derive(Debug, Clone)]
pub struct ResourceLoader {
    client: Client,
    config: LoaderConfig,
}

impl ResourceLoader {
    /// Create a new resource loader.
    pub fn new(config: LoaderConfig) -> Result<Self, NetError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        info!(user_agent = %config.user_agent, timeout = ?config.timeout, "ResourceLoader initialized");

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Send a request and read the whole body.
    pub async fn load(&self, request: &FetchRequest) -> Result<FetchResponse, NetError> {
        debug!(url = %request.url, method = %request.method, "Fetching resource");

        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| NetError::InvalidMethod(request.method.clone()))?;

        let mut req_builder = self.client.request(method, request.url.clone());

        for (name, value) in request.headers.iter() {
            req_builder = req_builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = &request.body {
            req_builder = req_builder.body(body.clone());
        }

        let response = req_builder.send().await.map_err(|e| {
            if e.is_timeout() {
                NetError::Timeout(self.config.timeout)
            } else {
                NetError::HttpError(e)
            }
        })?;

        let status = response.status();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response.bytes().await?;

        trace!(
            url = %request.url,
            status = %status,
            body_len = body.len(),
            "Response received"
        );

        Ok(FetchResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            body: body.to_vec(),
            from_cache: false,
        })
    }
}

#[async_trait]
impl NetworkFetcher for ResourceLoader {
    async fn fetch(&self, request: &FetchRequest) -> sitekit_sw::Result<FetchResponse> {
        self.load(request).await.map_err(ServiceWorkerError::from)
    }
}
