//! SymbolScout feed and watch-list client

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::FetchError;
use crate::events::NewsBatch;
use crate::retry::{with_retry, RetryConfig};
use crate::settings::HttpSettings;

/// Source of market events for news mode
#[async_trait]
pub trait NewsFeed: Send + Sync {
    async fn fetch_news(&self) -> Result<NewsBatch, FetchError>;
}

/// One external symbol list for list-sync mode
#[async_trait]
pub trait WatchlistSource: Send + Sync {
    /// Label used in logs
    fn name(&self) -> &str;

    /// Raw symbol tokens, multiplier prefixes intact
    async fn fetch_symbols(&self) -> Result<BTreeSet<String>, FetchError>;
}

/// HTTP client shared by every SymbolScout endpoint
pub struct SymbolScoutClient {
    client: Client,
    retry: RetryConfig,
}

#[derive(Debug, Deserialize)]
struct WatchlistResponse {
    #[serde(default)]
    symbols: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PairListResponse {
    #[serde(default)]
    pairs: Vec<String>,
}

impl SymbolScoutClient {
    /// Create a client with the request timeout and retry policy from settings
    pub fn new(http: &HttpSettings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(http.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            retry: RetryConfig::from(http),
        })
    }

    /// Replace the retry policy
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// GET `{ news: [...] }`
    pub async fn fetch_news(&self, endpoint: &str) -> Result<NewsBatch, FetchError> {
        let batch: NewsBatch = self.get_json(endpoint).await?;
        debug!("Fetched {} events from {}", batch.news.len(), endpoint);
        Ok(batch)
    }

    /// GET `{ symbols: [...] }`
    pub async fn fetch_watchlist(&self, endpoint: &str) -> Result<BTreeSet<String>, FetchError> {
        let response: WatchlistResponse = self.get_json(endpoint).await?;
        let symbols: BTreeSet<String> = response
            .symbols
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        info!("Fetched {} symbols from watchlist", symbols.len());
        Ok(symbols)
    }

    /// GET `{ pairs: [...] }`, keeping the base before the first `/`
    pub async fn fetch_remote_pairlist(
        &self,
        endpoint: &str,
    ) -> Result<BTreeSet<String>, FetchError> {
        let response: PairListResponse = self.get_json(endpoint).await?;
        let symbols: BTreeSet<String> = response
            .pairs
            .iter()
            .filter_map(|pair| pair.split('/').next())
            .map(|base| base.trim().to_string())
            .filter(|base| !base.is_empty())
            .collect();
        info!("Fetched {} symbols from remote pairlist", symbols.len());
        Ok(symbols)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        with_retry(move || self.get_once::<T>(url), &self.retry).await
    }

    async fn get_once<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(url, e))?;

        serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

fn transport_error(url: &str, e: reqwest::Error) -> FetchError {
    FetchError::Transport {
        url: url.to_string(),
        retryable: e.is_timeout() || e.is_connect(),
        message: e.to_string(),
    }
}

/// News feed at a fixed endpoint
pub struct HttpNewsFeed {
    client: Arc<SymbolScoutClient>,
    endpoint: String,
}

impl HttpNewsFeed {
    pub fn new(client: Arc<SymbolScoutClient>, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl NewsFeed for HttpNewsFeed {
    async fn fetch_news(&self) -> Result<NewsBatch, FetchError> {
        self.client.fetch_news(&self.endpoint).await
    }
}

/// SymbolScout's own watch-list (`{ symbols }`)
pub struct SymbolScoutWatchlist {
    client: Arc<SymbolScoutClient>,
    endpoint: String,
}

impl SymbolScoutWatchlist {
    pub fn new(client: Arc<SymbolScoutClient>, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl WatchlistSource for SymbolScoutWatchlist {
    fn name(&self) -> &str {
        "symbolscout_watchlist"
    }

    async fn fetch_symbols(&self) -> Result<BTreeSet<String>, FetchError> {
        self.client.fetch_watchlist(&self.endpoint).await
    }
}

/// Remote pair list (`{ pairs }`)
pub struct RemotePairList {
    client: Arc<SymbolScoutClient>,
    endpoint: String,
}

impl RemotePairList {
    pub fn new(client: Arc<SymbolScoutClient>, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl WatchlistSource for RemotePairList {
    fn name(&self) -> &str {
        "remotepairlist"
    }

    async fn fetch_symbols(&self) -> Result<BTreeSet<String>, FetchError> {
        self.client.fetch_remote_pairlist(&self.endpoint).await
    }
}
