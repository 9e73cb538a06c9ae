//! Content store HTTP client.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, StoreError};
use crate::types::{ItemId, MarkSyncedRequest, SyncBatch, SyncResponse};

/// Default store location.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8787";

/// Default timeout for requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Acknowledgement reply from the store.
///
/// The store's reply shape is not load-bearing; whatever came back is kept
/// for logging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkSyncedResponse {
    /// Number of rows the store reports as updated, when it says.
    #[serde(default)]
    pub updated: Option<u64>,
    /// The raw reply body (`Null` when empty).
    #[serde(skip)]
    pub raw: serde_json::Value,
}

/// Client for the content store's knowledge sync endpoints.
///
/// # Example
///
/// ```no_run
/// use graphbridge_store::StoreClient;
///
/// # async fn example() -> graphbridge_store::Result<()> {
/// let store = StoreClient::builder()
///     .base_url("http://localhost:8787")
///     .build()?;
///
/// let batch = store.fetch_unsynced().await?;
/// let ids: Vec<_> = batch.items.iter().map(|item| item.id.clone()).collect();
/// store.mark_synced(&ids).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct StoreClient {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl StoreClient {
    /// Create a new client builder.
    pub fn builder() -> StoreClientBuilder {
        StoreClientBuilder::new()
    }

    /// Create a client pointing at the default local store.
    pub fn localhost() -> Result<Self> {
        Self::builder().build()
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Get the per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Fetch every item the store still considers unsynced.
    pub async fn fetch_unsynced(&self) -> Result<SyncBatch> {
        let url = self.url("knowledge/sync")?;
        tracing::debug!(%url, "fetching unsynced items");

        let response = self
            .inner
            .http
            .get(url)
            .timeout(self.inner.timeout)
            .send()
            .await?;
        let body: SyncResponse = self.handle_response(response).await?;

        let batch = SyncBatch::from_raw_items(body.items);
        tracing::debug!(
            items = batch.items.len(),
            rejected = batch.rejected.len(),
            "fetched unsynced items"
        );
        Ok(batch)
    }

    /// Flag the given items as synced.
    ///
    /// Re-acknowledging ids the store already considers synced is not an error.
    pub async fn mark_synced(&self, ids: &[ItemId]) -> Result<MarkSyncedResponse> {
        let url = self.url("knowledge/mark-synced")?;
        tracing::debug!(%url, count = ids.len(), "acknowledging items");

        let response = self
            .inner
            .http
            .post(url)
            .json(&MarkSyncedRequest { ids })
            .timeout(self.inner.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.extract_error(response).await);
        }

        // Any body, including none, counts as success.
        let text = response.text().await?;
        let raw: serde_json::Value = if text.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
        };
        let updated = raw.get("updated").and_then(serde_json::Value::as_u64);

        Ok(MarkSyncedResponse { updated, raw })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.inner
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(StoreError::from)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        if !response.status().is_success() {
            return Err(self.extract_error(response).await);
        }
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn extract_error(&self, response: reqwest::Response) -> StoreError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        // Prefer a JSON `error`/`message` field, then the raw body, then the reason phrase.
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("error")
                    .or_else(|| v.get("message"))
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()))
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
            });

        StoreError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

/// Builder for creating a [`StoreClient`].
#[derive(Debug)]
pub struct StoreClientBuilder {
    base_url: Option<String>,
    timeout: Duration,
    user_agent: Option<String>,
}

impl StoreClientBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            user_agent: None,
        }
    }

    /// Set the store base URL (defaults to [`DEFAULT_BASE_URL`]).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<StoreClient> {
        if self.timeout.is_zero() {
            return Err(StoreError::Config("timeout must be non-zero".to_string()));
        }

        let base_url = self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let mut base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::Config(format!(
                "'{}' cannot be used as a base URL",
                base_url
            )));
        }
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("graphbridge/{}", env!("CARGO_PKG_VERSION")));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(user_agent)
            .build()?;

        Ok(StoreClient {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                timeout: self.timeout,
            }),
        })
    }
}

impl Default for StoreClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
