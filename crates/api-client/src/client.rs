use std::time::Duration;

use anyhow::{Result, bail};
use serde::de::DeserializeOwned;
use tracing::debug;

use gantt_api::*;
use gantt_runtime_config::GanttConfig;

use crate::connectivity::ServerProbe;

/// Typed HTTP client for the Gantt tracker read API.
///
/// Reads carry the stored API key as a bearer credential when one is set;
/// without it the server treats the caller as anonymous, which only share
/// token reads can see anything with.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ApiClient {
    /// Create a new client with the given base URL and timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
        })
    }

    /// Client for the configured server, timing out after the probe timeout.
    pub fn from_config(config: &GanttConfig) -> Result<Self> {
        Self::new(&config.server.base_url, config.connectivity.probe_timeout())
    }

    /// Create from an existing `reqwest::Client` (e.g. shared in tests).
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    pub fn set_api_key(&mut self, key: String) {
        self.api_key = Some(key);
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    // ── Health ────────────────────────────────────────────────────────────

    pub async fn health(&self) -> Result<HealthResponse> {
        let resp = self.client.get(self.url("/health")).send().await?;
        parse_response(resp).await
    }

    // ── Reads ─────────────────────────────────────────────────────────────

    pub async fn list_categories(&self, query: &ReadQuery) -> Result<ListResponse<CategoryRow>> {
        self.list(Resource::Categories, query).await
    }

    pub async fn list_projects(&self, query: &ReadQuery) -> Result<ListResponse<ProjectRow>> {
        self.list(Resource::Projects, query).await
    }

    pub async fn list_tasks(&self, query: &ReadQuery) -> Result<ListResponse<TaskRow>> {
        self.list(Resource::Tasks, query).await
    }

    async fn list<T: DeserializeOwned>(
        &self,
        resource: Resource,
        query: &ReadQuery,
    ) -> Result<ListResponse<T>> {
        let mut req = self
            .client
            .get(self.url(&format!("/{}", resource.as_str())))
            .query(query);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        parse_response(req.send().await?).await
    }
}

impl ServerProbe for ApiClient {
    /// Any failure, including a timeout or a non-2xx status, counts as down.
    async fn probe(&self) -> bool {
        match self.health().await {
            Ok(_) => true,
            Err(e) => {
                debug!("Health probe failed: {e}");
                false
            }
        }
    }
}

/// Parse an HTTP response: return the deserialized body on 2xx,
/// or an error containing the status and body text.
async fn parse_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("{status}: {body}");
    }
    Ok(resp.json().await?)
}
