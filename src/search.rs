//! Client for the document lookup service.
//!
//! The lookup service hosts two vector indices (product catalog and buying
//! guides) plus an optional server-side recommendation matcher. This module
//! defines the `DocumentSearch` seam the sales agent searches through and an
//! HTTP implementation on top of a shared `reqwest` connection pool.

use crate::error::SimulationError;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error};

/// A short text passage returned by the lookup service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateDocument {
    /// Passage text
    pub page_content: String,

    /// Metadata map; catalog items carry a stable `title`
    #[serde(default)]
    pub metadata: IndexMap<String, Value>,
}

impl CandidateDocument {
    /// Creates a document with a title entry in its metadata.
    pub fn titled(title: impl Into<String>, page_content: impl Into<String>) -> Self {
        let mut metadata = IndexMap::new();
        metadata.insert("title".to_string(), Value::String(title.into()));
        Self {
            page_content: page_content.into(),
            metadata,
        }
    }

    /// Returns the item title, falling back to its `id`.
    pub fn title(&self) -> Option<&str> {
        self.metadata
            .get("title")
            .or_else(|| self.metadata.get("id"))
            .and_then(Value::as_str)
    }
}

/// The two indices the lookup service exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    /// Items in stock
    Products,
    /// Buying guides and comparison articles
    BuyingGuides,
}

impl SearchKind {
    fn path(self) -> &'static str {
        match self {
            SearchKind::Products => "products/search",
            SearchKind::BuyingGuides => "guides/search",
        }
    }
}

/// A ranked text search over one of the lookup indices.
#[async_trait]
pub trait DocumentSearch: Send + Sync {
    /// Returns up to `k` documents for the query, best first.
    async fn search(
        &self,
        kind: SearchKind,
        query: &str,
        k: usize,
    ) -> Result<Vec<CandidateDocument>, SimulationError>;

    /// Releases resources held for one run. Must tolerate repeated calls.
    async fn release(&self) {}
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    k: usize,
}

#[derive(Serialize)]
struct RecommendedItemsRequest<'a> {
    candidates: &'a [CandidateDocument],
    response: &'a str,
    sim_threshold: f32,
}

/// HTTP client for the lookup service.
///
/// Clones share one connection pool, so a single client can serve every
/// sales agent in a batch.
#[derive(Clone, Debug)]
pub struct LookupServiceClient {
    base_url: String,
    client: reqwest::Client,
}

impl LookupServiceClient {
    /// Creates a client for the service at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, SimulationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(30)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SimulationError::Request(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Returns the service base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Checks that the service answers its health endpoint.
    pub async fn health(&self) -> Result<(), SimulationError> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(SimulationError::Search(format!(
                "Lookup service unhealthy: HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Opens a per-run session sharing this client's connection pool.
    pub fn session(&self) -> SearchSession {
        SearchSession {
            client: self.clone(),
            released: AtomicBool::new(false),
        }
    }

    /// Asks the service which candidates `response` recommends.
    pub async fn find_recommended_items(
        &self,
        candidates: &[CandidateDocument],
        response: &str,
        sim_threshold: f32,
    ) -> Result<Vec<CandidateDocument>, SimulationError> {
        let url = format!("{}/sales/find_recommended_items", self.base_url);
        let body = RecommendedItemsRequest {
            candidates,
            response,
            sim_threshold,
        };
        let reply = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(10))
            .json(&body)
            .send()
            .await?;
        if !reply.status().is_success() {
            let status = reply.status();
            let error_text = reply.text().await?;
            return Err(SimulationError::Search(format!(
                "Find recommended items error {}: {}",
                status, error_text
            )));
        }
        Ok(reply.json().await?)
    }

    async fn try_search(
        &self,
        kind: SearchKind,
        query: &str,
        k: usize,
    ) -> Result<Vec<CandidateDocument>, SimulationError> {
        let url = format!("{}/{}", self.base_url, kind.path());
        let response = self
            .client
            .post(&url)
            .json(&SearchRequest { query, k })
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(SimulationError::Search(format!(
                "HTTP error {}: {}",
                status, error_text
            )));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl DocumentSearch for LookupServiceClient {
    /// A failed lookup is logged and degrades to no documents.
    async fn search(
        &self,
        kind: SearchKind,
        query: &str,
        k: usize,
    ) -> Result<Vec<CandidateDocument>, SimulationError> {
        match self.try_search(kind, query, k).await {
            Ok(documents) => Ok(documents),
            Err(e) => {
                error!(?kind, query, error = %e, "lookup failed");
                Ok(Vec::new())
            }
        }
    }
}

/// A per-run view of the lookup service.
///
/// Searches go through the shared pool until `release` is called; after
/// that every search fails.
#[derive(Debug)]
pub struct SearchSession {
    client: LookupServiceClient,
    released: AtomicBool,
}

impl SearchSession {
    /// Whether `release` has been called.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &LookupServiceClient {
        &self.client
    }
}

#[async_trait]
impl DocumentSearch for SearchSession {
    async fn search(
        &self,
        kind: SearchKind,
        query: &str,
        k: usize,
    ) -> Result<Vec<CandidateDocument>, SimulationError> {
        if self.is_released() {
            return Err(SimulationError::Search("Search session already released".to_string()));
        }
        self.client.search(kind, query, k).await
    }

    async fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            debug!(base_url = %self.client.base_url, "search session released");
        }
    }
}
