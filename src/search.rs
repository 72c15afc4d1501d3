//! Web search capability used by the welfare handler.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;
use crate::error::SearchError;

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
}

/// Query string in, ordered results out.
#[async_trait]
pub trait SearchTool: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError>;
}

/// Tavily-compatible search over HTTP.
pub struct TavilySearch {
    client: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
    max_results: usize,
    timeout: Duration,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

impl TavilySearch {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: SecretString,
        max_results: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
            max_results,
            timeout,
        }
    }
}

#[async_trait]
impl SearchTool for TavilySearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        let body = SearchRequest {
            api_key: self.api_key.expose_secret(),
            query,
            max_results: self.max_results,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Timeout(self.timeout)
                } else {
                    SearchError::RequestFailed(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(SearchError::RequestFailed(format!("HTTP {status}: {err}")));
        }

        let parsed: SearchResponse = resp
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(e.to_string()))?;

        let mut results = parsed.results;
        results.truncate(self.max_results);
        tracing::debug!(query, results = results.len(), "Web search complete");
        Ok(results)
    }
}

/// Stand-in used when no search API key is configured.
pub struct DisabledSearch;

#[async_trait]
impl SearchTool for DisabledSearch {
    async fn search(&self, _query: &str) -> Result<Vec<SearchResult>, SearchError> {
        Err(SearchError::NotConfigured)
    }
}

/// Build the search tool for the given configuration.
pub fn create_search_tool(config: &SearchConfig) -> Arc<dyn SearchTool> {
    match &config.api_key {
        Some(key) => {
            tracing::info!(endpoint = %config.endpoint, "Web search enabled");
            Arc::new(TavilySearch::new(
                config.endpoint.clone(),
                key.clone(),
                config.max_results,
                config.timeout,
            ))
        }
        None => {
            tracing::warn!("ARTISAN_SEARCH_API_KEY not set, welfare search disabled");
            Arc::new(DisabledSearch)
        }
    }
}
