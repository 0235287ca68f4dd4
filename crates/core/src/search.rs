//! Search provider trait and the structured search result.
//!
//! Two independent backends sit behind [`SearchProvider`]. Whatever happens
//! on the wire, a search always resolves into a [`SearchReport`]: either the
//! top-K hits with a textual synthesis, or a failure the model can cite.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// One ranked hit with source attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Outcome of a single search invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStatus {
    Ok,
    Failed,
}

/// The payload of a search tool message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchReport {
    /// Provider identifier (e.g. "tavily", "google")
    pub provider: String,

    /// The K used for this search
    pub k: usize,

    pub status: SearchStatus,

    /// Textual synthesis of the top-K hits, or the failure description
    pub text: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hits: Vec<SearchHit>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchReport {
    /// Build a successful report from ranked hits, keeping the top `k`.
    pub fn from_hits(provider: impl Into<String>, k: usize, mut hits: Vec<SearchHit>) -> Self {
        let provider = provider.into();
        hits.truncate(k);

        let text = if hits.is_empty() {
            format!("{provider} returned no results for this query")
        } else {
            hits.iter()
                .map(|h| format!("{}: {} (source: {})", h.title, h.snippet, h.url))
                .collect::<Vec<_>>()
                .join("\n")
        };

        Self {
            provider,
            k,
            status: SearchStatus::Ok,
            text,
            hits,
            error: None,
        }
    }

    /// Build a failure report.
    pub fn failed(provider: impl Into<String>, k: usize, reason: impl Into<String>) -> Self {
        let provider = provider.into();
        let reason = reason.into();
        Self {
            text: format!("{provider} returned no result: {reason}"),
            provider,
            k,
            status: SearchStatus::Failed,
            hits: Vec::new(),
            error: Some(reason),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == SearchStatus::Ok
    }
}

/// A web-search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Provider identifier used in reports and citations.
    fn name(&self) -> &str;

    /// The configured K for this provider.
    fn max_results(&self) -> usize;

    /// Run a query, returning at most `max_results` ranked hits.
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> std::result::Result<Vec<SearchHit>, ProviderError>;
}
