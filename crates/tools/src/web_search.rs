//! Web search tool: exposes a [`SearchProvider`] to the model.
//!
//! The tool never reports a provider failure as a tool error: transport,
//! quota and auth problems are folded into a failed [`SearchReport`] so the
//! model can cite the missing source instead of inventing one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use twinsearch_core::error::{ProviderError, ToolError};
use twinsearch_core::search::{SearchHit, SearchProvider, SearchReport};
use twinsearch_core::tool::{Tool, ToolResult};

pub struct SearchTool {
    name: String,
    description: String,
    provider: Arc<dyn SearchProvider>,
    timeout: Option<Duration>,
}

impl SearchTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        provider: Arc<dyn SearchProvider>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            provider,
            timeout: None,
        }
    }

    /// Bound every search call; expiry is reported as a failed search.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn run_search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, ProviderError> {
        let Some(limit) = self.timeout else {
            return self.provider.search(query, k).await;
        };
        match tokio::time::timeout(limit, self.provider.search(query, k)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(format!(
                "no response within {}s",
                limit.as_secs()
            ))),
        }
    }
}

/// Serialize a report into a tool result.
pub fn report_to_result(report: &SearchReport) -> Result<ToolResult, ToolError> {
    let data = serde_json::to_value(report).map_err(|e| ToolError::ExecutionFailed {
        tool_name: report.provider.clone(),
        reason: e.to_string(),
    })?;
    let output = serde_json::to_string_pretty(&data).map_err(|e| ToolError::ExecutionFailed {
        tool_name: report.provider.clone(),
        reason: e.to_string(),
    })?;

    Ok(ToolResult {
        call_id: String::new(),
        success: report.is_ok(),
        output,
        data: Some(data),
    })
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    fn search_origin(&self) -> Option<(&str, usize)> {
        Some((self.provider.name(), self.provider.max_results()))
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let provider = self.provider.name();
        let k = self.provider.max_results();

        debug!(tool = %self.name, provider, k, query, "Running web search");

        let report = match self.run_search(query, k).await {
            Ok(hits) => SearchReport::from_hits(provider, k, hits),
            Err(e) => {
                warn!(tool = %self.name, provider, error = %e, "Search provider failed");
                SearchReport::failed(provider, k, e.to_string())
            }
        };

        report_to_result(&report)
    }
}
