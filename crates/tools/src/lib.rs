//! Tool adapters for twinsearch.
//!
//! Two kinds of tools live here:
//! - search adapters the model may call ([`web_search::SearchTool`] over the
//!   [`tavily`] and [`google`] clients)
//! - bookkeeping adapters the router always runs once per turn
//!   ([`usage::UsageCounter`], [`similarity::AnswerSimilarity`])

pub mod google;
pub mod similarity;
pub mod tavily;
pub mod usage;
pub mod web_search;

use std::sync::Arc;
use std::time::Duration;

use twinsearch_config::{ConfigError, SearchConfig};
use twinsearch_core::tool::{Bookkeeper, ToolRegistry};

pub use google::GoogleSearchClient;
pub use similarity::{AnswerSimilarity, SimilarityReport};
pub use tavily::TavilyClient;
pub use usage::{UsageCounter, UsageReport};
pub use web_search::SearchTool;

/// Tool name of the Tavily search adapter.
pub const TAVILY_TOOL: &str = "tavily_search";
/// Tool name of the Google search adapter.
pub const GOOGLE_TOOL: &str = "google_search";

/// Build the model-callable search roster from configuration.
pub fn search_registry(config: &SearchConfig) -> Result<ToolRegistry, ConfigError> {
    let mut missing = Vec::new();
    if config.tavily.api_key.is_none() {
        missing.push("TAVILY_API_KEY".to_string());
    }
    if config.google.api_key.is_none() {
        missing.push("GOOGLE_API_KEY".to_string());
    }
    if config.google.cse_id.is_none() {
        missing.push("GOOGLE_CSE_ID".to_string());
    }
    if !missing.is_empty() {
        return Err(ConfigError::MissingCredentials(missing));
    }

    let timeout = Duration::from_secs(config.timeout_secs);
    let tavily = TavilyClient::new(
        config.tavily.api_url.clone(),
        config.tavily.api_key.clone().unwrap_or_default(),
        config.tavily.max_results,
        timeout,
    )
    .with_topic(config.tavily.topic.clone());
    let google = GoogleSearchClient::new(
        config.google.api_url.clone(),
        config.google.api_key.clone().unwrap_or_default(),
        config.google.cse_id.clone().unwrap_or_default(),
        config.google.num_results,
        timeout,
    );

    let mut registry = ToolRegistry::new();
    registry.register(Box::new(
        SearchTool::new(
            TAVILY_TOOL,
            "Search the web with Tavily. Returns the top results with their source URLs.",
            Arc::new(tavily),
        )
        .with_timeout(timeout),
    ));
    registry.register(Box::new(
        SearchTool::new(
            GOOGLE_TOOL,
            "Search the web with Google. Returns the top results with their source URLs.",
            Arc::new(google),
        )
        .with_timeout(timeout),
    ));
    Ok(registry)
}

/// The bookkeeping adapters, in the order the router runs them.
///
/// `search_tools` names the tools whose results the similarity adapter
/// compares.
pub fn default_bookkeepers(search_tools: &[&str]) -> Vec<Box<dyn Bookkeeper>> {
    vec![
        Box::new(UsageCounter),
        Box::new(AnswerSimilarity::new(search_tools.iter().copied())),
    ]
}
