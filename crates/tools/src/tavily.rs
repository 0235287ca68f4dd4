//! Tavily search client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use twinsearch_core::error::ProviderError;
use twinsearch_core::search::{SearchHit, SearchProvider};

pub struct TavilyClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    max_results: usize,
    topic: String,
}

impl TavilyClient {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        max_results: usize,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            max_results,
            topic: "general".into(),
        }
    }

    /// Restrict results to a Tavily topic ("general", "news", ...).
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    topic: &'a str,
    search_depth: &'a str,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

#[async_trait]
impl SearchProvider for TavilyClient {
    fn name(&self) -> &str {
        "tavily"
    }

    fn max_results(&self) -> usize {
        self.max_results
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, ProviderError> {
        let url = format!("{}/search", self.api_url);
        let body = TavilyRequest {
            api_key: &self.api_key,
            query,
            max_results,
            topic: &self.topic,
            search_depth: "basic",
        };

        tracing::debug!(url = %url, max_results, "Sending Tavily search");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let message = response.text().await.unwrap_or_default();
            return Err(match status {
                401 | 403 => ProviderError::AuthenticationFailed(message),
                // 432 is Tavily's plan-quota status
                429 | 432 => ProviderError::RateLimited {
                    retry_after_secs: 60,
                },
                _ => ProviderError::ApiError {
                    status_code: status,
                    message,
                },
            });
        }

        let parsed: TavilyResponse = response.json().await.map_err(|e| {
            ProviderError::ApiError {
                status_code: status,
                message: format!("malformed Tavily response: {e}"),
            }
        })?;

        Ok(parsed
            .results
            .into_iter()
            .take(max_results)
            .map(|r| SearchHit {
                title: r.title,
                url: r.url,
                snippet: r.content,
            })
            .collect())
    }
}
