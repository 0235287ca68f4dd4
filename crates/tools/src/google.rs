//! Google Custom Search JSON API client.
//!
//! Needs both an API key and a programmable search engine id (`cx`). The API
//! caps `num` at 10 per request.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use twinsearch_core::error::ProviderError;
use twinsearch_core::search::{SearchHit, SearchProvider};

const MAX_NUM: usize = 10;

pub struct GoogleSearchClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    cse_id: String,
    num_results: usize,
}

impl GoogleSearchClient {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        cse_id: impl Into<String>,
        num_results: usize,
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
            cse_id: cse_id.into(),
            num_results,
        }
    }
}

#[derive(Deserialize)]
struct CseResponse {
    // Absent when the query has no results.
    #[serde(default)]
    items: Vec<CseItem>,
}

#[derive(Deserialize)]
struct CseItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

#[async_trait]
impl SearchProvider for GoogleSearchClient {
    fn name(&self) -> &str {
        "google"
    }

    fn max_results(&self) -> usize {
        self.num_results
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, ProviderError> {
        let url = format!("{}/customsearch/v1", self.api_url);
        let num = max_results.clamp(1, MAX_NUM).to_string();

        tracing::debug!(url = %url, num = %num, "Sending Google search");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.cse_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ])
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
                429 => ProviderError::RateLimited {
                    retry_after_secs: 60,
                },
                _ => ProviderError::ApiError {
                    status_code: status,
                    message,
                },
            });
        }

        let parsed: CseResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: status,
            message: format!("malformed Custom Search response: {e}"),
        })?;

        Ok(parsed
            .items
            .into_iter()
            .take(max_results)
            .map(|item| SearchHit {
                title: item.title,
                url: item.link,
                snippet: item.snippet,
            })
            .collect())
    }
}
