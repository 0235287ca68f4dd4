//! Scripted providers and search backends shared by the agent tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use twinsearch_core::error::ProviderError;
use twinsearch_core::message::{Message, MessageToolCall};
use twinsearch_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use twinsearch_core::search::{SearchHit, SearchProvider};
use twinsearch_core::tool::ToolRegistry;
use twinsearch_tools::{GOOGLE_TOOL, SearchTool, TAVILY_TOOL};

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and
/// records the request it was given. Panics if the script runs out.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, index: usize) -> ProviderRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let index = requests.len();
        assert!(
            index < responses.len(),
            "SequentialMockProvider: no more responses (call #{index})"
        );
        requests.push(request);
        Ok(responses[index].clone())
    }
}

pub struct FailingProvider;

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::AuthenticationFailed("invalid api key".into()))
    }
}

fn usage(total: u32) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: total - 5,
        completion_tokens: 5,
        total_tokens: total,
    })
}

/// A final answer costing 15 tokens.
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: usage(15),
        model: "mock-model".into(),
    }
}

/// A tool request costing 20 tokens.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant("").with_tool_calls(tool_calls),
        usage: usage(20),
        model: "mock-model".into(),
    }
}

pub fn make_tool_call(id: &str, name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: id.into(),
        name: name.into(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}

/// A search backend with a fixed outcome that records the queries it saw.
pub struct FixedSearch {
    name: &'static str,
    k: usize,
    outcome: Result<Vec<SearchHit>, ProviderError>,
    pub queries: Mutex<Vec<String>>,
}

impl FixedSearch {
    pub fn answering(name: &'static str, k: usize, snippet: &str) -> Arc<Self> {
        Arc::new(Self {
            name,
            k,
            outcome: Ok(vec![SearchHit {
                title: format!("{name} result"),
                url: format!("https://{name}.test/1"),
                snippet: snippet.into(),
            }]),
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(name: &'static str, k: usize, error: ProviderError) -> Arc<Self> {
        Arc::new(Self {
            name,
            k,
            outcome: Err(error),
            queries: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl SearchProvider for FixedSearch {
    fn name(&self) -> &str {
        self.name
    }

    fn max_results(&self) -> usize {
        self.k
    }

    async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<SearchHit>, ProviderError> {
        self.queries.lock().unwrap().push(query.to_string());
        self.outcome.clone()
    }
}

/// The two-tool search roster over the given backends.
pub fn search_roster(tavily: Arc<FixedSearch>, google: Arc<FixedSearch>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(SearchTool::new(TAVILY_TOOL, "Tavily search", tavily)));
    registry.register(Box::new(SearchTool::new(GOOGLE_TOOL, "Google search", google)));
    registry
}
