//! End-to-end tests for a twinsearch turn.
//!
//! The language model and both search APIs are served by one wiremock server,
//! so these exercise the real HTTP clients, the router and the bookkeeping
//! from question to rendered answer.

use std::process::Command;
use std::sync::{Arc, Mutex};

use twinsearch_agent::{Responder, Router, TurnOrchestrator};
use twinsearch_config::{AppConfig, DEFAULT_QUESTION, ProviderConfig};
use twinsearch_core::error::{ProviderError, ToolError};
use twinsearch_core::message::{Message, MessageToolCall, Role};
use twinsearch_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use twinsearch_core::search::SearchReport;
use twinsearch_core::tool::{Bookkeeper, ToolResult};
use twinsearch_core::Error;
use twinsearch_tools::{GOOGLE_TOOL, TAVILY_TOOL, UsageCounter, search_registry};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Wiremock stack ───────────────────────────────────────────────────────

fn config_for(server: &MockServer) -> AppConfig {
    let mut config = AppConfig {
        api_key: Some("sk-test".into()),
        ..AppConfig::default()
    };
    config.providers.insert(
        "openai".into(),
        ProviderConfig {
            api_key: None,
            api_url: Some(server.uri()),
        },
    );
    config.search.tavily.api_key = Some("tvly-test".into());
    config.search.tavily.api_url = server.uri();
    config.search.google.api_key = Some("g-test".into());
    config.search.google.cse_id = Some("cx-test".into());
    config.search.google.api_url = server.uri();
    config
}

fn orchestrator_for(server: &MockServer) -> TurnOrchestrator {
    let config = config_for(server);
    let provider = twinsearch_providers::build_from_config(&config).unwrap();
    TurnOrchestrator::from_config(&config, provider).unwrap()
}

fn chat_tool_calls(query: &str) -> serde_json::Value {
    let args = serde_json::json!({ "query": query }).to_string();
    serde_json::json!({
        "model": "gpt-4.1",
        "choices": [{
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [
                    {"id": "call_tavily", "type": "function",
                     "function": {"name": "tavily_search", "arguments": args}},
                    {"id": "call_google", "type": "function",
                     "function": {"name": "google_search", "arguments": args}}
                ]
            }
        }],
        "usage": {"prompt_tokens": 200, "completion_tokens": 40, "total_tokens": 240}
    })
}

fn chat_answer(text: &str) -> serde_json::Value {
    serde_json::json!({
        "model": "gpt-4.1",
        "choices": [{"message": {"role": "assistant", "content": text}}],
        "usage": {"prompt_tokens": 500, "completion_tokens": 60, "total_tokens": 560}
    })
}

/// First call asks for both searches; once tool results are in the request
/// the model answers.
async fn mount_llm(server: &MockServer, query: &str, answer: &str) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("tool_call_id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_answer(answer)))
        .with_priority(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_tool_calls(query)))
        .mount(server)
        .await;
}

async fn mount_tavily(server: &MockServer, content: &str) {
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "results": [
                {"title": "Tavily hit", "url": "https://tavily.test/1", "content": content}
            ]
        })))
        .mount(server)
        .await;
}

async fn mount_google(server: &MockServer, snippet: &str) {
    Mock::given(method("GET"))
        .and(path("/customsearch/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [
                {"title": "Google hit", "link": "https://google.test/1", "snippet": snippet}
            ]
        })))
        .mount(server)
        .await;
}

fn tool_messages_named<'a>(
    outcome: &'a twinsearch_agent::TurnOutcome,
    name: &str,
) -> Vec<&'a Message> {
    outcome
        .conversation
        .messages()
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter(|m| {
            m.tool_call_id
                .as_deref()
                .and_then(|id| outcome.conversation.request_for(id))
                .is_some_and(|tc| tc.name == name)
        })
        .collect()
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_both_sources_agree() {
    let server = MockServer::start().await;
    mount_llm(
        &server,
        "What is the capital of France?",
        "The capital of France is Paris. (Tavily: https://tavily.test/1, Google: https://google.test/1)",
    )
    .await;
    mount_tavily(&server, "Paris is the capital of France.").await;
    mount_google(&server, "Paris is the capital of France.").await;

    let outcome = orchestrator_for(&server)
        .run("What is the capital of France?")
        .await
        .unwrap();

    assert!(outcome.answer.contains("Paris"));
    assert_eq!(outcome.llm_tokens, 800);
    assert_eq!(tool_messages_named(&outcome, TAVILY_TOOL).len(), 1);
    assert_eq!(tool_messages_named(&outcome, GOOGLE_TOOL).len(), 1);
    assert_eq!(tool_messages_named(&outcome, "count_tokens").len(), 1);
    assert_eq!(tool_messages_named(&outcome, "answer_similarity").len(), 1);
    assert!(outcome.similarity.similarity_score > 0.3);
    assert!(outcome.conversation.verify_correlation().is_ok());

    let rendered = outcome.render();
    assert!(rendered.contains("Agent Tool (Tokens used: "));
    assert!(rendered.contains("LLM Details (Tokens used: 800)"));
    assert!(rendered.contains("The similarity of the two answers is "));
}

#[tokio::test]
async fn e2e_tavily_quota_exhausted() {
    let server = MockServer::start().await;
    mount_llm(
        &server,
        "What is the worlds largest dog breed?",
        "The English Mastiff (Google: https://google.test/1). Tavily returned no result.",
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(432).set_body_string("plan limit exceeded"))
        .mount(&server)
        .await;
    mount_google(&server, "The English Mastiff is the largest dog breed by mass.").await;

    let outcome = orchestrator_for(&server)
        .run("What is the worlds largest dog breed?")
        .await
        .unwrap();

    let tavily = tool_messages_named(&outcome, TAVILY_TOOL);
    let report: SearchReport = serde_json::from_str(&tavily[0].content).unwrap();
    assert!(!report.is_ok());
    assert!(report.text.starts_with("tavily returned no result"));

    let google = tool_messages_named(&outcome, GOOGLE_TOOL);
    let report: SearchReport = serde_json::from_str(&google[0].content).unwrap();
    assert!(report.is_ok());

    assert!(outcome.answer.contains("English Mastiff"));
    assert_eq!(tool_messages_named(&outcome, "answer_similarity").len(), 1);
}

#[tokio::test]
async fn e2e_direct_answer_skips_search() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_answer("Hello!")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/customsearch/v1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let outcome = orchestrator_for(&server).run("Hi").await.unwrap();

    assert_eq!(outcome.answer, "Hello!");
    assert_eq!(outcome.similarity.similarity_score, 0.0);
    assert_eq!(tool_messages_named(&outcome, "count_tokens").len(), 1);
    assert_eq!(tool_messages_named(&outcome, "answer_similarity").len(), 1);
}

#[tokio::test]
async fn e2e_blank_question_uses_default() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains(DEFAULT_QUESTION))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(chat_answer("The English Mastiff.")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let outcome = orchestrator_for(&server).run("").await.unwrap();
    assert_eq!(
        outcome.conversation.last_user_message().unwrap().content,
        DEFAULT_QUESTION
    );
}

#[tokio::test]
async fn e2e_unknown_tool_aborts_turn() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "model": "gpt-4.1",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "call_x", "type": "function",
                         "function": {"name": "count_tokens", "arguments": "{}"}}
                    ]
                }
            }]
        })))
        .mount(&server)
        .await;

    let err = orchestrator_for(&server).run("q").await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
}

#[tokio::test]
async fn e2e_llm_auth_failure_fails_turn() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let err = orchestrator_for(&server).run("q").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Provider(ProviderError::AuthenticationFailed(_))
    ));
}

// ── Bookkeeping failure (scripted model) ─────────────────────────────────

/// A mock provider that returns scripted responses in sequence.
struct ScriptedProvider {
    responses: Mutex<Vec<ProviderResponse>>,
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut responses = self.responses.lock().unwrap();
        assert!(!responses.is_empty(), "ScriptedProvider exhausted");
        Ok(responses.remove(0))
    }
}

fn scripted(messages: Vec<Message>) -> Arc<ScriptedProvider> {
    let responses = messages
        .into_iter()
        .map(|message| ProviderResponse {
            message,
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: "mock".into(),
        })
        .collect();
    Arc::new(ScriptedProvider {
        responses: Mutex::new(responses),
    })
}

struct CorruptLogBookkeeper;

impl Bookkeeper for CorruptLogBookkeeper {
    fn name(&self) -> &str {
        "answer_similarity"
    }

    fn run(&self, _log: &[Message]) -> Result<ToolResult, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: "answer_similarity".into(),
            reason: "malformed search result".into(),
        })
    }
}

#[tokio::test]
async fn e2e_bookkeeping_failure_is_fatal() {
    let server = MockServer::start().await;
    mount_tavily(&server, "x").await;
    mount_google(&server, "y").await;
    let config = config_for(&server);

    let provider = scripted(vec![
        Message::assistant("").with_tool_calls(vec![MessageToolCall {
            id: "c1".into(),
            name: TAVILY_TOOL.into(),
            arguments: r#"{"query":"q"}"#.into(),
        }]),
        Message::assistant("answer"),
    ]);
    let router = Router::new(
        Arc::new(search_registry(&config.search).unwrap()),
        vec![Box::new(UsageCounter), Box::new(CorruptLogBookkeeper)],
    );
    let orchestrator = TurnOrchestrator::new(Responder::new(provider, "mock"), router);

    let err = orchestrator.run("q").await.unwrap_err();
    assert!(matches!(err, Error::Bookkeeping { ref tool, .. } if tool == "answer_similarity"));
}

// ── Binary ───────────────────────────────────────────────────────────────

#[test]
fn cli_prints_default_config() {
    let output = Command::new(env!("CARGO_BIN_EXE_twinsearch"))
        .arg("--print-config")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("default_model"));
    assert!(stdout.contains("api.tavily.com"));
}

#[test]
fn cli_missing_credentials_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(&config_path, "default_model = \"gpt-4.1\"\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_twinsearch"))
        .arg("--config")
        .arg(&config_path)
        .arg("What is the capital of France?")
        .current_dir(dir.path())
        .env_remove("OPENAI_API_KEY")
        .env_remove("TWINSEARCH_API_KEY")
        .env_remove("TAVILY_API_KEY")
        .env_remove("GOOGLE_API_KEY")
        .env_remove("GOOGLE_CSE_ID")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("TAVILY_API_KEY"));
    assert!(stderr.contains("GOOGLE_CSE_ID"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cli_prints_answer_panel_and_verbose_usage() {
    let server = MockServer::start().await;
    mount_llm(
        &server,
        "What is the capital of France?",
        "The capital of France is Paris.",
    )
    .await;
    mount_tavily(&server, "Paris is the capital of France.").await;
    mount_google(&server, "Paris is the capital of France.").await;

    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(&config_path, toml::to_string(&config_for(&server)).unwrap()).unwrap();

    let output = tokio::task::spawn_blocking(move || {
        Command::new(env!("CARGO_BIN_EXE_twinsearch"))
            .arg("--config")
            .arg(&config_path)
            .arg("--verbose")
            .arg("What is the capital of France?")
            .current_dir(dir.path())
            .env_remove("TWINSEARCH_PROVIDER")
            .env_remove("TWINSEARCH_MODEL")
            .env_remove("RUST_LOG")
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "stderr: {stderr}");
    assert!(stdout.starts_with("╭─ Answer ─"));
    assert!(stdout.contains("The capital of France is Paris."));
    assert!(stdout.contains("LLM Details (Tokens used: 800)"));
    assert!(stderr.contains("Estimated token count for this interaction:"));
}
