//! Drives one turn from question to rendered answer.

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, info, warn};
use twinsearch_config::{AppConfig, DEFAULT_QUESTION};
use twinsearch_core::Error;
use twinsearch_core::event::{DomainEvent, EventBus};
use twinsearch_core::message::{Conversation, Message};
use twinsearch_core::provider::Provider;
use twinsearch_tools::{
    GOOGLE_TOOL, SimilarityReport, TAVILY_TOOL, UsageReport, default_bookkeepers, search_registry,
    similarity, usage,
};

use crate::responder::{Responder, ResponderOutput};
use crate::router::{BookkeepingResult, Router, TurnPhase};

/// Everything a finished turn produced.
///
/// The diagnostics stay structured here; only [`TurnOutcome::render`] mixes
/// them into the answer text.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub conversation: Conversation,
    pub answer: String,
    pub usage: UsageReport,
    pub similarity: SimilarityReport,
    /// Total tokens the language model reported across the turn.
    pub llm_tokens: u32,
}

impl TurnOutcome {
    pub fn render(&self) -> String {
        let mut out = self.answer.trim_end().to_string();
        out.push_str("\n\n");
        let _ = writeln!(
            out,
            "Agent Tool (Tokens used: {}, Characters used: {})",
            self.usage.token_estimate, self.usage.character_count
        );
        let _ = writeln!(out, "LLM Details (Tokens used: {})", self.llm_tokens);
        let _ = write!(
            out,
            "The similarity of the two answers is {}% (similarity score: {:.4})",
            self.similarity.similarity_percentage, self.similarity.similarity_score
        );
        out
    }
}

pub struct TurnOrchestrator {
    responder: Responder,
    router: Router,
    event_bus: Arc<EventBus>,
    system_prompt: String,
    default_question: String,
}

impl TurnOrchestrator {
    /// The responder is offered exactly the router's search roster.
    pub fn new(responder: Responder, router: Router) -> Self {
        let responder = responder.with_tools(router.tool_definitions());
        let event_bus = router.event_bus().clone();
        Self {
            responder,
            router,
            event_bus,
            system_prompt: AppConfig::default().system_prompt,
            default_question: DEFAULT_QUESTION.into(),
        }
    }

    /// Wire the production roster: both search adapters plus the usage and
    /// similarity bookkeepers.
    pub fn from_config(config: &AppConfig, provider: Arc<dyn Provider>) -> Result<Self, Error> {
        let tools = search_registry(&config.search).map_err(|e| Error::Config {
            message: e.to_string(),
        })?;
        let router = Router::new(
            Arc::new(tools),
            default_bookkeepers(&[TAVILY_TOOL, GOOGLE_TOOL]),
        );
        let responder = Responder::new(provider, &config.default_model)
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens);

        Ok(Self::new(responder, router)
            .with_system_prompt(&config.system_prompt)
            .with_default_question(&config.default_question))
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// The question asked when the user gives a blank one.
    pub fn with_default_question(mut self, question: impl Into<String>) -> Self {
        self.default_question = question.into();
        self
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Answer one question.
    pub async fn run(&self, question: &str) -> Result<TurnOutcome, Error> {
        let question = match question.trim() {
            "" => self.default_question.clone(),
            q => q.to_string(),
        };

        let mut conversation = Conversation::new();
        let conversation_id = conversation.id.to_string();
        info!(conversation_id = %conversation_id, question = %question, "Starting turn");
        self.event_bus.publish(DomainEvent::TurnStarted {
            conversation_id: conversation_id.clone(),
            question: question.clone(),
            timestamp: chrono::Utc::now(),
        });

        conversation.extend([Message::system(&self.system_prompt), Message::user(question)]);

        match self.drive(conversation).await {
            Ok(outcome) => {
                info!(
                    conversation_id = %conversation_id,
                    messages = outcome.conversation.len(),
                    llm_tokens = outcome.llm_tokens,
                    "Turn complete"
                );
                Ok(outcome)
            }
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "Turn failed");
                self.event_bus.publish(DomainEvent::TurnFailed {
                    conversation_id,
                    error_message: e.to_string(),
                    timestamp: chrono::Utc::now(),
                });
                Err(e)
            }
        }
    }

    async fn drive(&self, mut conversation: Conversation) -> Result<TurnOutcome, Error> {
        let conversation_id = conversation.id.to_string();
        let mut phase = TurnPhase::Generating;
        let mut last: Option<ResponderOutput> = None;
        let mut searched = false;
        let mut llm_tokens = 0u32;
        let mut bookkeeping = Vec::new();

        while phase != TurnPhase::Done {
            match phase {
                TurnPhase::Generating => {
                    let response = self.responder.respond(&conversation).await?;
                    if let Some(usage) = response.usage {
                        llm_tokens += usage.total_tokens;
                        self.event_bus.publish(DomainEvent::ResponseGenerated {
                            conversation_id: conversation_id.clone(),
                            model: response.model.clone(),
                            tokens_used: usage.total_tokens,
                            timestamp: chrono::Utc::now(),
                        });
                    }

                    let mut output = response.output;
                    if searched && output.is_tool_request() {
                        warn!(
                            conversation_id = %conversation_id,
                            "Model asked for a second search round; treating its message as the answer"
                        );
                        output = output.into_final_answer();
                    }
                    conversation.push(output.message().clone());
                    last = Some(output);
                }
                TurnPhase::DispatchingSearch => {
                    let Some(ResponderOutput::ToolRequest { calls, .. }) = &last else {
                        return Err(Error::Internal("search phase without a tool request".into()));
                    };
                    self.router
                        .dispatch_search(&mut conversation, calls.clone())
                        .await?;
                    searched = true;
                }
                TurnPhase::DispatchingBookkeeping => {
                    bookkeeping = self.router.dispatch_bookkeeping(&mut conversation)?;
                }
                TurnPhase::Done => {}
            }

            let output = last
                .as_ref()
                .ok_or_else(|| Error::Internal("no responder output".into()))?;
            let next = Router::next(phase, output);
            debug!(conversation_id = %conversation_id, from = %phase, to = %next, "Phase change");
            self.event_bus.publish(DomainEvent::PhaseChanged {
                conversation_id: conversation_id.clone(),
                from: phase.to_string(),
                to: next.to_string(),
                timestamp: chrono::Utc::now(),
            });
            phase = next;
        }

        conversation.verify_correlation().map_err(Error::Protocol)?;

        let answer = conversation
            .last_answer()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let usage: UsageReport = bookkeeping_report(&bookkeeping, usage::TOOL_NAME)?;
        let similarity: SimilarityReport = bookkeeping_report(&bookkeeping, similarity::TOOL_NAME)?;

        Ok(TurnOutcome {
            conversation,
            answer,
            usage,
            similarity,
            llm_tokens,
        })
    }
}

fn bookkeeping_report<T: serde::de::DeserializeOwned>(
    results: &[BookkeepingResult],
    tool: &str,
) -> Result<T, Error> {
    let entry = results
        .iter()
        .find(|r| r.tool == tool)
        .ok_or_else(|| Error::Internal(format!("bookkeeper '{tool}' did not run")))?;
    Ok(serde_json::from_str(&entry.result.output)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use twinsearch_core::error::ProviderError;
    use twinsearch_core::message::Role;
    use twinsearch_core::search::SearchReport;

    fn orchestrator(
        provider: Arc<SequentialMockProvider>,
        tavily: Arc<FixedSearch>,
        google: Arc<FixedSearch>,
    ) -> TurnOrchestrator {
        let router = Router::new(
            Arc::new(search_roster(tavily, google)),
            default_bookkeepers(&[TAVILY_TOOL, GOOGLE_TOOL]),
        );
        TurnOrchestrator::new(Responder::new(provider, "mock-model"), router)
            .with_system_prompt("Use both search tools.")
    }

    fn both_searches(query: &str) -> Vec<twinsearch_core::message::MessageToolCall> {
        vec![
            make_tool_call("c_tavily", TAVILY_TOOL, serde_json::json!({ "query": query })),
            make_tool_call("c_google", GOOGLE_TOOL, serde_json::json!({ "query": query })),
        ]
    }

    fn count_tool_results(outcome: &TurnOutcome, id_prefix: &str) -> usize {
        outcome
            .conversation
            .messages()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .filter(|m| {
                let id = m.tool_call_id.as_deref().unwrap_or_default();
                outcome
                    .conversation
                    .request_for(id)
                    .is_some_and(|tc| tc.name.starts_with(id_prefix))
            })
            .count()
    }

    #[tokio::test]
    async fn full_turn_with_both_searches() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(both_searches("capital of France")),
            make_text_response("The capital of France is Paris."),
        ]));
        let orch = orchestrator(
            provider.clone(),
            FixedSearch::answering("tavily", 2, "Paris is the capital of France."),
            FixedSearch::answering("google", 5, "Paris is the capital of France."),
        );

        let outcome = orch.run("What is the capital of France?").await.unwrap();

        assert_eq!(outcome.answer, "The capital of France is Paris.");
        assert_eq!(outcome.llm_tokens, 35);
        assert_eq!(provider.call_count(), 2);
        // The second generation sees both search results.
        assert_eq!(provider.request(1).messages.len(), 5);

        assert_eq!(count_tool_results(&outcome, "count_tokens"), 1);
        assert_eq!(count_tool_results(&outcome, "answer_similarity"), 1);
        assert_eq!(count_tool_results(&outcome, "tavily"), 1);
        assert_eq!(count_tool_results(&outcome, "google"), 1);

        // Bookkeeping comes after every search result.
        let msgs = outcome.conversation.messages();
        let last_search = msgs
            .iter()
            .rposition(|m| m.tool_call_id.as_deref() == Some("c_google"))
            .unwrap();
        let forced = msgs.iter().position(|m| m.is_router_forced()).unwrap();
        assert!(forced > last_search);

        assert!(outcome.similarity.similarity_score > 0.0);
        let chars: usize = msgs[..forced].iter().map(|m| m.content.chars().count()).sum();
        assert_eq!(outcome.usage.character_count, chars);
        assert_eq!(outcome.usage.token_estimate, chars / 4);
    }

    #[tokio::test]
    async fn direct_answer_still_runs_bookkeeping() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_text_response(
            "Hello!",
        )]));
        let orch = orchestrator(
            provider,
            FixedSearch::answering("tavily", 2, "x"),
            FixedSearch::answering("google", 5, "y"),
        );

        let outcome = orch.run("Hi").await.unwrap();
        assert_eq!(outcome.answer, "Hello!");
        assert_eq!(outcome.similarity.similarity_score, 0.0);
        assert_eq!(outcome.usage.response_count, 3);
        assert_eq!(count_tool_results(&outcome, "count_tokens"), 1);
        assert_eq!(count_tool_results(&outcome, "answer_similarity"), 1);
    }

    #[tokio::test]
    async fn blank_question_uses_default() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_text_response(
            "The English Mastiff.",
        )]));
        let orch = orchestrator(
            provider.clone(),
            FixedSearch::answering("tavily", 2, "x"),
            FixedSearch::answering("google", 5, "y"),
        );

        let outcome = orch.run("   ").await.unwrap();
        assert_eq!(
            outcome.conversation.last_user_message().unwrap().content,
            DEFAULT_QUESTION
        );
        assert_eq!(provider.request(0).messages[1].content, DEFAULT_QUESTION);
    }

    #[tokio::test]
    async fn provider_failure_is_encoded_and_turn_completes() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(both_searches("largest dog breed")),
            make_text_response("Google says the English Mastiff; Tavily was unavailable."),
        ]));
        let orch = orchestrator(
            provider,
            FixedSearch::failing("tavily", 2, ProviderError::RateLimited { retry_after_secs: 60 }),
            FixedSearch::answering("google", 5, "The English Mastiff is the largest breed."),
        );

        let outcome = orch.run("largest dog breed").await.unwrap();
        let msgs = outcome.conversation.messages();
        let tavily_msg = msgs
            .iter()
            .find(|m| m.tool_call_id.as_deref() == Some("c_tavily"))
            .unwrap();
        let report: SearchReport = serde_json::from_str(&tavily_msg.content).unwrap();
        assert!(!report.is_ok());
        assert!(!report.text.is_empty());
        assert_eq!(count_tool_results(&outcome, "answer_similarity"), 1);
    }

    #[tokio::test]
    async fn second_search_round_is_dropped() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(both_searches("q")),
            make_tool_call_response(vec![make_tool_call(
                "c_again",
                TAVILY_TOOL,
                serde_json::json!({"query": "q again"}),
            )]),
        ]));
        let orch = orchestrator(
            provider.clone(),
            FixedSearch::answering("tavily", 2, "x"),
            FixedSearch::answering("google", 5, "y"),
        );

        let outcome = orch.run("q").await.unwrap();
        assert_eq!(provider.call_count(), 2);
        assert!(outcome.conversation.request_for("c_again").is_none());
        assert_eq!(count_tool_results(&outcome, "tavily"), 1);
        assert_eq!(count_tool_results(&outcome, "count_tokens"), 1);
    }

    #[tokio::test]
    async fn unknown_tool_fails_turn_and_publishes_event() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_tool_call_response(
            vec![make_tool_call("c1", "answer_similarity", serde_json::json!({}))],
        )]));
        let orch = orchestrator(
            provider,
            FixedSearch::answering("tavily", 2, "x"),
            FixedSearch::answering("google", 5, "y"),
        );
        let mut events = orch.event_bus().subscribe();

        let err = orch.run("q").await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));

        let mut saw_failure = false;
        while let Ok(event) = events.try_recv() {
            if matches!(*event, DomainEvent::TurnFailed { .. }) {
                saw_failure = true;
            }
        }
        assert!(saw_failure);
    }

    #[tokio::test]
    async fn publishes_phase_changes_in_order() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(both_searches("q")),
            make_text_response("a"),
        ]));
        let orch = orchestrator(
            provider,
            FixedSearch::answering("tavily", 2, "x"),
            FixedSearch::answering("google", 5, "y"),
        );
        let mut events = orch.event_bus().subscribe();

        orch.run("q").await.unwrap();

        let mut phases = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let DomainEvent::PhaseChanged { to, .. } = &*event {
                phases.push(to.clone());
            }
        }
        assert_eq!(
            phases,
            vec![
                "dispatching_search",
                "generating",
                "dispatching_bookkeeping",
                "done"
            ]
        );
    }

    #[test]
    fn render_appends_footer() {
        let outcome = TurnOutcome {
            conversation: Conversation::new(),
            answer: "The English Mastiff.\n".into(),
            usage: UsageReport {
                character_count: 400,
                token_estimate: 100,
                response_count: 7,
            },
            similarity: SimilarityReport {
                text1: "a".into(),
                text2: "b".into(),
                similarity_score: 0.4253,
                similarity_percentage: 42.53,
            },
            llm_tokens: 812,
        };

        let rendered = outcome.render();
        assert!(rendered.starts_with("The English Mastiff.\n\n"));
        assert!(rendered.contains("Agent Tool (Tokens used: 100, Characters used: 400)"));
        assert!(rendered.contains("LLM Details (Tokens used: 812)"));
        assert!(
            rendered.ends_with("The similarity of the two answers is 42.53% (similarity score: 0.4253)")
        );
    }
}
