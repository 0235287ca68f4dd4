//! The tool router.
//!
//! A turn moves through four phases:
//!
//! ```text
//! Generating ──ToolRequest──▶ DispatchingSearch ──▶ Generating
//!     │
//!     └──FinalAnswer──▶ DispatchingBookkeeping ──▶ Done
//! ```
//!
//! A final answer never ends the turn directly: bookkeeping always runs
//! first, exactly once. Search results are correlated to their requests by
//! id through [`PendingCalls`], never by position.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, info, warn};
use twinsearch_core::Error;
use twinsearch_core::event::{DomainEvent, EventBus};
use twinsearch_core::message::{Conversation, Message, MessageToolCall, ROUTER_FORCED_KEY};
use twinsearch_core::provider::ToolDefinition;
use twinsearch_core::search::SearchReport;
use twinsearch_core::tool::{Bookkeeper, ToolCall, ToolRegistry, ToolResult};

use crate::responder::ResponderOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Generating,
    DispatchingSearch,
    DispatchingBookkeeping,
    Done,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Generating => "generating",
            Self::DispatchingSearch => "dispatching_search",
            Self::DispatchingBookkeeping => "dispatching_bookkeeping",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Requests awaiting a result, keyed by request id.
#[derive(Debug, Default)]
pub struct PendingCalls {
    calls: HashMap<String, ToolCall>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a request. Reusing an id that is still pending is a protocol
    /// violation.
    pub fn register(&mut self, call: ToolCall) -> Result<(), Error> {
        if self.calls.contains_key(&call.id) {
            return Err(Error::Protocol(format!(
                "duplicate tool request id '{}'",
                call.id
            )));
        }
        self.calls.insert(call.id.clone(), call);
        Ok(())
    }

    /// Consume the request a result answers.
    pub fn resolve(&mut self, id: &str) -> Result<ToolCall, Error> {
        self.calls
            .remove(id)
            .ok_or_else(|| Error::Protocol(format!("result for unknown request id '{id}'")))
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

/// A bookkeeper's output, tagged with the bookkeeper's name.
#[derive(Debug, Clone)]
pub struct BookkeepingResult {
    pub tool: String,
    pub result: ToolResult,
}

pub struct Router {
    tools: Arc<ToolRegistry>,
    bookkeepers: Vec<Box<dyn Bookkeeper>>,
    event_bus: Arc<EventBus>,
}

impl Router {
    pub fn new(tools: Arc<ToolRegistry>, bookkeepers: Vec<Box<dyn Bookkeeper>>) -> Self {
        Self {
            tools,
            bookkeepers,
            event_bus: Arc::new(EventBus::default()),
        }
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// The search roster offered to the model.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.definitions()
    }

    /// The phase transition function.
    ///
    /// `output` is the latest Responder output; only `Generating` looks
    /// at it.
    pub fn next(phase: TurnPhase, output: &ResponderOutput) -> TurnPhase {
        match phase {
            TurnPhase::Generating if output.is_tool_request() => TurnPhase::DispatchingSearch,
            TurnPhase::Generating => TurnPhase::DispatchingBookkeeping,
            TurnPhase::DispatchingSearch => TurnPhase::Generating,
            TurnPhase::DispatchingBookkeeping | TurnPhase::Done => TurnPhase::Done,
        }
    }

    /// Run every requested search concurrently and append the results in
    /// request order as one batch.
    ///
    /// The assistant message carrying `calls` must already be in the log.
    /// A request for a tool outside the roster aborts the turn.
    pub async fn dispatch_search(
        &self,
        conversation: &mut Conversation,
        calls: Vec<ToolCall>,
    ) -> Result<(), Error> {
        let fallback_query = conversation
            .last_user_message()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let mut pending = PendingCalls::new();
        let mut ordered = Vec::with_capacity(calls.len());
        for mut call in calls {
            if !self.tools.contains(&call.name) {
                return Err(Error::Protocol(format!(
                    "model requested unknown tool '{}'",
                    call.name
                )));
            }
            fill_query(&mut call, &fallback_query);
            ordered.push(call.clone());
            pending.register(call)?;
        }

        info!(count = ordered.len(), "Dispatching searches");

        let runs = ordered.iter().map(|call| async move {
            let start = Instant::now();
            let result = self.tools.execute(call).await;
            (call, result, start.elapsed().as_millis() as u64)
        });

        let mut batch = Vec::with_capacity(ordered.len());
        for (call, result, duration_ms) in join_all(runs).await {
            let result = match result {
                Ok(result) => result,
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "Search tool failed");
                    let (provider, k) = self
                        .tools
                        .get(&call.name)
                        .and_then(|tool| tool.search_origin())
                        .unwrap_or((call.name.as_str(), 0));
                    failed_search(call, provider, k, &e.to_string())?
                }
            };

            self.event_bus.publish(DomainEvent::ToolExecuted {
                tool_name: call.name.clone(),
                success: result.success,
                duration_ms,
                timestamp: chrono::Utc::now(),
            });

            let request = pending.resolve(&result.call_id)?;
            batch.push(Message::tool_result(request.id, result.output));
        }

        if !pending.is_empty() {
            return Err(Error::Protocol(format!(
                "{} search request(s) left unanswered",
                pending.len()
            )));
        }

        conversation.extend(batch);
        Ok(())
    }

    /// Run every bookkeeper once over the log as it stands, then append a
    /// router-authored request followed by all results.
    ///
    /// Any bookkeeper error fails the turn.
    pub fn dispatch_bookkeeping(
        &self,
        conversation: &mut Conversation,
    ) -> Result<Vec<BookkeepingResult>, Error> {
        let snapshot = conversation.messages();

        let mut requests = Vec::with_capacity(self.bookkeepers.len());
        let mut results = Vec::with_capacity(self.bookkeepers.len());
        for bookkeeper in &self.bookkeepers {
            let name = bookkeeper.name().to_string();
            let id = format!("call_{}", uuid::Uuid::new_v4().simple());

            let start = Instant::now();
            let outcome = bookkeeper.run(snapshot);
            let duration_ms = start.elapsed().as_millis() as u64;

            self.event_bus.publish(DomainEvent::ToolExecuted {
                tool_name: name.clone(),
                success: outcome.is_ok(),
                duration_ms,
                timestamp: chrono::Utc::now(),
            });

            let mut result = outcome.map_err(|source| Error::Bookkeeping {
                tool: name.clone(),
                source,
            })?;
            result.call_id = id.clone();

            debug!(tool = %name, duration_ms, "Bookkeeping complete");
            requests.push(MessageToolCall {
                id,
                name: name.clone(),
                arguments: "{}".into(),
            });
            results.push(BookkeepingResult { tool: name, result });
        }

        let forced = Message::assistant("")
            .with_tool_calls(requests)
            .with_metadata(ROUTER_FORCED_KEY, serde_json::Value::Bool(true));

        let mut batch = Vec::with_capacity(results.len() + 1);
        batch.push(forced);
        batch.extend(
            results
                .iter()
                .map(|r| Message::tool_result(r.result.call_id.clone(), r.result.output.clone())),
        );
        conversation.extend(batch);

        Ok(results)
    }
}

/// Use the user's question when the model omitted the query.
fn fill_query(call: &mut ToolCall, fallback: &str) {
    let has_query = call
        .arguments
        .get("query")
        .and_then(|q| q.as_str())
        .is_some_and(|q| !q.trim().is_empty());
    if has_query {
        return;
    }

    debug!(tool = %call.name, "No query in request, using the user's question");
    match call.arguments.as_object_mut() {
        Some(args) => {
            args.insert("query".into(), serde_json::Value::String(fallback.into()));
        }
        None => call.arguments = serde_json::json!({ "query": fallback }),
    }
}

/// A failure report for a search tool that errored before producing one.
fn failed_search(
    call: &ToolCall,
    provider: &str,
    k: usize,
    reason: &str,
) -> Result<ToolResult, Error> {
    let report = SearchReport::failed(provider, k, reason);
    Ok(ToolResult {
        call_id: call.id.clone(),
        success: false,
        output: serde_json::to_string_pretty(&report)?,
        data: Some(serde_json::to_value(&report)?),
    })
}
