//! Message and Conversation domain types.
//!
//! These are the value objects that flow through a turn:
//! the user asks → the Responder answers or requests tools → tool results
//! are appended → the Responder answers → bookkeeping is appended.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata key marking assistant messages authored by the router rather
/// than the model.
pub const ROUTER_FORCED_KEY: &str = "router_forced";

/// Unique identifier for a conversation (one turn's log).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The language model (or the router acting on its behalf)
    Assistant,
    /// System instructions
    System,
    /// Tool execution result
    Tool,
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content (tool results carry JSON here)
    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Optional metadata (provider info, router annotations, etc.)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    fn with_role(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content.into())
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content.into())
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content.into())
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::with_role(Role::Tool, content.into());
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// Attach tool call requests (assistant messages only).
    pub fn with_tool_calls(mut self, tool_calls: Vec<MessageToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Whether this assistant message was authored by the router.
    pub fn is_router_forced(&self) -> bool {
        self.metadata
            .get(ROUTER_FORCED_KEY)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Unique ID for this tool call
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as JSON string
    pub arguments: String,
}

/// The append-only log of one turn.
///
/// Insertion order is chronological order. Messages can be appended one at a
/// time or as an atomic batch, and are never edited or removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    messages: Vec<Message>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last message was added
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// Append a batch of messages in one step.
    pub fn extend(&mut self, batch: impl IntoIterator<Item = Message>) {
        self.updated_at = Utc::now();
        self.messages.extend(batch);
    }

    /// The log, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The most recent user-originated message.
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }

    /// The turn's answer: the last model-authored assistant message that
    /// does not defer to tools.
    pub fn last_answer(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| {
            m.role == Role::Assistant && m.tool_calls.is_empty() && !m.is_router_forced()
        })
    }

    /// The assistant tool call that `tool_call_id` answers, if any.
    pub fn request_for(&self, tool_call_id: &str) -> Option<&MessageToolCall> {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .flat_map(|m| m.tool_calls.iter())
            .find(|tc| tc.id == tool_call_id)
    }

    /// Check that every tool message answers a request emitted earlier in
    /// the log, and that no request is answered twice.
    pub fn verify_correlation(&self) -> std::result::Result<(), String> {
        let mut requested: HashSet<&str> = HashSet::new();
        let mut answered: HashSet<&str> = HashSet::new();

        for (index, msg) in self.messages.iter().enumerate() {
            match msg.role {
                Role::Assistant => {
                    requested.extend(msg.tool_calls.iter().map(|tc| tc.id.as_str()));
                }
                Role::Tool => {
                    let Some(call_id) = msg.tool_call_id.as_deref() else {
                        return Err(format!("tool message #{index} has no tool_call_id"));
                    };
                    if !requested.contains(call_id) {
                        return Err(format!(
                            "tool message #{index} answers unknown request '{call_id}'"
                        ));
                    }
                    if !answered.insert(call_id) {
                        return Err(format!("request '{call_id}' answered more than once"));
                    }
                }
                Role::System | Role::User => {}
            }
        }
        Ok(())
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
