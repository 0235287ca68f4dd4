//! The Responder: one language-model step over the conversation log.

use std::sync::Arc;

use tracing::debug;
use twinsearch_core::Error;
use twinsearch_core::message::{Conversation, Message};
use twinsearch_core::provider::{Provider, ProviderRequest, ToolDefinition, Usage};
use twinsearch_core::tool::ToolCall;

/// What the model decided to do.
#[derive(Debug, Clone)]
pub enum ResponderOutput {
    /// A terminal answer for the user.
    FinalAnswer { message: Message },

    /// A deferral to tools. `calls` mirrors `message.tool_calls`, parsed.
    ToolRequest { message: Message, calls: Vec<ToolCall> },
}

impl ResponderOutput {
    /// The assistant message to append to the log.
    pub fn message(&self) -> &Message {
        match self {
            Self::FinalAnswer { message } | Self::ToolRequest { message, .. } => message,
        }
    }

    pub fn is_tool_request(&self) -> bool {
        matches!(self, Self::ToolRequest { .. })
    }

    /// Drop any tool calls and treat the message as an answer.
    pub fn into_final_answer(self) -> Self {
        match self {
            Self::FinalAnswer { .. } => self,
            Self::ToolRequest { mut message, .. } => {
                message.tool_calls.clear();
                Self::FinalAnswer { message }
            }
        }
    }
}

/// A Responder step plus what the backend reported about it.
#[derive(Debug, Clone)]
pub struct Response {
    pub output: ResponderOutput,
    pub usage: Option<Usage>,
    pub model: String,
}

pub struct Responder {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools: Vec<ToolDefinition>,
}

impl Responder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            tools: Vec::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// The tools offered to the model on every step.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Ask the model for the next step.
    ///
    /// Tool-call arguments that are not valid JSON are a protocol violation.
    pub async fn respond(&self, conversation: &Conversation) -> Result<Response, Error> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: conversation.messages().to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: self.tools.clone(),
        };

        let response = self.provider.complete(request).await?;
        let message = response.message;

        let output = if message.tool_calls.is_empty() {
            ResponderOutput::FinalAnswer { message }
        } else {
            let calls = message
                .tool_calls
                .iter()
                .map(ToolCall::from_message_call)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| Error::Protocol(format!("malformed tool request: {e}")))?;
            ResponderOutput::ToolRequest { message, calls }
        };

        debug!(
            provider = self.provider.name(),
            tool_request = output.is_tool_request(),
            "Responder step complete"
        );

        Ok(Response {
            output,
            usage: response.usage,
            model: response.model,
        })
    }
}
