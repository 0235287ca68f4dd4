//! Usage accounting over a turn's log.

use serde::{Deserialize, Serialize};
use twinsearch_core::error::ToolError;
use twinsearch_core::message::Message;
use twinsearch_core::tool::{Bookkeeper, ToolResult};

pub const TOOL_NAME: &str = "count_tokens";

/// Roughly four characters per token for English text.
const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UsageReport {
    pub character_count: usize,
    pub token_estimate: usize,
    pub response_count: usize,
}

impl UsageReport {
    pub fn summary(&self) -> String {
        format!(
            "Estimated token count for this interaction: {} tokens (based on {} characters). \
             Number of responses in this interaction: {}.",
            self.token_estimate, self.character_count, self.response_count
        )
    }
}

/// Count characters (Unicode scalar values) across every message content.
pub fn count_usage(log: &[Message]) -> UsageReport {
    let character_count: usize = log.iter().map(|m| m.content.chars().count()).sum();
    UsageReport {
        character_count,
        token_estimate: character_count / CHARS_PER_TOKEN,
        response_count: log.len(),
    }
}

pub struct UsageCounter;

impl Bookkeeper for UsageCounter {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn run(&self, log: &[Message]) -> Result<ToolResult, ToolError> {
        let report = count_usage(log);
        tracing::debug!(
            characters = report.character_count,
            tokens = report.token_estimate,
            responses = report.response_count,
            "Counted turn usage"
        );

        let data = serde_json::to_value(report).map_err(|e| ToolError::ExecutionFailed {
            tool_name: TOOL_NAME.into(),
            reason: e.to_string(),
        })?;
        let output = serde_json::to_string_pretty(&data).map_err(|e| ToolError::ExecutionFailed {
            tool_name: TOOL_NAME.into(),
            reason: e.to_string(),
        })?;

        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output,
            data: Some(data),
        })
    }
}
