//! Model response and streaming event types.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::item::{Item, ToolCallItem};
use super::usage::Usage;

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolCalls,
    MaxTokens,
    ContentFilter,
}

/// A complete model response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelResponse {
    pub items: Vec<Item>,
    #[serde(default)]
    pub usage: Usage,
    pub stop_reason: StopReason,
}

impl ModelResponse {
    /// A response consisting of a single assistant message.
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            items: vec![Item::assistant(text)],
            usage: Usage::default(),
            stop_reason: StopReason::EndTurn,
        }
    }

    /// A response consisting of tool calls only.
    pub fn tool_calls(calls: Vec<ToolCallItem>) -> Self {
        Self {
            items: calls.into_iter().map(Item::ToolCall).collect(),
            usage: Usage::default(),
            stop_reason: StopReason::ToolCalls,
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    pub fn tool_call_items(&self) -> impl Iterator<Item = &ToolCallItem> {
        self.items.iter().filter_map(Item::as_tool_call)
    }
}

/// Incremental event emitted by a streaming model call.
///
/// A well-formed stream ends with exactly one `Done` carrying the same shape a
/// non-streaming call would have returned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelStreamEvent {
    TextDelta { text: String },
    ReasoningDelta { text: String },
    ToolCallStarted { call_id: String, name: String },
    ToolCallCompleted { call: ToolCallItem },
    Done { response: ModelResponse },
}
