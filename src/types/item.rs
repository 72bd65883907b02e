//! Conversation items exchanged between the caller, agents and the model.

use serde::{Deserialize, Serialize};

/// A single piece of conversation content.
///
/// Items are immutable once created. A run accumulates new items separately
/// from the persisted history until they are committed to a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Item {
    UserMessage(MessageItem),
    AssistantMessage(MessageItem),
    ToolCall(ToolCallItem),
    ToolResult(ToolResultItem),
    Handoff(HandoffItem),
    ApprovalRequest(ApprovalRequestItem),
    Reasoning(ReasoningItem),
    /// Condensed stand-in for older history, produced by compaction.
    Summary(SummaryItem),
}

/// Text message from the user or an assistant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageItem {
    pub text: String,
    /// Agent that produced the message (assistant messages only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

/// A tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallItem {
    pub call_id: String,
    pub name: String,
    /// Raw arguments as emitted by the model. May be a JSON string when the
    /// backend did not decode them.
    pub arguments: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

/// The result paired with a [`ToolCallItem`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResultItem {
    pub call_id: String,
    pub tool_name: String,
    pub output: serde_json::Value,
    #[serde(default)]
    pub is_error: bool,
}

/// Marker recorded when control moves from one agent to another.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandoffItem {
    pub from_agent: String,
    pub to_agent: String,
    pub call_id: String,
}

/// Marker recorded when a tool call is suspended awaiting a human decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalRequestItem {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReasoningItem {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryItem {
    pub text: String,
    /// Number of items folded into this summary (including earlier summaries).
    pub summarized_items: usize,
}

impl Item {
    pub fn user(text: impl Into<String>) -> Self {
        Self::UserMessage(MessageItem {
            text: text.into(),
            agent: None,
        })
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::AssistantMessage(MessageItem {
            text: text.into(),
            agent: None,
        })
    }

    /// Assistant message attributed to an agent.
    pub fn assistant_from(agent: impl Into<String>, text: impl Into<String>) -> Self {
        Self::AssistantMessage(MessageItem {
            text: text.into(),
            agent: Some(agent.into()),
        })
    }

    pub fn tool_call(
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self::ToolCall(ToolCallItem {
            call_id: call_id.into(),
            name: name.into(),
            arguments,
            agent: None,
        })
    }

    pub fn tool_result(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        output: serde_json::Value,
        is_error: bool,
    ) -> Self {
        Self::ToolResult(ToolResultItem {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            output,
            is_error,
        })
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self::Reasoning(ReasoningItem { text: text.into() })
    }

    /// Text carried by message, reasoning and summary items.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::UserMessage(m) | Self::AssistantMessage(m) => Some(&m.text),
            Self::Reasoning(r) => Some(&r.text),
            Self::Summary(s) => Some(&s.text),
            Self::ToolCall(_)
            | Self::ToolResult(_)
            | Self::Handoff(_)
            | Self::ApprovalRequest(_) => None,
        }
    }

    /// Tool call id for call, result, handoff and approval items.
    pub fn call_id(&self) -> Option<&str> {
        match self {
            Self::ToolCall(c) => Some(&c.call_id),
            Self::ToolResult(r) => Some(&r.call_id),
            Self::Handoff(h) => Some(&h.call_id),
            Self::ApprovalRequest(a) => Some(&a.call_id),
            Self::UserMessage(_)
            | Self::AssistantMessage(_)
            | Self::Reasoning(_)
            | Self::Summary(_) => None,
        }
    }

    pub fn is_message(&self) -> bool {
        matches!(self, Self::UserMessage(_) | Self::AssistantMessage(_))
    }

    pub fn is_tool_item(&self) -> bool {
        matches!(
            self,
            Self::ToolCall(_) | Self::ToolResult(_) | Self::ApprovalRequest(_)
        )
    }

    pub fn is_summary(&self) -> bool {
        matches!(self, Self::Summary(_))
    }

    pub fn as_tool_call(&self) -> Option<&ToolCallItem> {
        match self {
            Self::ToolCall(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_tool_result(&self) -> Option<&ToolResultItem> {
        match self {
            Self::ToolResult(r) => Some(r),
            _ => None,
        }
    }
}

impl From<ToolCallItem> for Item {
    fn from(call: ToolCallItem) -> Self {
        Self::ToolCall(call)
    }
}

impl From<ToolResultItem> for Item {
    fn from(result: ToolResultItem) -> Self {
        Self::ToolResult(result)
    }
}

/// Text of all user and assistant messages in `items`, one per line.
pub fn items_text(items: &[Item]) -> String {
    items
        .iter()
        .filter(|item| item.is_message())
        .filter_map(Item::text)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Text of the last assistant message in `items`.
pub fn final_text(items: &[Item]) -> Option<&str> {
    items.iter().rev().find_map(|item| match item {
        Item::AssistantMessage(m) => Some(m.text.as_str()),
        _ => None,
    })
}

/// Tool calls in `items` that have no matching result.
pub fn unpaired_tool_calls(items: &[Item]) -> Vec<&ToolCallItem> {
    items
        .iter()
        .filter_map(Item::as_tool_call)
        .filter(|call| {
            !items
                .iter()
                .filter_map(Item::as_tool_result)
                .any(|result| result.call_id == call.call_id)
        })
        .collect()
}
