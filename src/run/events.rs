//! Run event stream types.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::guardrail::GuardrailRejection;
use crate::types::{Item, ModelStreamEvent, ToolCallItem};

/// Callback used for streaming run events.
pub type RunEventSink = Arc<dyn Fn(RunEvent) + Send + Sync>;

/// Stream category for events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunEventStream {
    Lifecycle,
    Assistant,
    Reasoning,
    Tool,
    Agent,
    Approval,
    Guardrail,
}

/// Run lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RunLifecycle {
    Started,
    Resumed,
    NeedsApproval,
    Completed,
    Failed { error: String },
    Cancelled,
}

/// Concrete event payloads emitted by the run loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEventPayload {
    Lifecycle {
        state: RunLifecycle,
    },
    TurnStarted {
        turn: usize,
        agent: String,
    },
    AssistantDelta {
        text: String,
    },
    ReasoningDelta {
        text: String,
    },
    ToolCallStarted {
        call_id: String,
        name: String,
    },
    ToolCallCompleted {
        call: ToolCallItem,
    },
    /// An item was appended to the run's new items.
    ItemCreated {
        item: Item,
    },
    ApprovalRequired {
        call: ToolCallItem,
        agent: String,
    },
    GuardrailTripped {
        rejection: GuardrailRejection,
    },
}

/// Envelope for streaming run events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunEvent {
    pub run_id: String,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub stream: RunEventStream,
    pub payload: RunEventPayload,
}

impl RunEvent {
    /// The item carried by an `ItemCreated` event.
    pub fn item(&self) -> Option<&Item> {
        match &self.payload {
            RunEventPayload::ItemCreated { item } => Some(item),
            _ => None,
        }
    }
}

pub(crate) struct RunEventEmitter {
    run_id: String,
    seq: AtomicU64,
    sink: Option<RunEventSink>,
}

impl RunEventEmitter {
    pub(crate) fn new(run_id: impl Into<String>, sink: Option<RunEventSink>) -> Self {
        Self {
            run_id: run_id.into(),
            seq: AtomicU64::new(1),
            sink,
        }
    }

    pub(crate) fn emit(&self, stream: RunEventStream, payload: RunEventPayload) {
        let Some(sink) = &self.sink else {
            return;
        };
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        (sink)(RunEvent {
            run_id: self.run_id.clone(),
            seq,
            timestamp: Utc::now(),
            stream,
            payload,
        });
    }

    pub(crate) fn lifecycle(&self, state: RunLifecycle) {
        self.emit(RunEventStream::Lifecycle, RunEventPayload::Lifecycle { state });
    }

    pub(crate) fn item(&self, item: &Item) {
        let stream = match item {
            Item::ToolCall(_) | Item::ToolResult(_) => RunEventStream::Tool,
            Item::Handoff(_) => RunEventStream::Agent,
            Item::ApprovalRequest(_) => RunEventStream::Approval,
            Item::Reasoning(_) => RunEventStream::Reasoning,
            Item::UserMessage(_)
            | Item::AssistantMessage(_)
            | Item::Summary(_) => RunEventStream::Assistant,
        };
        self.emit(stream, RunEventPayload::ItemCreated { item: item.clone() });
    }

    /// Re-emit a backend stream event. `Done` is folded by the caller.
    pub(crate) fn model_event(&self, event: &ModelStreamEvent) {
        match event {
            ModelStreamEvent::TextDelta { text } => self.emit(
                RunEventStream::Assistant,
                RunEventPayload::AssistantDelta { text: text.clone() },
            ),
            ModelStreamEvent::ReasoningDelta { text } => self.emit(
                RunEventStream::Reasoning,
                RunEventPayload::ReasoningDelta { text: text.clone() },
            ),
            ModelStreamEvent::ToolCallStarted { call_id, name } => self.emit(
                RunEventStream::Tool,
                RunEventPayload::ToolCallStarted {
                    call_id: call_id.clone(),
                    name: name.clone(),
                },
            ),
            ModelStreamEvent::ToolCallCompleted { call } => self.emit(
                RunEventStream::Tool,
                RunEventPayload::ToolCallCompleted { call: call.clone() },
            ),
            ModelStreamEvent::Done { .. } => {}
        }
    }
}
