//! Per-invocation run options.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::events::{RunEvent, RunEventSink};
use crate::guardrail::{InputGuardrail, OutputGuardrail};
use crate::session::Session;
use crate::types::Item;

/// Input for a new run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunInput(pub Vec<Item>);

impl From<&str> for RunInput {
    fn from(text: &str) -> Self {
        Self(vec![Item::user(text)])
    }
}

impl From<String> for RunInput {
    fn from(text: String) -> Self {
        Self(vec![Item::user(text)])
    }
}

impl From<Item> for RunInput {
    fn from(item: Item) -> Self {
        Self(vec![item])
    }
}

impl From<Vec<Item>> for RunInput {
    fn from(items: Vec<Item>) -> Self {
        Self(items)
    }
}

/// Options for one `run`, `run_streamed` or `resume` call.
#[derive(Clone, Default)]
pub struct RunOptions {
    /// History source and commit target.
    pub session: Option<Arc<dyn Session>>,
    pub cancel: CancellationToken,
    pub event_sink: Option<RunEventSink>,
    /// Passed to tools, guardrails and dynamic instructions.
    pub metadata: serde_json::Value,
    /// Run-level guardrails evaluated after the active agent's own.
    pub input_guardrails: Vec<InputGuardrail>,
    pub output_guardrails: Vec<OutputGuardrail>,
    /// Overrides `RunConfig::max_turns`.
    pub max_turns: Option<usize>,
    pub run_id: Option<String>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, session: Arc<dyn Session>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_event_sink(mut self, sink: RunEventSink) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Event sink from a closure.
    pub fn on_event<F>(self, f: F) -> Self
    where
        F: Fn(RunEvent) + Send + Sync + 'static,
    {
        self.with_event_sink(Arc::new(f))
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_input_guardrail(mut self, guardrail: InputGuardrail) -> Self {
        self.input_guardrails.push(guardrail);
        self
    }

    pub fn with_output_guardrail(mut self, guardrail: OutputGuardrail) -> Self {
        self.output_guardrails.push(guardrail);
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("session", &self.session.as_ref().map(|s| s.session_id()))
            .field("cancelled", &self.cancel.is_cancelled())
            .field("event_sink", &self.event_sink.is_some())
            .field("metadata", &self.metadata)
            .field("input_guardrails", &self.input_guardrails.len())
            .field("output_guardrails", &self.output_guardrails.len())
            .field("max_turns", &self.max_turns)
            .field("run_id", &self.run_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_input_becomes_user_message() {
        let input: RunInput = "hello".into();
        assert_eq!(input.0, vec![Item::user("hello")]);
    }

    #[test]
    fn builder_collects_options() {
        let options = RunOptions::new()
            .with_max_turns(3)
            .with_run_id("r1")
            .on_event(|_| {});

        assert_eq!(options.max_turns, Some(3));
        assert_eq!(options.run_id.as_deref(), Some("r1"));
        assert!(options.event_sink.is_some());
        assert!(!options.cancel.is_cancelled());
    }
}
