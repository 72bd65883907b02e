//! Structured spans for model calls, tool executions, guardrails and handoffs.
//!
//! The run loop only produces [`SpanRecord`]s; exporting them is the job of a
//! [`TraceSink`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// What a span measures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SpanKind {
    Run,
    ModelCall,
    ToolExecution,
    Guardrail,
    Handoff,
}

/// A span as seen by a [`TraceSink`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpanRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub kind: SpanKind,
    pub name: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Receiver of span lifecycle notifications.
pub trait TraceSink: Send + Sync {
    fn span_start(&self, span: &SpanRecord);
    fn span_end(&self, span: &SpanRecord);
}

/// Forwards spans to the `tracing` crate as debug events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn span_start(&self, span: &SpanRecord) {
        tracing::debug!(
            span_id = %span.id,
            parent = ?span.parent,
            kind = %span.kind,
            name = %span.name,
            "span started"
        );
    }

    fn span_end(&self, span: &SpanRecord) {
        let elapsed_ms = span
            .ended_at
            .map(|end| (end - span.started_at).num_milliseconds())
            .unwrap_or_default();
        match &span.error {
            Some(error) => tracing::warn!(
                span_id = %span.id,
                kind = %span.kind,
                name = %span.name,
                elapsed_ms,
                error = %error,
                "span failed"
            ),
            None => tracing::debug!(
                span_id = %span.id,
                kind = %span.kind,
                name = %span.name,
                elapsed_ms,
                "span finished"
            ),
        }
    }
}

/// Discards all spans.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTraceSink;

impl TraceSink for NoopTraceSink {
    fn span_start(&self, _span: &SpanRecord) {}
    fn span_end(&self, _span: &SpanRecord) {}
}

/// Opens spans under an optional parent.
#[derive(Clone)]
pub struct Tracer {
    sink: Arc<dyn TraceSink>,
    parent: Option<String>,
}

impl Tracer {
    pub fn new(sink: Arc<dyn TraceSink>) -> Self {
        Self { sink, parent: None }
    }

    pub fn noop() -> Self {
        Self::new(Arc::new(NoopTraceSink))
    }

    /// Tracer whose spans are children of `span`.
    pub fn child_of(&self, span: &ActiveSpan) -> Self {
        Self {
            sink: self.sink.clone(),
            parent: Some(span.record.id.clone()),
        }
    }

    pub fn start(&self, kind: SpanKind, name: impl Into<String>) -> ActiveSpan {
        let record = SpanRecord {
            id: uuid::Uuid::new_v4().to_string(),
            parent: self.parent.clone(),
            kind,
            name: name.into(),
            started_at: Utc::now(),
            ended_at: None,
            attributes: serde_json::Map::new(),
            error: None,
        };
        self.sink.span_start(&record);
        ActiveSpan {
            record,
            sink: self.sink.clone(),
            ended: false,
        }
    }
}

/// A started span. Ends when [`ActiveSpan::end`] or [`ActiveSpan::fail`] is
/// called, or when dropped.
pub struct ActiveSpan {
    record: SpanRecord,
    sink: Arc<dyn TraceSink>,
    ended: bool,
}

impl ActiveSpan {
    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn set_attribute(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.record.attributes.insert(key.to_string(), value.into());
    }

    pub fn end(mut self) {
        self.finish(None);
    }

    pub fn fail(mut self, error: impl std::fmt::Display) {
        self.finish(Some(error.to_string()));
    }

    fn finish(&mut self, error: Option<String>) {
        if self.ended {
            return;
        }
        self.ended = true;
        self.record.ended_at = Some(Utc::now());
        self.record.error = error;
        self.sink.span_end(&self.record);
    }
}

impl Drop for ActiveSpan {
    fn drop(&mut self) {
        self.finish(None);
    }
}

/// Sink that keeps finished spans in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    spans: std::sync::Mutex<Vec<SpanRecord>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finished spans in the order they ended.
    pub fn spans(&self) -> Vec<SpanRecord> {
        self.spans
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn spans_of_kind(&self, kind: SpanKind) -> Vec<SpanRecord> {
        self.spans().into_iter().filter(|s| s.kind == kind).collect()
    }
}

impl TraceSink for RecordingSink {
    fn span_start(&self, _span: &SpanRecord) {}

    fn span_end(&self, span: &SpanRecord) {
        match self.spans.lock() {
            Ok(mut spans) => spans.push(span.clone()),
            Err(poisoned) => poisoned.into_inner().push(span.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_spans_reference_parent_and_end_once() {
        let sink = Arc::new(RecordingSink::new());
        let tracer = Tracer::new(sink.clone());

        let parent = tracer.start(SpanKind::Run, "run");
        let child_tracer = tracer.child_of(&parent);
        let mut child = child_tracer.start(SpanKind::ToolExecution, "lookup");
        child.set_attribute("call_id", "c1");
        child.fail("boom");
        parent.end();

        let spans = sink.spans();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].kind, SpanKind::ToolExecution);
        assert_eq!(spans[0].parent.as_deref(), Some(spans[1].id.as_str()));
        assert_eq!(spans[0].error.as_deref(), Some("boom"));
        assert_eq!(spans[0].attributes["call_id"], "c1");
        assert!(spans[1].ended_at.is_some());
    }

    #[test]
    fn dropped_span_is_ended() {
        let sink = Arc::new(RecordingSink::new());
        {
            let _span = Tracer::new(sink.clone()).start(SpanKind::Guardrail, "g");
        }
        assert_eq!(sink.spans_of_kind(SpanKind::Guardrail).len(), 1);
    }
}
