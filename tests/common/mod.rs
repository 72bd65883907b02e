//! Shared test helpers: scripted backends, counting tools and event capture.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use baton::error::Result;
use baton::model::ScriptedBackend;
use baton::run::{RunEvent, RunEventSink};
use baton::session::Summarizer;
use baton::tools::{FunctionTool, ToolParameters};
use baton::types::{Item, ModelResponse, SummaryItem, ToolCallItem};

/// A tool call as the model would emit it.
pub fn call(call_id: &str, name: &str, arguments: Value) -> ToolCallItem {
    ToolCallItem {
        call_id: call_id.to_string(),
        name: name.to_string(),
        arguments,
        agent: None,
    }
}

/// A response that asks for `calls`.
pub fn tool_turn(calls: Vec<ToolCallItem>) -> ModelResponse {
    ModelResponse::tool_calls(calls)
}

pub fn scripted(responses: Vec<ModelResponse>) -> Arc<ScriptedBackend> {
    Arc::new(ScriptedBackend::new(responses))
}

/// Tool that counts invocations and returns `output`.
pub fn counting_tool(name: &str, counter: Arc<AtomicUsize>, output: Value) -> FunctionTool {
    FunctionTool::new(
        name,
        format!("Counts calls to {name}"),
        ToolParameters::empty(),
        move |_args, _ctx| {
            let counter = counter.clone();
            let output = output.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(output)
            }
        },
    )
}

/// Tool that sleeps for `delay`, records its name in `finished` and returns
/// the name.
pub fn delayed_tool(name: &str, delay: Duration, finished: Arc<Mutex<Vec<String>>>) -> FunctionTool {
    let label = name.to_string();
    FunctionTool::new(
        name,
        format!("Sleeps then answers {name}"),
        ToolParameters::empty(),
        move |_args, _ctx| {
            let label = label.clone();
            let finished = finished.clone();
            async move {
                tokio::time::sleep(delay).await;
                finished.lock().unwrap().push(label.clone());
                Ok(json!(label))
            }
        },
    )
}

/// Event sink that keeps every event.
pub fn event_collector() -> (RunEventSink, Arc<Mutex<Vec<RunEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink_events = events.clone();
    let sink: RunEventSink = Arc::new(move |event: RunEvent| {
        sink_events.lock().unwrap().push(event);
    });
    (sink, events)
}

/// Call ids of the tool results in `items`, in order.
pub fn result_ids(items: &[Item]) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| item.as_tool_result().map(|r| r.call_id.clone()))
        .collect()
}

/// Summarizer that returns a fixed text and counts calls.
#[derive(Default)]
pub struct CountingSummarizer {
    pub calls: AtomicUsize,
}

impl CountingSummarizer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Summarizer for CountingSummarizer {
    async fn summarize(&self, previous: Option<&SummaryItem>, items: &[Item]) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let carried = previous.map_or(0, |p| p.summarized_items);
        Ok(format!("summary #{n} of {} items (+{carried})", items.len()))
    }
}
