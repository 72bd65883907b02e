//! Deterministic in-process backend for tests and offline demos.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::{ModelBackend, ModelRequest};
use crate::error::{BatonError, ErrorCode, Result};
use crate::types::{Item, ModelResponse, ModelStreamEvent};

type Responder = Arc<dyn Fn(&ModelRequest) -> Result<ModelResponse> + Send + Sync>;

enum Script {
    Queue(Mutex<VecDeque<Result<ModelResponse>>>),
    Responder(Responder),
}

/// Backend that replays queued responses or answers through a closure.
///
/// Every request is recorded and can be inspected with
/// [`ScriptedBackend::requests`].
pub struct ScriptedBackend {
    script: Script,
    requests: Mutex<Vec<ModelRequest>>,
    event_delay: Option<Duration>,
}

impl ScriptedBackend {
    /// Replay `responses` in order. Once exhausted, calls fail.
    pub fn new(responses: impl IntoIterator<Item = ModelResponse>) -> Self {
        Self::from_results(responses.into_iter().map(Ok))
    }

    /// Replay responses and errors in order.
    pub fn from_results(results: impl IntoIterator<Item = Result<ModelResponse>>) -> Self {
        Self {
            script: Script::Queue(Mutex::new(results.into_iter().collect())),
            requests: Mutex::new(Vec::new()),
            event_delay: None,
        }
    }

    /// Answer every request with `responder`.
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&ModelRequest) -> Result<ModelResponse> + Send + Sync + 'static,
    {
        Self {
            script: Script::Responder(Arc::new(responder)),
            requests: Mutex::new(Vec::new()),
            event_delay: None,
        }
    }

    /// Sleep for `delay` before each streamed event.
    pub fn with_event_delay(mut self, delay: Duration) -> Self {
        self.event_delay = Some(delay);
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn call_count(&self) -> usize {
        self.requests().len()
    }

    fn respond(&self, request: &ModelRequest) -> Result<ModelResponse> {
        match self.requests.lock() {
            Ok(mut r) => r.push(request.clone()),
            Err(poisoned) => poisoned.into_inner().push(request.clone()),
        }
        match &self.script {
            Script::Responder(responder) => responder(request),
            Script::Queue(queue) => {
                let next = match queue.lock() {
                    Ok(mut q) => q.pop_front(),
                    Err(poisoned) => poisoned.into_inner().pop_front(),
                };
                next.unwrap_or_else(|| {
                    Err(BatonError::backend_fatal(
                        ErrorCode::InvalidRequest,
                        "scripted backend has no responses left",
                    ))
                })
            }
        }
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse> {
        self.respond(request)
    }

    async fn stream(
        &self,
        request: &ModelRequest,
    ) -> Result<BoxStream<'static, Result<ModelStreamEvent>>> {
        let response = self.respond(request)?;
        let events = stream_events(&response);
        let delay = self.event_delay;
        let stream = async_stream::stream! {
            for event in events {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(event);
            }
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            yield Ok(ModelStreamEvent::Done { response });
        };
        Ok(Box::pin(stream))
    }
}

/// Incremental events that reproduce `response`, excluding the final `Done`.
fn stream_events(response: &ModelResponse) -> Vec<ModelStreamEvent> {
    let mut events = Vec::new();
    for item in &response.items {
        match item {
            Item::AssistantMessage(message) => {
                events.extend(
                    chunk_text(&message.text)
                        .into_iter()
                        .map(|text| ModelStreamEvent::TextDelta { text }),
                );
            }
            Item::Reasoning(reasoning) => events.push(ModelStreamEvent::ReasoningDelta {
                text: reasoning.text.clone(),
            }),
            Item::ToolCall(call) => {
                events.push(ModelStreamEvent::ToolCallStarted {
                    call_id: call.call_id.clone(),
                    name: call.name.clone(),
                });
                events.push(ModelStreamEvent::ToolCallCompleted { call: call.clone() });
            }
            _ => {}
        }
    }
    events
}

/// Split text into word-sized chunks that concatenate back to the input.
fn chunk_text(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if ch.is_whitespace() {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
