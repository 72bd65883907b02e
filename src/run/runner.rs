//! Run entry points.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use super::control::{RunInput, RunOptions};
use super::engine::{LoopOutcome, RunEngine};
use super::events::{RunEvent, RunEventEmitter, RunLifecycle};
use super::state::{PendingApproval, RunState, RunStatus};
use super::trace::{SpanKind, TraceSink, Tracer, TracingSink};
use crate::agent::AgentGraph;
use crate::config::RunConfig;
use crate::error::{BatonError, Result};
use crate::guardrail::GuardrailRejection;
use crate::model::ModelBackend;
use crate::session::RunLease;
use crate::tools::{ApprovalDecision, ToolExecutor};
use crate::types::{Item, ModelSettings, Usage};

/// Outcome of a run that did not fail.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub run_id: String,
    pub status: RunStatus,
    /// Final text; the guardrail message when the run was rejected.
    pub final_output: Option<String>,
    pub last_agent: String,
    /// Items produced by the run, in order.
    pub new_items: Vec<Item>,
    pub rejection: Option<GuardrailRejection>,
    pub usage: Usage,
    pub turns: usize,
    /// Snapshot to persist and pass to [`Runner::resume`] when suspended.
    pub state: RunState,
}

impl RunResult {
    fn from_state(state: RunState, final_output: Option<String>, rejection: Option<GuardrailRejection>) -> Self {
        Self {
            run_id: state.run_id.clone(),
            status: state.status,
            final_output,
            last_agent: state.active_agent.clone(),
            new_items: state.new_items.clone(),
            rejection,
            usage: state.usage,
            turns: state.current_turn,
            state,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn needs_approval(&self) -> bool {
        self.status == RunStatus::NeedsApproval
    }

    pub fn pending_approvals(&self) -> &[PendingApproval] {
        self.state.pending_approvals()
    }

    /// Parse the final output as JSON.
    pub fn final_output_as<T: DeserializeOwned>(&self) -> Result<T> {
        let text = self.final_output.as_deref().ok_or_else(|| {
            BatonError::InvalidState(format!("run '{}' has no final output", self.run_id))
        })?;
        Ok(serde_json::from_str(text)?)
    }
}

/// Events of a streamed run plus a handle to its result.
///
/// Drain the events, then await [`RunStream::result`].
pub struct RunStream {
    run_id: String,
    events: UnboundedReceiverStream<RunEvent>,
    handle: JoinHandle<Result<RunResult>>,
}

impl RunStream {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub async fn result(self) -> Result<RunResult> {
        self.handle
            .await
            .map_err(|e| BatonError::InvalidState(format!("run task failed: {e}")))?
    }
}

impl Stream for RunStream {
    type Item = RunEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<RunEvent>> {
        Pin::new(&mut self.get_mut().events).poll_next(cx)
    }
}

/// Drives runs against a model backend.
#[derive(Clone)]
pub struct Runner {
    backend: Arc<dyn ModelBackend>,
    config: RunConfig,
    model_settings: ModelSettings,
    trace_sink: Arc<dyn TraceSink>,
}

impl Runner {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            backend,
            config: RunConfig::default(),
            model_settings: ModelSettings::default(),
            trace_sink: Arc::new(TracingSink),
        }
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Defaults under every agent's own settings.
    pub fn with_model_settings(mut self, settings: ModelSettings) -> Self {
        self.model_settings = settings;
        self
    }

    pub fn with_trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.trace_sink = sink;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run from the graph's start agent until completion, rejection or
    /// suspension.
    pub async fn run(
        &self,
        graph: &AgentGraph,
        input: impl Into<RunInput>,
        options: RunOptions,
    ) -> Result<RunResult> {
        self.start(graph, input.into(), options, false).await
    }

    /// Like [`Runner::run`] with a streaming model call, exposing events as
    /// they happen. Must be called within a tokio runtime.
    pub fn run_streamed(
        &self,
        graph: AgentGraph,
        input: impl Into<RunInput>,
        options: RunOptions,
    ) -> RunStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let forward = options.event_sink.clone();
        let run_id = options
            .run_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let options = options
            .with_run_id(run_id.clone())
            .on_event(move |event: RunEvent| {
                if let Some(forward) = &forward {
                    forward(event.clone());
                }
                let _ = tx.send(event);
            });

        let runner = self.clone();
        let input = input.into();
        let handle = tokio::spawn(async move { runner.start(&graph, input, options, true).await });
        RunStream {
            run_id,
            events: UnboundedReceiverStream::new(rx),
            handle,
        }
    }

    /// Continue a suspended run with decisions keyed by call id.
    pub async fn resume<I>(
        &self,
        graph: &AgentGraph,
        mut state: RunState,
        decisions: I,
        options: RunOptions,
    ) -> Result<RunResult>
    where
        I: IntoIterator<Item = (String, ApprovalDecision)>,
    {
        state.validate(graph)?;
        if state.status != RunStatus::NeedsApproval {
            return Err(BatonError::InvalidState(format!(
                "run '{}' is {}, not awaiting approval",
                state.run_id, state.status
            )));
        }
        for (call_id, decision) in decisions {
            if state.pending_approval(&call_id).is_none() {
                return Err(BatonError::UnknownApproval {
                    call_id,
                    turn: state.current_turn,
                    agent: state.active_agent.clone(),
                });
            }
            state.approvals.insert(call_id, decision);
        }

        let emitter = RunEventEmitter::new(state.run_id.clone(), options.event_sink.clone());
        let lease = match &options.session {
            Some(session) => Some(session.begin_run().await?),
            None => None,
        };
        tracing::info!(
            run_id = %state.run_id,
            agent = %state.active_agent,
            pending = state.pending_approvals.len(),
            "run resumed"
        );
        emitter.lifecycle(RunLifecycle::Resumed);
        self.drive(graph, state, &options, &emitter, lease, false)
            .await
    }

    async fn start(
        &self,
        graph: &AgentGraph,
        input: RunInput,
        options: RunOptions,
        streaming: bool,
    ) -> Result<RunResult> {
        self.config.validate()?;
        let run_id = options
            .run_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let max_turns = options.max_turns.unwrap_or(self.config.max_turns);
        let emitter = RunEventEmitter::new(run_id.clone(), options.event_sink.clone());

        let (lease, history) = match &options.session {
            Some(session) => {
                let lease = session.begin_run().await?;
                let history = session
                    .get_items(self.config.session_history_limit)
                    .await?;
                (Some(lease), history)
            }
            None => (None, Vec::new()),
        };

        let mut state = RunState::new(run_id, graph.start_name(), history, input.0, max_turns);
        state.metadata = options.metadata.clone();

        tracing::info!(
            run_id = %state.run_id,
            agent = %state.active_agent,
            max_turns,
            streaming,
            history = state.history.len(),
            "run started"
        );
        emitter.lifecycle(RunLifecycle::Started);
        for item in &state.new_items {
            emitter.item(item);
        }

        self.drive(graph, state, &options, &emitter, lease, streaming)
            .await
    }

    async fn drive(
        &self,
        graph: &AgentGraph,
        mut state: RunState,
        options: &RunOptions,
        emitter: &RunEventEmitter,
        lease: Option<RunLease>,
        streaming: bool,
    ) -> Result<RunResult> {
        let root = Tracer::new(self.trace_sink.clone());
        let mut run_span = root.start(SpanKind::Run, state.run_id.clone());
        run_span.set_attribute("starting_agent", state.starting_agent.clone());
        let tracer = root.child_of(&run_span);

        let engine = RunEngine {
            backend: self.backend.as_ref(),
            config: &self.config,
            settings: &self.model_settings,
            graph,
            options,
            emitter,
            executor: ToolExecutor::from_config(&self.config, tracer.clone()),
            tracer,
            streaming,
        };

        let outcome = match engine.drive(&mut state).await {
            Ok(outcome) => outcome,
            Err(err) => {
                drop(lease);
                run_span.fail(&err);
                return Err(fail(&mut state, emitter, err));
            }
        };

        let (final_output, rejection) = match outcome {
            LoopOutcome::NeedsApproval => {
                drop(lease);
                state.status = RunStatus::NeedsApproval;
                state.touch();
                tracing::info!(
                    run_id = %state.run_id,
                    turn = state.current_turn,
                    pending = state.pending_approvals.len(),
                    "run suspended for approval"
                );
                emitter.lifecycle(RunLifecycle::NeedsApproval);
                run_span.set_attribute("status", state.status.to_string());
                run_span.end();
                return Ok(RunResult::from_state(state, None, None));
            }
            LoopOutcome::Completed { output } => (output, None),
            LoopOutcome::Rejected(rejection) => (rejection.message.clone(), Some(rejection)),
        };

        if let Err(err) = engine.ensure_active(&state) {
            drop(lease);
            run_span.fail(&err);
            return Err(fail(&mut state, emitter, err));
        }

        if let Some(session) = &options.session {
            if let Err(err) = session.add_items(state.new_items.clone()).await {
                drop(lease);
                run_span.fail(&err);
                return Err(fail(&mut state, emitter, err));
            }
            drop(lease);
            if let Err(err) = session.on_run_complete().await {
                tracing::warn!(
                    run_id = %state.run_id,
                    session = %session.session_id(),
                    error = %err,
                    "post-run session hook failed"
                );
            }
        }

        state.status = RunStatus::Completed;
        state.touch();
        tracing::info!(
            run_id = %state.run_id,
            turns = state.current_turn,
            agent = %state.active_agent,
            rejected = rejection.is_some(),
            "run completed"
        );
        emitter.lifecycle(RunLifecycle::Completed);
        run_span.set_attribute("status", state.status.to_string());
        run_span.set_attribute("turns", state.current_turn);
        run_span.end();
        Ok(RunResult::from_state(state, Some(final_output), rejection))
    }
}

fn fail(state: &mut RunState, emitter: &RunEventEmitter, err: BatonError) -> BatonError {
    state.status = RunStatus::Errored;
    state.touch();
    if err.is_cancelled() {
        tracing::info!(run_id = %state.run_id, turn = state.current_turn, "run cancelled");
        emitter.lifecycle(RunLifecycle::Cancelled);
    } else {
        tracing::warn!(
            run_id = %state.run_id,
            turn = state.current_turn,
            agent = %state.active_agent,
            error = %err,
            "run failed"
        );
        emitter.lifecycle(RunLifecycle::Failed {
            error: err.to_string(),
        });
    }
    err
}
