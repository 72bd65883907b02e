//! The turn loop.

use crate::agent::{Agent, AgentGraph};
use crate::config::RunConfig;
use crate::error::{BatonError, Result};
use crate::guardrail::{
    run_input_guardrails, run_output_guardrails, GuardrailContext, GuardrailRejection,
};
use crate::model::{ModelBackend, ModelRequest};
use crate::tools::{validate_arguments, PreparedCall, ToolContext, ToolExecutor, ToolOutcome, ToolRegistry};
use crate::types::{Item, ModelSettings, ToolCallItem};

use super::context::RunContext;
use super::control::RunOptions;
use super::events::{RunEventEmitter, RunEventPayload, RunEventStream};
use super::state::{RunState, RunStatus};
use super::trace::Tracer;

mod model_phase;
mod tool_phase;

use model_phase::{run_model_phase, ModelPhaseArgs};
use tool_phase::{resume_approvals, run_tool_phase, FinalOutput, ToolPhaseOutcome};

/// How the loop stopped without an error.
#[derive(Debug)]
pub(crate) enum LoopOutcome {
    Completed { output: String },
    Rejected(GuardrailRejection),
    NeedsApproval,
}

pub(crate) struct RunEngine<'a> {
    pub(crate) backend: &'a dyn ModelBackend,
    pub(crate) config: &'a RunConfig,
    pub(crate) settings: &'a ModelSettings,
    pub(crate) graph: &'a AgentGraph,
    pub(crate) options: &'a RunOptions,
    pub(crate) emitter: &'a RunEventEmitter,
    pub(crate) executor: ToolExecutor,
    pub(crate) tracer: Tracer,
    pub(crate) streaming: bool,
}

impl RunEngine<'_> {
    /// Run turns until the run completes, is rejected or suspends.
    pub(crate) async fn drive(&self, state: &mut RunState) -> Result<LoopOutcome> {
        state.status = RunStatus::Running;

        if state.is_pending() || state.pending_final.is_some() {
            match resume_approvals(self, state).await? {
                ToolPhaseOutcome::Continue => {}
                ToolPhaseOutcome::NeedsApproval => return Ok(LoopOutcome::NeedsApproval),
                ToolPhaseOutcome::Final(output) => {
                    if let Some(outcome) = self.finish(state, output).await? {
                        return Ok(outcome);
                    }
                }
            }
        }

        loop {
            self.ensure_active(state)?;
            if state.current_turn >= state.max_turns {
                return Err(BatonError::MaxTurnsExceeded {
                    max_turns: state.max_turns,
                    turn: state.current_turn + 1,
                    agent: state.active_agent.clone(),
                });
            }
            state.current_turn += 1;
            state.touch();

            let agent = self.graph.get(&state.active_agent)?;
            tracing::debug!(
                run_id = %state.run_id,
                turn = state.current_turn,
                agent = %agent.name,
                "turn started"
            );
            self.emitter.emit(
                RunEventStream::Lifecycle,
                RunEventPayload::TurnStarted {
                    turn: state.current_turn,
                    agent: agent.name.clone(),
                },
            );

            let guardrail_ctx = self.guardrail_context(state);
            if let Some(rejection) = run_input_guardrails(
                agent,
                &self.options.input_guardrails,
                &guardrail_ctx,
                &state.context,
                &self.tracer,
            )
            .await?
            {
                return Ok(self.reject(state, agent, rejection, false));
            }

            let request = self.build_request(agent, state);
            let response = run_model_phase(ModelPhaseArgs {
                backend: self.backend,
                request,
                streaming: self.streaming,
                idle_timeout: self.config.stream_idle_timeout(),
                emitter: self.emitter,
                cancel: &self.options.cancel,
                tracer: &self.tracer,
                turn: state.current_turn,
            })
            .await?;
            state.usage.merge(&response.usage);

            match run_tool_phase(self, agent, state, response).await? {
                ToolPhaseOutcome::Continue => {}
                ToolPhaseOutcome::NeedsApproval => return Ok(LoopOutcome::NeedsApproval),
                ToolPhaseOutcome::Final(output) => {
                    if let Some(outcome) = self.finish(state, output).await? {
                        return Ok(outcome);
                    }
                }
            }
        }
    }

    /// Output schema check, then output guardrails. `None` means the model
    /// gets another turn.
    async fn finish(&self, state: &mut RunState, output: FinalOutput) -> Result<Option<LoopOutcome>> {
        let agent = self.graph.get(&state.active_agent)?;

        if let Some(schema) = &agent.output_schema {
            if let Err(violation) = check_output_schema(&output.text, schema) {
                tracing::debug!(
                    run_id = %state.run_id,
                    agent = %agent.name,
                    %violation,
                    "final output rejected by output schema"
                );
                let mark = state.new_items.len();
                state.record(Item::user(format!(
                    "Your final output does not match the required output schema: {violation}. \
                     Reply again with only JSON that matches the schema."
                )));
                self.emit_items_since(state, mark);
                return Ok(None);
            }
        }

        let guardrail_ctx = self.guardrail_context(state);
        if let Some(rejection) = run_output_guardrails(
            agent,
            &self.options.output_guardrails,
            &guardrail_ctx,
            &output.text,
            &self.tracer,
        )
        .await?
        {
            return Ok(Some(self.reject(state, agent, rejection, output.from_message)));
        }

        Ok(Some(LoopOutcome::Completed {
            output: output.text,
        }))
    }

    /// Substitute the guardrail message as the agent's final reply.
    fn reject(
        &self,
        state: &mut RunState,
        agent: &Agent,
        rejection: GuardrailRejection,
        retract_message: bool,
    ) -> LoopOutcome {
        self.emitter.emit(
            RunEventStream::Guardrail,
            RunEventPayload::GuardrailTripped {
                rejection: rejection.clone(),
            },
        );
        if retract_message {
            state.retract_last_assistant_message();
        }
        let mark = state.new_items.len();
        state.record(Item::assistant_from(
            agent.name.clone(),
            rejection.message.clone(),
        ));
        self.emit_items_since(state, mark);
        LoopOutcome::Rejected(rejection)
    }

    fn build_request(&self, agent: &Agent, state: &RunState) -> ModelRequest {
        let run_ctx = RunContext {
            run_id: state.run_id.clone(),
            agent: agent.name.clone(),
            turn: state.current_turn,
            metadata: self.options.metadata.clone(),
            usage: state.usage,
        };
        ModelRequest {
            agent: agent.name.clone(),
            instructions: agent.resolve_instructions(&run_ctx),
            input: state.context.clone(),
            tools: ToolRegistry::for_agent(agent, self.graph).definitions(),
            settings: self.settings.merged_with(&agent.model_settings),
            output_schema: agent.output_schema.clone(),
        }
    }

    fn guardrail_context(&self, state: &RunState) -> GuardrailContext {
        GuardrailContext {
            run_id: state.run_id.clone(),
            agent: state.active_agent.clone(),
            turn: state.current_turn,
            metadata: self.options.metadata.clone(),
        }
    }

    pub(super) fn tool_context(
        &self,
        state: &RunState,
        agent: &str,
        call: &ToolCallItem,
    ) -> ToolContext {
        ToolContext {
            run_id: state.run_id.clone(),
            agent: agent.to_string(),
            turn: state.current_turn,
            call_id: call.call_id.clone(),
            tool_name: call.name.clone(),
            metadata: self.options.metadata.clone(),
            cancel: self.options.cancel.clone(),
        }
    }

    /// Dispatch a batch, raced against cancellation.
    pub(super) async fn execute_batch(
        &self,
        state: &RunState,
        batch: &[PreparedCall<'_>],
    ) -> Result<Vec<ToolOutcome>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        self.ensure_active(state)?;
        tokio::select! {
            biased;
            _ = self.options.cancel.cancelled() => Err(cancelled(state)),
            outcomes = self.executor.execute_batch(batch) => Ok(outcomes),
        }
    }

    pub(super) fn emit_items_since(&self, state: &RunState, mark: usize) {
        for item in state.new_items.iter().skip(mark) {
            self.emitter.item(item);
        }
    }

    pub(crate) fn ensure_active(&self, state: &RunState) -> Result<()> {
        if self.options.cancel.is_cancelled() {
            return Err(cancelled(state));
        }
        Ok(())
    }
}

pub(crate) fn cancelled(state: &RunState) -> BatonError {
    BatonError::Cancelled {
        turn: state.current_turn,
        agent: state.active_agent.clone(),
    }
}

/// Final text must be JSON matching `schema`.
fn check_output_schema(text: &str, schema: &serde_json::Value) -> std::result::Result<(), String> {
    let value: serde_json::Value = serde_json::from_str(text.trim())
        .map_err(|e| format!("output is not valid JSON ({e})"))?;
    validate_arguments(&value, schema)
}
