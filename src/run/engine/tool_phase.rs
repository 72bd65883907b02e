use std::collections::HashSet;

use crate::agent::{Agent, ToolUseBehavior};
use crate::error::{BatonError, ErrorCode, Result};
use crate::handoff::{self, is_transfer_tool_name};
use crate::run::events::{RunEventPayload, RunEventStream};
use crate::run::state::{PendingApproval, RunState};
use crate::tools::{error_result, PreparedCall, ResolvedTool, ToolOutcome, ToolRegistry};
use crate::types::{
    final_text, ApprovalRequestItem, Item, ModelResponse, ToolCallItem, ToolResultItem,
};

use super::RunEngine;

pub(super) enum ToolPhaseOutcome {
    /// Ask the model again.
    Continue,
    Final(FinalOutput),
    NeedsApproval,
}

pub(super) struct FinalOutput {
    pub(super) text: String,
    /// Produced by an assistant message (as opposed to a tool result).
    pub(super) from_message: bool,
}

/// Text form of a tool output used as final output.
pub(super) fn output_text(output: &serde_json::Value) -> String {
    match output {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn attribute(item: Item, agent: &str) -> Item {
    match item {
        Item::AssistantMessage(mut msg) if msg.agent.is_none() => {
            msg.agent = Some(agent.to_string());
            Item::AssistantMessage(msg)
        }
        Item::ToolCall(mut call) if call.agent.is_none() => {
            call.agent = Some(agent.to_string());
            Item::ToolCall(call)
        }
        other => other,
    }
}

/// Record the model response and act on its tool calls.
pub(super) async fn run_tool_phase(
    engine: &RunEngine<'_>,
    agent: &Agent,
    state: &mut RunState,
    response: ModelResponse,
) -> Result<ToolPhaseOutcome> {
    let mark = state.new_items.len();
    let items: Vec<Item> = response
        .items
        .into_iter()
        .map(|item| attribute(item, &agent.name))
        .collect();

    let calls: Vec<ToolCallItem> = items
        .iter()
        .filter_map(|item| item.as_tool_call().cloned())
        .collect();
    // Hosted tools are answered by the backend within the same response.
    let answered: HashSet<String> = items
        .iter()
        .filter_map(|item| item.as_tool_result().map(|r| r.call_id.clone()))
        .collect();
    let final_candidate = final_text(&items).map(str::to_string);

    for item in items {
        state.record(item);
    }

    if calls.is_empty() {
        let Some(text) = final_candidate else {
            return Err(BatonError::backend_fatal(
                ErrorCode::MalformedResponse,
                format!(
                    "Agent '{}' response has neither an assistant message nor tool calls",
                    agent.name
                ),
            ));
        };
        engine.emit_items_since(state, mark);
        return Ok(ToolPhaseOutcome::Final(FinalOutput {
            from_message: true,
            text,
        }));
    }

    let registry = ToolRegistry::for_agent(agent, engine.graph);
    let handoff_request = handoff::detect(&calls, &registry);

    let mut indices = Vec::new();
    let mut batch: Vec<PreparedCall<'_>> = Vec::new();
    let mut results: Vec<(usize, ToolResultItem)> = Vec::new();

    for (idx, call) in calls.iter().enumerate() {
        if answered.contains(&call.call_id) {
            continue;
        }
        match registry.resolve(&call.name) {
            Ok(ResolvedTool::Handoff(_)) => {
                let Some(performed) = &handoff_request else {
                    continue;
                };
                if performed.call.call_id != call.call_id {
                    results.push((
                        idx,
                        error_result(
                            call,
                            format!(
                                "Multiple handoffs requested in one turn; only '{}' was performed",
                                performed.call.name
                            ),
                        ),
                    ));
                }
            }
            Ok(ResolvedTool::Tool(tool)) => {
                indices.push(idx);
                batch.push(PreparedCall {
                    call: call.clone(),
                    tool: Some(tool),
                    decision: state.approvals.get(&call.call_id).cloned(),
                    ctx: engine.tool_context(state, &agent.name, call),
                });
            }
            Err(_) if is_transfer_tool_name(&call.name) => {
                results.push((
                    idx,
                    error_result(
                        call,
                        format!(
                            "Agent '{}' cannot transfer via '{}': no such handoff",
                            agent.name, call.name
                        ),
                    ),
                ));
            }
            Err(_) => {
                indices.push(idx);
                batch.push(PreparedCall {
                    call: call.clone(),
                    tool: None,
                    decision: None,
                    ctx: engine.tool_context(state, &agent.name, call),
                });
            }
        }
    }

    let stop_on_first_tool = handoff_request.is_none()
        && agent.tool_use_behavior == ToolUseBehavior::StopOnFirstTool;
    let first_tool_idx = indices
        .iter()
        .zip(&batch)
        .find(|(_, prepared)| prepared.tool.is_some())
        .map(|(idx, _)| *idx);

    let outcomes = engine.execute_batch(state, &batch).await?;

    let mut pending: Vec<(usize, ToolCallItem)> = Vec::new();
    for (idx, outcome) in indices.into_iter().zip(outcomes) {
        match outcome {
            ToolOutcome::Completed(result) => results.push((idx, result)),
            ToolOutcome::NeedsApproval(call) => pending.push((idx, call)),
            ToolOutcome::Failed(err) => return Err(err),
        }
    }
    results.sort_by_key(|(idx, _)| *idx);

    let stop_output = if stop_on_first_tool {
        results
            .iter()
            .find(|(idx, _)| Some(*idx) == first_tool_idx)
            .map(|(_, result)| output_text(&result.output))
    } else {
        None
    };

    if let Some(request) = &handoff_request {
        handoff::apply(state, request, engine.graph, &engine.tracer)?;
    }
    for (_, result) in results {
        state.record(Item::ToolResult(result));
    }

    if !pending.is_empty() {
        for (idx, call) in pending {
            state.record(Item::ApprovalRequest(ApprovalRequestItem {
                call_id: call.call_id.clone(),
                tool_name: call.name.clone(),
                arguments: call.arguments.clone(),
                agent: agent.name.clone(),
            }));
            engine.emitter.emit(
                RunEventStream::Approval,
                RunEventPayload::ApprovalRequired {
                    call: call.clone(),
                    agent: agent.name.clone(),
                },
            );
            state.pending_approvals.push(PendingApproval {
                call,
                agent: agent.name.clone(),
                final_candidate: stop_on_first_tool && Some(idx) == first_tool_idx,
            });
        }
        state.pending_final = stop_output;
        engine.emit_items_since(state, mark);
        return Ok(ToolPhaseOutcome::NeedsApproval);
    }

    engine.emit_items_since(state, mark);
    if handoff_request.is_some() {
        return Ok(ToolPhaseOutcome::Continue);
    }
    Ok(match stop_output {
        Some(text) => ToolPhaseOutcome::Final(FinalOutput {
            text,
            from_message: false,
        }),
        None => ToolPhaseOutcome::Continue,
    })
}

/// Execute pending calls that now have a decision.
pub(super) async fn resume_approvals(
    engine: &RunEngine<'_>,
    state: &mut RunState,
) -> Result<ToolPhaseOutcome> {
    let mark = state.new_items.len();
    let decided: Vec<PendingApproval> = state
        .pending_approvals
        .iter()
        .filter(|p| state.approvals.contains_key(p.call_id()))
        .cloned()
        .collect();

    let mut batch = Vec::with_capacity(decided.len());
    for pending in &decided {
        let owner = engine.graph.get(&pending.agent)?;
        batch.push(PreparedCall {
            call: pending.call.clone(),
            tool: owner.tool(&pending.call.name),
            decision: state.approvals.get(pending.call_id()).cloned(),
            ctx: engine.tool_context(state, &pending.agent, &pending.call),
        });
    }

    let outcomes = engine.execute_batch(state, &batch).await?;
    for (pending, outcome) in decided.iter().zip(outcomes) {
        match outcome {
            ToolOutcome::Completed(result) => {
                if pending.final_candidate {
                    state.pending_final = Some(output_text(&result.output));
                }
                state.record(Item::ToolResult(result));
                state
                    .pending_approvals
                    .retain(|p| p.call_id() != pending.call_id());
            }
            ToolOutcome::NeedsApproval(_) => {}
            ToolOutcome::Failed(err) => return Err(err),
        }
    }
    engine.emit_items_since(state, mark);

    if state.is_pending() {
        return Ok(ToolPhaseOutcome::NeedsApproval);
    }
    Ok(match state.pending_final.take() {
        Some(text) => ToolPhaseOutcome::Final(FinalOutput {
            text,
            from_message: false,
        }),
        None => ToolPhaseOutcome::Continue,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_outputs_are_used_verbatim() {
        assert_eq!(output_text(&json!("sunny")), "sunny");
        assert_eq!(output_text(&json!({"t": 20})), "{\"t\":20}");
    }

    #[test]
    fn response_items_are_attributed_to_the_agent() {
        let item = attribute(Item::assistant("hi"), "triage");
        assert_eq!(item, Item::assistant_from("triage", "hi"));

        let named = attribute(Item::assistant_from("other", "hi"), "triage");
        assert_eq!(named, Item::assistant_from("other", "hi"));
    }
}
