//! Tool execution: argument checks, approval gating, guardrails and bounded
//! concurrency.

use std::sync::Arc;

use futures::future;
use serde_json::json;
use tokio::sync::Semaphore;

use super::arguments::ToolArguments;
use super::tool::{ApprovalRequirement, Tool, ToolContext, ToolHandler};
use super::types::{ApprovalDecision, ToolParameters};
use super::validation::validate_arguments;
use crate::config::RunConfig;
use crate::error::BatonError;
use crate::guardrail::{run_guardrails, GuardrailContext, GuardrailPhase, ToolGuardrail};
use crate::run::trace::{SpanKind, Tracer};
use crate::types::{ToolCallItem, ToolResultItem};

/// Result of executing one tool call.
#[derive(Debug)]
pub enum ToolOutcome {
    /// A result to report to the model (possibly an error result).
    Completed(ToolResultItem),
    /// The call needs a human decision before it can run.
    NeedsApproval(ToolCallItem),
    /// The run must abort.
    Failed(BatonError),
}

/// A call ready for dispatch.
#[derive(Debug, Clone)]
pub struct PreparedCall<'a> {
    pub call: ToolCallItem,
    /// `None` when the name did not resolve to a tool.
    pub tool: Option<&'a Tool>,
    pub decision: Option<ApprovalDecision>,
    pub ctx: ToolContext,
}

/// Executes tool calls for a run.
pub struct ToolExecutor {
    permits: Arc<Semaphore>,
    tool_errors_fatal: bool,
    tracer: Tracer,
}

struct LocalTool<'a> {
    parameters: &'a ToolParameters,
    handler: &'a Arc<dyn ToolHandler>,
    approval: &'a ApprovalRequirement,
    input_guardrails: &'a [ToolGuardrail],
    output_guardrails: &'a [ToolGuardrail],
}

impl ToolExecutor {
    pub fn new(max_concurrency: usize, tool_errors_fatal: bool, tracer: Tracer) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            tool_errors_fatal,
            tracer,
        }
    }

    pub fn from_config(config: &RunConfig, tracer: Tracer) -> Self {
        Self::new(config.max_tool_concurrency, config.tool_errors_fatal, tracer)
    }

    /// Execute all calls concurrently (bounded by the concurrency limit).
    ///
    /// Outcomes are returned in the order of `calls`, regardless of which
    /// finishes first. A failing call does not cancel its siblings.
    pub async fn execute_batch(&self, calls: &[PreparedCall<'_>]) -> Vec<ToolOutcome> {
        future::join_all(calls.iter().map(|prepared| async move {
            match prepared.tool {
                Some(tool) => {
                    self.execute(
                        tool,
                        &prepared.call,
                        prepared.ctx.clone(),
                        prepared.decision.as_ref(),
                    )
                    .await
                }
                None => ToolOutcome::Completed(error_result(
                    &prepared.call,
                    format!("Tool '{}' not found", prepared.call.name),
                )),
            }
        }))
        .await
    }

    /// Execute a single call.
    pub async fn execute(
        &self,
        tool: &Tool,
        call: &ToolCallItem,
        ctx: ToolContext,
        decision: Option<&ApprovalDecision>,
    ) -> ToolOutcome {
        let local = match tool {
            Tool::Function(t) => LocalTool {
                parameters: &t.parameters,
                handler: &t.handler,
                approval: &t.approval,
                input_guardrails: &t.input_guardrails,
                output_guardrails: &t.output_guardrails,
            },
            Tool::Device(t) => LocalTool {
                parameters: &t.parameters,
                handler: &t.handler,
                approval: &t.approval,
                input_guardrails: &[],
                output_guardrails: &[],
            },
            Tool::Hosted(t) => {
                return ToolOutcome::Completed(error_result(
                    call,
                    format!("Hosted tool '{}' did not return a result", t.name),
                ));
            }
        };

        let args = match ToolArguments::parse(&call.arguments) {
            Ok(args) => args,
            Err(message) => {
                return ToolOutcome::Completed(error_result(
                    call,
                    format!("Invalid arguments: {message}"),
                ))
            }
        };
        if let Err(message) = validate_arguments(args.raw(), &local.parameters.schema) {
            return ToolOutcome::Completed(error_result(
                call,
                format!("Argument validation failed: {message}"),
            ));
        }

        match decision {
            Some(decision @ ApprovalDecision::Reject { .. }) => {
                let message = decision
                    .rejection_output()
                    .unwrap_or_else(|| "Tool call rejected".to_string());
                return ToolOutcome::Completed(error_result(call, message));
            }
            Some(ApprovalDecision::Approve) => {}
            None => {
                if local.approval.requires_approval(args.raw()) {
                    return ToolOutcome::NeedsApproval(call.clone());
                }
            }
        }

        let Ok(_permit) = self.permits.acquire().await else {
            return ToolOutcome::Failed(BatonError::InvalidState(
                "tool executor is shut down".into(),
            ));
        };

        let guard_ctx = GuardrailContext {
            run_id: ctx.run_id.clone(),
            agent: ctx.agent.clone(),
            turn: ctx.turn,
            metadata: ctx.metadata.clone(),
        };
        let mut span = self.tracer.start(SpanKind::ToolExecution, call.name.clone());
        span.set_attribute("call_id", call.call_id.clone());
        span.set_attribute("agent", ctx.agent.clone());
        let guard_tracer = self.tracer.child_of(&span);

        match run_guardrails(
            local.input_guardrails,
            GuardrailPhase::ToolInput,
            &guard_ctx,
            args.raw(),
            &guard_tracer,
        )
        .await
        {
            Ok(None) => {}
            Ok(Some(rejection)) => {
                span.set_attribute("rejected_by", rejection.guardrail.clone());
                span.end();
                return ToolOutcome::Completed(guardrail_result(call, rejection.message));
            }
            Err(err) => {
                span.fail(&err);
                return ToolOutcome::Failed(err);
            }
        }

        tracing::debug!(
            run_id = %ctx.run_id,
            tool = %call.name,
            call_id = %call.call_id,
            "executing tool"
        );
        let output = match local.handler.call(args, ctx).await {
            Ok(output) => output,
            Err(err) => {
                span.fail(&err);
                if self.tool_errors_fatal {
                    return ToolOutcome::Failed(BatonError::ToolExecution {
                        tool_name: call.name.clone(),
                        message: err.to_string(),
                    });
                }
                tracing::warn!(tool = %call.name, error = %err, "tool failed");
                return ToolOutcome::Completed(error_result(call, err.to_string()));
            }
        };

        match run_guardrails(
            local.output_guardrails,
            GuardrailPhase::ToolOutput,
            &guard_ctx,
            &output,
            &guard_tracer,
        )
        .await
        {
            Ok(None) => {
                span.end();
                ToolOutcome::Completed(ToolResultItem {
                    call_id: call.call_id.clone(),
                    tool_name: call.name.clone(),
                    output,
                    is_error: false,
                })
            }
            Ok(Some(rejection)) => {
                span.set_attribute("rejected_by", rejection.guardrail.clone());
                span.end();
                ToolOutcome::Completed(guardrail_result(call, rejection.message))
            }
            Err(err) => {
                span.fail(&err);
                ToolOutcome::Failed(err)
            }
        }
    }
}

/// Error result reported to the model for `call`.
pub fn error_result(call: &ToolCallItem, message: impl Into<String>) -> ToolResultItem {
    ToolResultItem {
        call_id: call.call_id.clone(),
        tool_name: call.name.clone(),
        output: json!({ "error": message.into() }),
        is_error: true,
    }
}

fn guardrail_result(call: &ToolCallItem, message: String) -> ToolResultItem {
    ToolResultItem {
        call_id: call.call_id.clone(),
        tool_name: call.name.clone(),
        output: json!({ "error": message, "source": "guardrail" }),
        is_error: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrail::{tool_guardrail, GuardrailResult};
    use crate::tools::{FunctionTool, ToolParameters};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn call(name: &str, args: serde_json::Value) -> ToolCallItem {
        ToolCallItem {
            call_id: format!("call_{name}"),
            name: name.into(),
            arguments: args,
            agent: None,
        }
    }

    fn counting_tool(counter: Arc<AtomicUsize>) -> Tool {
        FunctionTool::new(
            "count",
            "Counts invocations",
            ToolParameters::object().string("label", "Label", true).build(),
            move |args, _ctx| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({ "label": args.get_str("label")? }))
                }
            },
        )
        .into()
    }

    fn executor() -> ToolExecutor {
        ToolExecutor::new(8, false, Tracer::noop())
    }

    #[tokio::test]
    async fn invalid_arguments_become_error_results_without_running_handler() {
        let counter = Arc::new(AtomicUsize::new(0));
        let tool = counting_tool(counter.clone());

        let outcome = executor()
            .execute(&tool, &call("count", json!({})), ToolContext::default(), None)
            .await;

        let ToolOutcome::Completed(result) = outcome else {
            panic!("expected completed outcome");
        };
        assert!(result.is_error);
        assert_eq!(
            result.output["error"],
            "Argument validation failed: missing required field 'label'"
        );
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_json_string_is_recoverable() {
        let tool = counting_tool(Arc::new(AtomicUsize::new(0)));

        let outcome = executor()
            .execute(&tool, &call("count", json!("{label:")), ToolContext::default(), None)
            .await;

        assert!(matches!(outcome, ToolOutcome::Completed(r) if r.is_error));
    }

    #[tokio::test]
    async fn approval_required_without_decision_suspends() {
        let counter = Arc::new(AtomicUsize::new(0));
        let Tool::Function(inner) = counting_tool(counter.clone()) else {
            unreachable!()
        };
        let tool = Tool::Function(inner.with_approval(ApprovalRequirement::Always));
        let exec = executor();
        let c = call("count", json!({"label": "x"}));

        let pending = exec.execute(&tool, &c, ToolContext::default(), None).await;
        let rejected = exec
            .execute(
                &tool,
                &c,
                ToolContext::default(),
                Some(&ApprovalDecision::reject("no")),
            )
            .await;
        let approved = exec
            .execute(&tool, &c, ToolContext::default(), Some(&ApprovalDecision::Approve))
            .await;

        assert!(matches!(pending, ToolOutcome::NeedsApproval(_)));
        assert!(
            matches!(rejected, ToolOutcome::Completed(r) if r.output["error"] == "Tool call rejected: no")
        );
        assert!(matches!(approved, ToolOutcome::Completed(r) if !r.is_error));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_errors_are_fatal_only_when_configured() {
        let failing: Tool = FunctionTool::new("boom", "", ToolParameters::empty(), |_, _| async {
            Err(BatonError::InvalidState("disk full".into()))
        })
        .into();
        let c = call("boom", json!({}));

        let soft = executor()
            .execute(&failing, &c, ToolContext::default(), None)
            .await;
        let hard = ToolExecutor::new(8, true, Tracer::noop())
            .execute(&failing, &c, ToolContext::default(), None)
            .await;

        assert!(matches!(soft, ToolOutcome::Completed(r) if r.is_error));
        assert!(matches!(hard, ToolOutcome::Failed(BatonError::ToolExecution { .. })));
    }

    #[tokio::test]
    async fn tool_guardrails_block_and_replace() {
        let counter = Arc::new(AtomicUsize::new(0));
        let Tool::Function(inner) = counting_tool(counter.clone()) else {
            unreachable!()
        };
        let blocked: Tool = inner
            .clone()
            .with_input_guardrail(tool_guardrail("no-secret", |_, args| {
                Ok(if args["label"] == "secret" {
                    GuardrailResult::reject("label not allowed")
                } else {
                    GuardrailResult::Allow
                })
            }))
            .into();
        let redacted: Tool = inner
            .with_output_guardrail(tool_guardrail("redact", |_, _| {
                Ok(GuardrailResult::reject("output withheld"))
            }))
            .into();

        let input = executor()
            .execute(
                &blocked,
                &call("count", json!({"label": "secret"})),
                ToolContext::default(),
                None,
            )
            .await;
        let output = executor()
            .execute(
                &redacted,
                &call("count", json!({"label": "ok"})),
                ToolContext::default(),
                None,
            )
            .await;

        assert!(
            matches!(input, ToolOutcome::Completed(r) if r.output["error"] == "label not allowed")
        );
        assert!(
            matches!(output, ToolOutcome::Completed(r) if r.output["error"] == "output withheld")
        );
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_tool_yields_not_found_result() {
        let prepared = PreparedCall {
            call: call("missing", json!({})),
            tool: None,
            decision: None,
            ctx: ToolContext::default(),
        };

        let outcomes = executor().execute_batch(&[prepared]).await;

        assert!(
            matches!(&outcomes[0], ToolOutcome::Completed(r) if r.output["error"] == "Tool 'missing' not found")
        );
    }
}
