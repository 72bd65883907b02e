//! Sequential guardrail evaluation.

use std::sync::Arc;

use super::{
    Guardrail, GuardrailContext, GuardrailPhase, GuardrailRejection, GuardrailResult,
    InputGuardrail, OutputGuardrail,
};
use crate::agent::Agent;
use crate::error::{BatonError, Result};
use crate::run::trace::{SpanKind, Tracer};
use crate::types::Item;

/// Evaluate `guardrails` in declaration order, stopping at the first
/// rejection.
///
/// Each evaluation is traced as a guardrail span. An error from a guardrail is
/// returned as [`BatonError::Guardrail`].
pub async fn run_guardrails<C>(
    guardrails: &[Arc<dyn Guardrail<C>>],
    phase: GuardrailPhase,
    ctx: &GuardrailContext,
    candidate: &C,
    tracer: &Tracer,
) -> Result<Option<GuardrailRejection>>
where
    C: ?Sized + Sync,
{
    for guardrail in guardrails {
        let name = guardrail.name().to_string();
        let mut span = tracer.start(SpanKind::Guardrail, name.clone());
        span.set_attribute("phase", phase.to_string());
        span.set_attribute("agent", ctx.agent.clone());

        match guardrail.check(ctx, candidate).await {
            Ok(GuardrailResult::Allow) => {
                span.set_attribute("rejected", false);
                span.end();
            }
            Ok(GuardrailResult::Reject { message }) => {
                span.set_attribute("rejected", true);
                span.end();
                tracing::info!(
                    run_id = %ctx.run_id,
                    agent = %ctx.agent,
                    guardrail = %name,
                    %phase,
                    "guardrail rejected candidate"
                );
                return Ok(Some(GuardrailRejection {
                    guardrail: name,
                    phase,
                    message,
                }));
            }
            Err(err) => {
                span.fail(&err);
                return Err(match err {
                    err @ BatonError::Guardrail { .. } => err,
                    other => BatonError::Guardrail {
                        name,
                        message: other.to_string(),
                    },
                });
            }
        }
    }
    Ok(None)
}

/// Agent input guardrails followed by run-level ones.
pub async fn run_input_guardrails(
    agent: &Agent,
    extra: &[InputGuardrail],
    ctx: &GuardrailContext,
    input: &[Item],
    tracer: &Tracer,
) -> Result<Option<GuardrailRejection>> {
    let guardrails: Vec<InputGuardrail> = agent
        .input_guardrails
        .iter()
        .chain(extra.iter())
        .cloned()
        .collect();
    run_guardrails(&guardrails, GuardrailPhase::Input, ctx, input, tracer).await
}

/// Agent output guardrails followed by run-level ones.
pub async fn run_output_guardrails(
    agent: &Agent,
    extra: &[OutputGuardrail],
    ctx: &GuardrailContext,
    output: &str,
    tracer: &Tracer,
) -> Result<Option<GuardrailRejection>> {
    let guardrails: Vec<OutputGuardrail> = agent
        .output_guardrails
        .iter()
        .chain(extra.iter())
        .cloned()
        .collect();
    run_guardrails(&guardrails, GuardrailPhase::Output, ctx, output, tracer).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::guardrail::{input_guardrail, output_guardrail};
    use crate::run::trace::RecordingSink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx() -> GuardrailContext {
        GuardrailContext {
            run_id: "run".into(),
            agent: "a".into(),
            turn: 1,
            metadata: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn first_rejection_wins_and_later_guardrails_do_not_run() {
        let later_calls = Arc::new(AtomicUsize::new(0));
        let counter = later_calls.clone();
        let agent = Agent::new("a")
            .with_input_guardrail(input_guardrail("allow", |_, _| Ok(GuardrailResult::Allow)))
            .with_input_guardrail(input_guardrail("block", |_, _| {
                Ok(GuardrailResult::reject("blocked"))
            }))
            .with_input_guardrail(input_guardrail("later", move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(GuardrailResult::Allow)
            }));
        let sink = Arc::new(RecordingSink::new());

        let rejection = run_input_guardrails(
            &agent,
            &[],
            &ctx(),
            &[Item::user("hi")],
            &Tracer::new(sink.clone()),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(rejection.guardrail, "block");
        assert_eq!(rejection.phase, GuardrailPhase::Input);
        assert_eq!(later_calls.load(Ordering::SeqCst), 0);
        assert_eq!(sink.spans_of_kind(SpanKind::Guardrail).len(), 2);
    }

    #[tokio::test]
    async fn guardrail_errors_are_fatal() {
        let agent = Agent::new("a").with_output_guardrail(output_guardrail("broken", |_, _| {
            Err(BatonError::InvalidState("classifier offline".into()))
        }));

        let err = run_output_guardrails(&agent, &[], &ctx(), "answer", &Tracer::noop())
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Protocol);
        assert!(err.to_string().contains("broken"));
    }

    #[tokio::test]
    async fn run_level_guardrails_follow_agent_guardrails() {
        let agent = Agent::new("a");
        let extra = vec![output_guardrail("run-level", |_, text| {
            Ok(if text.contains("secret") {
                GuardrailResult::reject("no secrets")
            } else {
                GuardrailResult::Allow
            })
        })];

        let allowed = run_output_guardrails(&agent, &extra, &ctx(), "fine", &Tracer::noop())
            .await
            .unwrap();
        let rejected =
            run_output_guardrails(&agent, &extra, &ctx(), "the secret", &Tracer::noop())
                .await
                .unwrap();

        assert!(allowed.is_none());
        assert_eq!(rejected.map(|r| r.message).as_deref(), Some("no secrets"));
    }
}
