use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{BatonError, Result};
use crate::model::{fold_stream, ModelBackend, ModelRequest};
use crate::run::events::RunEventEmitter;
use crate::run::trace::{SpanKind, Tracer};
use crate::types::ModelResponse;

pub(super) struct ModelPhaseArgs<'a> {
    pub(super) backend: &'a dyn ModelBackend,
    pub(super) request: ModelRequest,
    pub(super) streaming: bool,
    pub(super) idle_timeout: Option<Duration>,
    pub(super) emitter: &'a RunEventEmitter,
    pub(super) cancel: &'a CancellationToken,
    pub(super) tracer: &'a Tracer,
    pub(super) turn: usize,
}

/// One model call, raced against cancellation.
pub(super) async fn run_model_phase(args: ModelPhaseArgs<'_>) -> Result<ModelResponse> {
    let ModelPhaseArgs {
        backend,
        request,
        streaming,
        idle_timeout,
        emitter,
        cancel,
        tracer,
        turn,
    } = args;

    let mut span = tracer.start(SpanKind::ModelCall, request.agent.clone());
    span.set_attribute("turn", turn);
    span.set_attribute("streaming", streaming);
    span.set_attribute("input_items", request.input.len());
    span.set_attribute("tools", request.tools.len());

    let call = async {
        if streaming {
            let stream = backend.stream(&request).await?;
            fold_stream(stream, idle_timeout, |event| emitter.model_event(event)).await
        } else {
            backend.generate(&request).await
        }
    };

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(BatonError::Cancelled {
            turn,
            agent: request.agent.clone(),
        }),
        result = call => result,
    };

    match &result {
        Ok(response) => {
            span.set_attribute("stop_reason", response.stop_reason.to_string());
            span.set_attribute("output_tokens", response.usage.output_tokens);
            span.end();
        }
        Err(err) => {
            tracing::warn!(agent = %request.agent, turn, error = %err, "model call failed");
            span.fail(err);
        }
    }
    result
}
